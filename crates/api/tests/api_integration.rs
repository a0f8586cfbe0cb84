//! Integration tests for the API server.

use std::sync::OnceLock;
use std::time::Duration;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const BOUNDARY: &str = "wardrobe-test-boundary";
const PASSWORD: &str = "correct horse";

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let config = Config {
        request_timeout: Duration::from_secs(30),
        ..Config::default()
    };
    let state = api::create_in_memory_state(&config);
    api::create_app(state, get_metrics_handle())
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_upload(cookie: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    multipart_request("POST", "/garments", cookie, file_name, content_type, bytes)
}

fn multipart_request(
    method: &str,
    uri: &str,
    cookie: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

/// Extracts `session-id=<token>` from the response's `Set-Cookie` headers.
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session-id="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn sign_up(app: &axum::Router, login: &str, nickname: &str) -> String {
    let response = send(
        app,
        json_request(
            "POST",
            "/accounts/signup",
            None,
            serde_json::json!({
                "login": login,
                "nickname": nickname,
                "password": PASSWORD,
                "name": "Test User",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    session_cookie(&response).expect("signup sets the session cookie")
}

async fn upload_garment(app: &axum::Router, cookie: &str) -> serde_json::Value {
    let response = send(app, multipart_upload(cookie, "tee.png", "image/png", b"png bytes")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

fn encoded_image(file_name: &str) -> serde_json::Value {
    serde_json::json!({
        "file_name": file_name,
        "data": BASE64.encode(b"image bytes"),
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = send(&app, empty_request("GET", "/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["background_tasks"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = send(&app, empty_request("GET", "/metrics", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_signup_sets_cookie_and_hides_hash() {
    let app = setup();

    let response = send(
        &app,
        json_request(
            "POST",
            "/accounts/signup",
            None,
            serde_json::json!({
                "login": "ann@example.com",
                "nickname": "ann",
                "password": PASSWORD,
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(session_cookie(&response).is_some());

    let json = body_json(response).await;
    assert_eq!(json["login"], "ann@example.com");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_signup_duplicate_login_conflicts() {
    let app = setup();
    sign_up(&app, "ann@example.com", "ann").await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/accounts/signup",
            None,
            serde_json::json!({
                "login": "ann@example.com",
                "nickname": "other",
                "password": PASSWORD,
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_signup_short_password_rejected() {
    let app = setup();

    let response = send(
        &app,
        json_request(
            "POST",
            "/accounts/signup",
            None,
            serde_json::json!({
                "login": "ann@example.com",
                "nickname": "ann",
                "password": "short",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid request");
}

#[tokio::test]
async fn test_me_requires_session() {
    let app = setup();

    let response = send(&app, empty_request("GET", "/accounts/me", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, empty_request("GET", "/accounts/me", Some("session-id=bogus"))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    let response = send(&app, empty_request("GET", "/accounts/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["nickname"], "ann");
}

#[tokio::test]
async fn test_login_and_logout() {
    let app = setup();
    sign_up(&app, "ann@example.com", "ann").await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/accounts/login",
            None,
            serde_json::json!({ "login": "ann@example.com", "password": "wrong password" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        json_request(
            "POST",
            "/accounts/login",
            None,
            serde_json::json!({ "login": "ann@example.com", "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();

    let response = send(&app, empty_request("DELETE", "/accounts/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, empty_request("GET", "/accounts/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_account_ends_session() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;

    let response = send(&app, empty_request("DELETE", "/accounts/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", "/accounts/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_update_and_public_lookup() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    sign_up(&app, "bob@example.com", "bob").await;

    let response = send(
        &app,
        json_request("PUT", "/accounts/me", Some(&cookie), serde_json::json!({ "nickname": "bob" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &app,
        json_request(
            "PUT",
            "/accounts/me",
            Some(&cookie),
            serde_json::json!({ "nickname": "annie", "description": "vintage" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["nickname"], "annie");

    let response = send(&app, empty_request("GET", "/profiles/annie", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["description"], "vintage");
    assert!(profile.get("login").is_none());

    let response = send(&app, empty_request("GET", "/profiles/ann", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_avatar_upload_and_reset() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;

    let response = send(
        &app,
        multipart_request("PUT", "/accounts/me/avatar", &cookie, "me.png", "image/png", b"png"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let avatar = body_json(response).await["avatar_path"].clone();
    assert!(avatar.as_str().unwrap().starts_with("avatars/"));

    let response = send(&app, empty_request("GET", "/profiles/ann", None)).await;
    assert_eq!(body_json(response).await["avatar_path"], avatar);

    let response = send(&app, empty_request("DELETE", "/accounts/me/avatar", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["avatar_path"].is_null());
}

#[tokio::test]
async fn test_garment_upload_and_listing() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;

    let garment = upload_garment(&app, &cookie).await;
    assert_eq!(garment["label"], "Tee");
    let id = garment["id"].as_str().unwrap();

    let response = send(&app, empty_request("GET", &format!("/garments/{id}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", "/garments/mine", Some(&cookie))).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = send(&app, empty_request("GET", "/garments?limit=10", None)).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_garment_upload_rejects_unsupported_type() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;

    let response = send(&app, multipart_upload(&cookie, "tee.gif", "image/gif", b"gif")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, empty_request("GET", "/garments", None)).await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_garment_upload_requires_session() {
    let app = setup();

    let response = send(&app, multipart_upload("session-id=nope", "tee.png", "image/png", b"png")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_garment_not_found() {
    let app = setup();

    let response = send(
        &app,
        empty_request("GET", &format!("/garments/{}", uuid::Uuid::new_v4()), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not found");
}

#[tokio::test]
async fn test_garment_update_by_other_account_forbidden() {
    let app = setup();
    let owner = sign_up(&app, "ann@example.com", "ann").await;
    let other = sign_up(&app, "bob@example.com", "bob").await;
    let garment = upload_garment(&app, &owner).await;
    let id = garment["id"].as_str().unwrap();

    let response = send(
        &app,
        json_request(
            "PUT",
            &format!("/garments/{id}"),
            Some(&other),
            serde_json::json!({ "brand": "Acme" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        json_request(
            "PUT",
            &format!("/garments/{id}"),
            Some(&owner),
            serde_json::json!({ "brand": "Acme" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["brand"], "Acme");
}

#[tokio::test]
async fn test_garment_update_can_clear_sex() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    let garment = upload_garment(&app, &cookie).await;
    let uri = format!("/garments/{}", garment["id"].as_str().unwrap());

    let response = send(
        &app,
        json_request("PUT", &uri, Some(&cookie), serde_json::json!({ "sex": "female" })),
    )
    .await;
    assert_eq!(body_json(response).await["sex"], "female");

    let response = send(
        &app,
        json_request("PUT", &uri, Some(&cookie), serde_json::json!({ "color": "red" })),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["sex"], "female");
    assert_eq!(body["color"], "red");

    let response = send(
        &app,
        json_request("PUT", &uri, Some(&cookie), serde_json::json!({ "sex": null })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["sex"].is_null());
}

#[tokio::test]
async fn test_garment_rescan_is_owner_only() {
    let app = setup();
    let owner = sign_up(&app, "ann@example.com", "ann").await;
    let other = sign_up(&app, "bob@example.com", "bob").await;
    let garment = upload_garment(&app, &owner).await;
    let uri = format!("/garments/{}/similar", garment["id"].as_str().unwrap());

    let response = send(&app, empty_request("POST", &uri, Some(&other))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, empty_request("POST", &uri, Some(&owner))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_garment_delete() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    let garment = upload_garment(&app, &cookie).await;
    let id = garment["id"].as_str().unwrap();

    let response = send(&app, empty_request("DELETE", &format!("/garments/{id}"), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", &format!("/garments/{id}"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_outfit_compose_and_read() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    let other = sign_up(&app, "bob@example.com", "bob").await;
    let garment = upload_garment(&app, &cookie).await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/outfits",
            Some(&cookie),
            serde_json::json!({
                "description": "friday",
                "image": encoded_image("look.png"),
                "placements": [{ "garment_id": garment["id"], "coords": { "x": 10, "y": 20 } }],
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let outfit = body_json(response).await;
    assert_eq!(outfit["description"], "friday");
    assert_eq!(outfit["garments"][0]["label"], "Tee");
    let id = outfit["id"].as_str().unwrap();

    let response = send(&app, empty_request("GET", &format!("/outfits/{id}"), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", &format!("/outfits/{id}"), Some(&other))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_outfit_compose_rejects_bad_image() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/outfits",
            Some(&cookie),
            serde_json::json!({ "image": encoded_image("look.gif") }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        json_request(
            "POST",
            "/outfits",
            Some(&cookie),
            serde_json::json!({ "image": { "file_name": "look.png", "data": "%%%" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_create_and_delete() {
    let app = setup();
    let cookie = sign_up(&app, "ann@example.com", "ann").await;
    let garment = upload_garment(&app, &cookie).await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/posts",
            Some(&cookie),
            serde_json::json!({
                "type": "garment",
                "element_id": garment["id"],
                "description": "new tee",
                "previews": [encoded_image("preview.jpg")],
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let post = body_json(response).await;
    assert_eq!(post["element"]["type"], "garment");
    assert_eq!(post["preview_paths"].as_array().unwrap().len(), 1);
    let id = post["id"].as_str().unwrap();

    let response = send(&app, empty_request("GET", "/posts/mine", Some(&cookie))).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = send(&app, empty_request("DELETE", &format!("/posts/{id}"), Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", &format!("/posts/{id}"), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_on_foreign_garment_forbidden() {
    let app = setup();
    let owner = sign_up(&app, "ann@example.com", "ann").await;
    let other = sign_up(&app, "bob@example.com", "bob").await;
    let garment = upload_garment(&app, &owner).await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/posts",
            Some(&other),
            serde_json::json!({ "type": "garment", "element_id": garment["id"] }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, empty_request("GET", "/posts", None)).await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}
