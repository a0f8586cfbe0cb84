//! Sign-up, login, session, profile and avatar endpoints.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use common::AccountId;
use domain::{Account, BlobPath, ProfilePatch};
use saga::SignUp;
use serde::{Deserialize, Serialize};

use super::read_upload;
use crate::AppState;
use crate::error::ApiError;
use crate::session::{Session, clear_session_cookie, session_cookie};

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub login: String,
    pub nickname: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// What other users see of an account. The login stays private.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: AccountId,
    pub nickname: String,
    pub name: String,
    pub description: String,
    pub avatar_path: Option<BlobPath>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for PublicProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            nickname: account.nickname,
            name: account.name,
            description: account.description,
            avatar_path: account.avatar_path,
            created_at: account.created_at,
        }
    }
}

/// POST /accounts/signup: creates an account and logs it in.
pub async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<SignUpRequest>,
) -> Result<(StatusCode, CookieJar, Json<Account>), ApiError> {
    let request = SignUp {
        login: body.login,
        nickname: body.nickname,
        password: body.password,
        name: body.name,
        description: body.description,
    };
    let (account, token) = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.sign_up(&mut ctx, request).await
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(&token)),
        Json(account),
    ))
}

/// POST /accounts/login: opens a session for valid credentials.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Account>), ApiError> {
    let (account, token) = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.login(&mut ctx, &body.login, &body.password).await
        })
        .await?;

    Ok((jar.add(session_cookie(&token)), Json(account)))
}

/// DELETE /accounts/logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.logout(&mut ctx, &session.token).await
        })
        .await?;

    Ok((StatusCode::NO_CONTENT, clear_session_cookie(jar)))
}

/// GET /accounts/me
pub async fn me(session: Session) -> Json<Account> {
    Json(session.account)
}

/// DELETE /accounts/me: deletes the caller's account and ends its session.
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Account>), ApiError> {
    let account = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .delete_account(&mut ctx, &session.account, &session.token)
                .await
        })
        .await?;

    Ok((clear_session_cookie(jar), Json(account)))
}

/// PUT /accounts/me: edits nickname, name or description.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.update_profile(&mut ctx, &session.account, patch).await
        })
        .await?;
    Ok(Json(account))
}

/// PUT /accounts/me/avatar: multipart avatar upload.
pub async fn update_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
    multipart: Multipart,
) -> Result<Json<Account>, ApiError> {
    let upload = read_upload(multipart).await?;
    let account = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows
                .update_avatar(&mut ctx, &session.account, upload)
                .await
        })
        .await?;
    Ok(Json(account))
}

/// DELETE /accounts/me/avatar: back to the default avatar.
pub async fn delete_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    session: Session,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.delete_avatar(&mut ctx, &session.account).await
        })
        .await?;
    Ok(Json(account))
}

/// GET /profiles/{nickname}
pub async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(nickname): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    let account = state
        .run(&headers, move |workflows, mut ctx| async move {
            workflows.get_account_by_nickname(&mut ctx, &nickname).await
        })
        .await?;
    Ok(Json(account.into()))
}
