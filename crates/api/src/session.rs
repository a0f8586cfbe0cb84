//! Session cookie handling and the authenticated-caller extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use domain::{Account, SessionToken};

use crate::AppState;
use crate::error::ApiError;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session-id";

/// The caller behind a live session cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub token: SessionToken,
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| SessionToken::new(cookie.value()))
            .ok_or(ApiError::Unauthenticated)?;

        let lookup = token.clone();
        let account = state
            .run(&parts.headers, move |workflows, mut ctx| async move {
                workflows.current_account(&mut ctx, &lookup).await
            })
            .await?;

        Ok(Self { account, token })
    }
}

/// Cookie handing `token` to the client.
pub fn session_cookie(token: &SessionToken) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Adds a removal of the session cookie to `jar`.
pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let token = SessionToken::new("abc");
        let cookie = session_cookie(&token);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
