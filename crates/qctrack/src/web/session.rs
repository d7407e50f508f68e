//! Cookie sessions and the authentication extractors.
//!
//! The browser holds a random token; the database only ever sees its blake3
//! hash, so a leaked database cannot be replayed as a login.

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeDelta, Utc};
use rand::RngCore;
use tracing::debug;

use super::AppState;
use crate::error::{Error, Result};
use crate::storage::Flash;
use crate::user::User;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "qctrack_session";

const TOKEN_BYTES: usize = 32;

/// Generate a fresh random session token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage.
#[must_use]
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Read the session token from a `Cookie` header.
#[must_use]
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value that stores `token` for `ttl`.
#[must_use]
pub fn session_cookie(token: &str, ttl: TimeDelta, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
#[must_use]
pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Attach a `Set-Cookie` header to a response.
pub fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Resolve the logged-in user for a request, if any.
///
/// # Errors
///
/// Returns an error if the session lookup fails.
pub fn resolve(state: &AppState, headers: &HeaderMap) -> Result<Option<CurrentUser>> {
    let Some(token) = token_from_headers(headers) else {
        return Ok(None);
    };
    let token_hash = hash_token(&token);
    let user = state.with_storage(|storage| storage.session_user(&token_hash, Utc::now()))?;
    Ok(user.map(|user| CurrentUser { user, token_hash }))
}

/// The authenticated user behind a request.
///
/// Extracting it from a request without a valid session redirects the
/// browser to the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// The account.
    pub user: User,
    /// Hash of the session token, used for flash messages and logout.
    pub token_hash: String,
}

impl CurrentUser {
    /// Username for activity entries.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        Some(self.user.username.as_str())
    }

    /// Queue a message for the next page this user sees.
    ///
    /// # Errors
    ///
    /// Returns an error if the session row cannot be updated.
    pub fn flash(&self, state: &AppState, flash: &Flash) -> Result<()> {
        state.with_storage(|storage| storage.set_flash(&self.token_hash, flash))
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        match resolve(state, &parts.headers) {
            Ok(Some(current)) => Ok(current),
            Ok(None) => {
                debug!("No session for {}, redirecting to login", parts.uri.path());
                Err(Redirect::to("/login").into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// An authenticated user with the admin role.
///
/// Non-admin users get a 403 page.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if current.user.is_admin() {
            Ok(Self(current))
        } else {
            Err(Error::forbidden("administrator access required").into_response())
        }
    }
}
