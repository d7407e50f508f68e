//! Login and logout.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tera::Context;
use tracing::{info, warn};

use super::session::{self, CurrentUser};
use super::{blocking, AppState};
use crate::activity::ActivityAction;
use crate::error::{Error, Result};
use crate::storage::Flash;

/// Submitted login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Query string of the login page.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    logged_out: Option<String>,
}

fn login_page(
    state: &AppState,
    username: &str,
    error: Option<&str>,
    logged_out: bool,
) -> Result<Html<String>> {
    let mut context = Context::new();
    context.insert("current_user", &Option::<()>::None);
    context.insert("flash", &Option::<Flash>::None);
    context.insert("username", username);
    context.insert("error", &error);
    context.insert("logged_out", &logged_out);
    state.render("login.html", &context)
}

/// `GET /login`
pub async fn login_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    if session::resolve(&state, &headers)?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(login_page(&state, "", None, query.logged_out.is_some())?.into_response())
}

/// `POST /login`
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response> {
    let username = form.username.trim().to_string();
    let password = form.password;

    let candidate = state.with_storage(|storage| storage.get_user_by_username(&username))?;
    let verified = match candidate {
        Some(user) => blocking(move || Ok(user.verify_password(&password).then_some(user))).await?,
        None => None,
    };

    let Some(user) = verified else {
        warn!("Failed login for {:?}", username);
        state.with_storage(|storage| {
            storage.log_activity(
                None,
                ActivityAction::LoginFailed,
                &format!("username: {username}"),
            )
        })?;
        let page = login_page(&state, &username, Some("Invalid username or password."), false)?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    };

    let token = session::generate_token();
    let ttl = TimeDelta::from_std(state.config.session_ttl())
        .map_err(|_| Error::internal("session lifetime out of range"))?;
    let now = Utc::now();
    state.with_storage(|storage| {
        storage.prune_expired_sessions(now)?;
        storage.create_session(user.id, &session::hash_token(&token), now + ttl)?;
        storage.log_activity(Some(&user.username), ActivityAction::Login, "")?;
        Ok(())
    })?;

    info!("{} logged in", user.username);
    let cookie = session::session_cookie(&token, ttl, state.config.auth.secure_cookie);
    Ok(session::with_cookie(Redirect::to("/").into_response(), &cookie))
}

/// `GET /logout`
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> Result<Response> {
    state.with_storage(|storage| {
        storage.delete_session(&current.token_hash)?;
        storage.log_activity(current.actor(), ActivityAction::Logout, "")?;
        Ok(())
    })?;

    info!("{} logged out", current.user.username);
    Ok(session::with_cookie(
        Redirect::to("/login?logged_out=1").into_response(),
        &session::clear_cookie(),
    ))
}
