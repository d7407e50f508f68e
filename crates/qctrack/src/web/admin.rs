//! Administrator pages: user management and the activity log.

use axum::extract::State;
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::session::{AdminUser, CurrentUser};
use super::{blocking, AppState, RecordId};
use crate::activity::ActivityAction;
use crate::error::{Error, Result};
use crate::storage::Flash;
use crate::user::{hash_password, validate_username, Role, User};

/// Number of activity entries shown on the activity page.
const ACTIVITY_PAGE_SIZE: usize = 200;

const USERS_PAGE: &str = "/admin/users";

/// Submitted new-user form.
#[derive(Debug, Deserialize)]
pub struct CreateUserForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
}

/// Submitted password reset form.
#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    password: String,
}

/// Turn a rejected input into a flash on the users page; pass other
/// errors through.
fn reject(state: &AppState, current: &CurrentUser, error: Error) -> Result<Redirect> {
    if error.is_user_error() {
        state.flash_redirect(current, &Flash::danger(error.to_string()), USERS_PAGE)
    } else {
        Err(error)
    }
}

fn load_user(state: &AppState, id: i64) -> Result<User> {
    state
        .with_storage(|storage| storage.get_user(id))?
        .ok_or_else(|| Error::not_found(format!("user {id}")))
}

/// `GET /admin/users`
pub async fn users(
    State(state): State<AppState>,
    AdminUser(current): AdminUser,
) -> Result<Html<String>> {
    let users = state.with_storage(|storage| storage.list_users())?;
    let mut context = state.page_context(&current)?;
    context.insert("users", &users);
    state.render("admin_users.html", &context)
}

/// `POST /admin/users`
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(current): AdminUser,
    Form(form): Form<CreateUserForm>,
) -> Result<Redirect> {
    let (username, role) = match validate_username(&form.username)
        .and_then(|username| Ok((username, form.role.parse::<Role>()?)))
    {
        Ok(parsed) => parsed,
        Err(e) => return reject(&state, &current, e),
    };

    let cost = state.config.auth.bcrypt_cost;
    let password = form.password;
    let password_hash = match blocking(move || hash_password(&password, cost)).await {
        Ok(hash) => hash,
        Err(e) => return reject(&state, &current, e),
    };

    let created = state.with_storage(|storage| {
        let user = storage.create_user(&username, &password_hash, role)?;
        storage.log_activity(
            current.actor(),
            ActivityAction::UserCreated,
            &format!("{} ({})", user.username, user.role),
        )?;
        Ok(user)
    });

    let flash = match created {
        Ok(user) => {
            info!("{} created user {}", current.user.username, user.username);
            Flash::success(format!("User {} created.", user.username))
        }
        Err(Error::Conflict(message)) => Flash::warning(message),
        Err(e) => return Err(e),
    };
    state.flash_redirect(&current, &flash, USERS_PAGE)
}

/// `POST /admin/users/{id}/delete`
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(current): AdminUser,
    RecordId(id): RecordId,
) -> Result<Redirect> {
    let target = load_user(&state, id)?;
    if target.is_admin() {
        let flash = Flash::danger(format!(
            "{} is an administrator and cannot be deleted.",
            target.username
        ));
        return state.flash_redirect(&current, &flash, USERS_PAGE);
    }

    state.with_storage(|storage| {
        storage.delete_user(id)?;
        storage.log_activity(current.actor(), ActivityAction::UserDeleted, &target.username)?;
        Ok(())
    })?;

    info!("{} deleted user {}", current.user.username, target.username);
    let flash = Flash::success(format!("User {} deleted.", target.username));
    state.flash_redirect(&current, &flash, USERS_PAGE)
}

/// `POST /admin/users/{id}/password`
///
/// Resetting a password ends every session of that user, including the
/// admin's own when they reset themselves.
pub async fn reset_password(
    State(state): State<AppState>,
    AdminUser(current): AdminUser,
    RecordId(id): RecordId,
    Form(form): Form<PasswordForm>,
) -> Result<Redirect> {
    let target = load_user(&state, id)?;

    let cost = state.config.auth.bcrypt_cost;
    let password = form.password;
    let password_hash = match blocking(move || hash_password(&password, cost)).await {
        Ok(hash) => hash,
        Err(e) => return reject(&state, &current, e),
    };

    state.with_storage(|storage| {
        storage.set_password_hash(id, &password_hash)?;
        storage.log_activity(current.actor(), ActivityAction::PasswordReset, &target.username)?;
        Ok(())
    })?;

    info!("{} reset the password of {}", current.user.username, target.username);
    if target.id == current.user.id {
        return Ok(Redirect::to("/login"));
    }
    let flash = Flash::success(format!("Password for {} updated.", target.username));
    state.flash_redirect(&current, &flash, USERS_PAGE)
}

/// `GET /admin/activity`
pub async fn activity(
    State(state): State<AppState>,
    AdminUser(current): AdminUser,
) -> Result<Html<String>> {
    let entries = state.with_storage(|storage| storage.recent_activity(ACTIVITY_PAGE_SIZE))?;
    let rows: Vec<_> = entries
        .iter()
        .map(|entry| json!({ "entry": entry, "administrative": entry.action.is_administrative() }))
        .collect();

    let mut context = state.page_context(&current)?;
    context.insert("rows", &rows);
    state.render("admin_activity.html", &context)
}
