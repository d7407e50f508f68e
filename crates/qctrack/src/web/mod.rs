//! HTTP front end: router, shared state and middleware.

pub mod admin;
pub mod auth;
pub mod equipment;
pub mod error;
pub mod export;
pub mod session;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use tera::{Context, Tera};
use tokio::net::TcpListener;
use tracing::{debug, info, Instrument};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::{Flash, Storage};

pub use session::{AdminUser, CurrentUser};

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The single database connection.
    pub storage: Arc<Mutex<Storage>>,
    /// Compiled page templates.
    pub templates: Arc<Tera>,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state from an opened database and configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the templates fail to compile.
    pub fn new(storage: Storage, config: Config) -> Result<Self> {
        let templates = crate::templates::build(config.utc_offset())?;
        Ok(Self {
            storage: Arc::new(Mutex::new(storage)),
            templates: Arc::new(templates),
            config: Arc::new(config),
        })
    }

    /// Run a synchronous storage operation under the connection lock.
    ///
    /// Never call this while holding the lock across an `.await`.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or `Error::Internal` if a previous
    /// holder panicked.
    pub fn with_storage<T>(&self, op: impl FnOnce(&Storage) -> Result<T>) -> Result<T> {
        let storage = self
            .storage
            .lock()
            .map_err(|_| Error::internal("storage lock poisoned"))?;
        op(&storage)
    }

    /// Context for a logged-in page: the user and any pending flash.
    ///
    /// # Errors
    ///
    /// Returns an error if the flash lookup fails.
    pub fn page_context(&self, current: &CurrentUser) -> Result<Context> {
        let flash: Option<Flash> =
            self.with_storage(|storage| storage.take_flash(&current.token_hash))?;
        let mut context = Context::new();
        context.insert("current_user", &current.user);
        context.insert("flash", &flash);
        Ok(context)
    }

    /// Render a page template.
    ///
    /// # Errors
    ///
    /// Returns `Error::Template` if rendering fails.
    pub fn render(&self, template: &str, context: &Context) -> Result<Html<String>> {
        Ok(Html(self.templates.render(template, context)?))
    }

    /// Queue `flash` for `current` and redirect to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flash cannot be stored.
    pub fn flash_redirect(&self, current: &CurrentUser, flash: &Flash, to: &str) -> Result<Redirect> {
        current.flash(self, flash)?;
        Ok(Redirect::to(to))
    }
}

/// Numeric `{id}` segment of a route.
///
/// Anything that does not parse as an integer names no record, so it is
/// answered with the 404 page rather than axum's plain-text 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for RecordId {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Self(id)),
            Err(rejection) => {
                debug!("Bad id in {}: {}", parts.uri.path(), rejection);
                Err(Error::not_found(format!("page {}", parts.uri.path())))
            }
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/", get(equipment::index))
        .route("/equipment", post(equipment::register))
        .route("/equipment/{id}/tests", post(equipment::record_test))
        .route("/equipment/{id}/history", get(equipment::history))
        .route("/equipment/{id}/delete", post(equipment::delete))
        .route("/search", get(equipment::search))
        .route("/export/search.pdf", get(export::search_pdf))
        .route("/export/search.html", get(export::search_html))
        .route("/equipment/{id}/history.pdf", get(export::history_pdf))
        .route("/equipment/{id}/history.html", get(export::history_html))
        .route("/admin/users", get(admin::users).post(admin::create_user))
        .route("/admin/users/{id}/delete", post(admin::delete_user))
        .route("/admin/users/{id}/password", post(admin::reset_password))
        .route("/admin/activity", get(admin::activity))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::render_error_pages,
        ))
        .layer(middleware::from_fn(request_tracing))
        .with_state(state)
}

/// Serve the application until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Run CPU-heavy work (bcrypt, PDF layout) off the async workers.
///
/// # Errors
///
/// Returns the closure's error, or `Error::Internal` if the task panicked.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("background task failed: {e}")))?
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found(request: Request) -> Response {
    Error::not_found(format!("page {}", request.uri().path())).into_response()
}

async fn request_tracing(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "http.request",
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let response = next.run(request).await;
        debug!(status = response.status().as_u16(), "Request handled");
        response
    }
    .instrument(span)
    .await
}
