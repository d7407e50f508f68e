//! HTTP mapping of [`Error`] and the error page middleware.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use tera::Context;
use tracing::{error, warn};

use super::AppState;
use crate::error::Error;

/// Marker left on error responses so the middleware can render a page.
#[derive(Debug, Clone)]
pub(crate) struct ErrorPage {
    message: String,
}

impl Error {
    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Something went wrong on our side. The error has been logged.".to_string()
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
            self.to_string()
        };

        let mut response = (status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorPage { message });
        response
    }
}

/// Replace plain-text error bodies with the HTML error page.
pub(crate) async fn render_error_pages(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let Some(page) = response.extensions().get::<ErrorPage>().cloned() else {
        return response;
    };

    let status = response.status();
    let mut context = Context::new();
    context.insert("current_user", &Option::<()>::None);
    context.insert("flash", &Option::<()>::None);
    context.insert("status", &status.as_u16());
    context.insert("reason", status.canonical_reason().unwrap_or("Error"));
    context.insert("message", &page.message);

    match state.templates.render("error.html", &context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render error page: {}", e);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = Error::internal("secret detail").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert!(!page.message.contains("secret detail"));
    }

    #[test]
    fn test_client_errors_keep_message() {
        let response = Error::not_found("equipment 9").into_response();
        let page = response.extensions().get::<ErrorPage>().unwrap();
        assert_eq!(page.message, "equipment 9 not found");
    }
}
