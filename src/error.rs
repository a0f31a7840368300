use crate::notifier::NotifyError;
use crate::stripe::SignatureError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// Application-specific error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("No purchase found for this email")]
    PurchaseNotFound,

    #[error("Access has been deactivated")]
    Forbidden,

    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl AppError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Signature(_) => StatusCode::BAD_REQUEST,

            AppError::InvalidToken | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,

            AppError::PurchaseNotFound => StatusCode::NOT_FOUND,

            AppError::Forbidden => StatusCode::FORBIDDEN,

            AppError::Database(_)
            | AppError::Upstream(_)
            | AppError::NotConfigured(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client. Store and provider details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Signature(_) => "Webhook signature verification failed".to_string(),
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Upstream(_) => "An upstream service failed, please retry".to_string(),
            AppError::NotConfigured(what) => format!("{what} is not configured"),
            other => other.to_string(),
        }
    }

    /// Log server-side failures and forward them to Sentry; client errors are left alone.
    pub fn report(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "request failed");
            sentry::capture_error(self);
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.report();
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        AppError::Database(format!("connection pool: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs may carry credentials.
        AppError::Upstream(err.without_url().to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::NotConfigured => AppError::NotConfigured("Email delivery"),
            other => AppError::Upstream(other.to_string()),
        }
    }
}
