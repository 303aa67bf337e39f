//! Error types for the account service and their HTTP rendering.
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures raised by a `UserStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid user row: {0}")]
    InvalidRow(String),
}

/// Errors surfaced by the account lifecycle and session layers.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please verify your email before logging in")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("User not found or already verified")]
    UserNotFoundOrAlreadyVerified,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("mail delivery failed: {0:#}")]
    MailDelivery(#[source] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::EmailTaken,
            other => AuthError::Internal(other.into()),
        }
    }
}

// Malformed bodies and query strings get the same JSON shape as any other failure.
impl From<JsonRejection> for AuthError {
    fn from(e: JsonRejection) -> Self {
        tracing::debug!(error = %e, "rejected request body");
        AuthError::Validation("Invalid request".to_string())
    }
}

impl From<QueryRejection> for AuthError {
    fn from(e: QueryRejection) -> Self {
        tracing::debug!(error = %e, "rejected query string");
        AuthError::Validation("Invalid request".to_string())
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::UserNotFoundOrAlreadyVerified => StatusCode::BAD_REQUEST,
            AuthError::MailDelivery(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short message safe to show to the end user.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::MailDelivery(_) => {
                "We could not send the email. Please try again later.".to_string()
            }
            AuthError::Internal(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_verification: Option<bool>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            success: false,
            error: self.public_message(),
            needs_verification: matches!(self, AuthError::EmailNotVerified).then_some(true),
        };
        (status, Json(body)).into_response()
    }
}
