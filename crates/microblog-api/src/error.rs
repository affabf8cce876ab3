use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::{error, warn};

use microblog_types::api::ValidationError;
use microblog_types::models::FlashMessage;

const NOT_FOUND_PAGE: &str = include_str!("../templates/404.html");
const SERVER_ERROR_PAGE: &str = include_str!("../templates/500.html");

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Please use a different username or email address.")]
    DuplicateUser,

    #[error("Passwords do not match.")]
    PasswordMismatch,

    #[error("The password reset link is invalid or has expired.")]
    InvalidOrExpiredToken,

    #[error("You cannot follow yourself!")]
    SelfFollow,

    #[error("{0} not found.")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("The CSRF token is missing or invalid.")]
    Csrf,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Errors the user caused and can fix; handlers show these as a flash
    /// message and redirect instead of failing the request.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            AppError::Csrf | AppError::BadRequest(_) | AppError::Internal(_)
        )
    }

    pub fn flash(&self) -> FlashMessage {
        FlashMessage::error(self.to_string())
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AppError::NotFound(what.to_string())
    }
}

impl From<tera::Error> for AppError {
    fn from(err: tera::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            AppError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, Html(SERVER_ERROR_PAGE)).into_response()
            }
            _ => {
                warn!("Rejected request: {}", self);
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
        }
    }
}
