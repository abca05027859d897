use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Why a token failed verification. Both kinds look identical to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("expired token")]
    Expired,
}

/// Reasons the identity middleware denies a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("no token")]
    NoToken,
    #[error("invalid token: {0}")]
    InvalidToken(TokenError),
    #[error("identity not found")]
    IdentityNotFound,
    #[error("account deactivated")]
    AccountDeactivated,
    #[error("account locked")]
    AccountLocked,
}

impl AuthRejection {
    /// Message sent to the client. A vanished identity reads like a bad token.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthRejection::NoToken => "Access denied. No token provided.",
            AuthRejection::InvalidToken(_) | AuthRejection::IdentityNotFound => {
                "Invalid or expired token."
            }
            AuthRejection::AccountDeactivated => "Account has been deactivated.",
            AuthRejection::AccountLocked => "Account is locked.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthRejection),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(vec![msg.into()])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Validation(errors) => errors.join("; "),
            ApiError::Conflict(msg) => msg.clone(),
            ApiError::InvalidCredentials => "Invalid email or password".into(),
            ApiError::Unauthenticated(rejection) => rejection.public_message().into(),
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Server error".into()
            }
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

/// Store failures the handlers need to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict("email");
            }
        }
        StoreError::Other(e.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => {
                ApiError::Conflict("User with this email already exists".into())
            }
            StoreError::Other(e) => ApiError::Internal(e),
        }
    }
}
