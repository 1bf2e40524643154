use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("invalid credential format")]
    InvalidCredentialFormat,

    #[error("invalid credential payload")]
    InvalidCredentialPayload,

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized")]
    Unauthorized,

    #[error("empty message content")]
    EmptyContent,

    #[error("user already a member of the chatroom")]
    AlreadyMember,

    #[error("read acknowledgment retry budget exhausted")]
    ReclamationConflict,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            // A transient conflict that escapes the reclamation retry loop
            // has exhausted its budget; everywhere else it means the store
            // could not complete the request.
            StoreError::Conflict => AppError::ReclamationConflict,
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
        }
    }
}

impl ResponseError for AppError {
    /// HTTP status for failures surfaced at the handshake edge. Everything
    /// after the handshake travels as an `error` event, not a status code.
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentialFormat | AppError::InvalidCredentialPayload => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::MissingParameter(_)
            | AppError::InvalidIdentifier(_)
            | AppError::EmptyContent
            | AppError::AlreadyMember => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReclamationConflict => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) | AppError::StartServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "message": self.to_string() }))
    }
}
