use std::collections::BTreeMap;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::result::DatabaseErrorKind;
use serde_json::json;
use thiserror::Error;

/// Field name to the list of messages reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub type DbError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid input")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    /// A toggle or subscription request that the current state does not allow.
    #[error("{0}")]
    Rejected(String),

    #[error("Authentication credentials were not provided.")]
    Unauthorized,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("You must be the creator of this object to edit it.")]
    Forbidden,

    #[error("Not found.")]
    NotFound,

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Internal error: {0}")]
    Internal(DbError),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound | ApiError::InvalidPage => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::Rejected(reason) => json!({ "errors": reason }),
            ApiError::Internal(e) => {
                log::error!("request failed: {e}");
                json!({ "detail": "Internal server error." })
            }
            other => json!({ "detail": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => ApiError::NotFound,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                log::debug!("unique constraint rejected write: {}", info.message());
                ApiError::Rejected("Object already exists.".to_string())
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                log::debug!("foreign key rejected write: {}", info.message());
                ApiError::field("non_field_errors", "Referenced object does not exist.")
            }
            other => ApiError::Internal(Box::new(other)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ApiError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        ApiError::Internal(Box::new(e))
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(Box::new(e))
    }
}
