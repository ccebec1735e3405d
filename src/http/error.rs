use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::domain::order::ServiceError;
use crate::messaging::PublishError;

// ============================================================================
// HTTP Error Boundary
// ============================================================================
//
// Every error leaves the server as `{"error": "..."}`. Internal failures are
// already logged with full context where they happen; the client only sees
// a generic message.
//
// ============================================================================

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorBody {
        error: message.into(),
    })
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::EmptyUid | ServiceError::InvalidOrder(_) | ServiceError::Malformed(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::DuplicateKey(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ServiceError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            ServiceError::Malformed(e) => format!("invalid request body: {e}"),
            other => other.to_string(),
        };
        error_response(self.status_code(), message)
    }
}

impl ResponseError for PublishError {
    fn status_code(&self) -> StatusCode {
        match self {
            PublishError::Unavailable | PublishError::Delivery(_) => StatusCode::SERVICE_UNAVAILABLE,
            PublishError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            PublishError::Encode(_) => INTERNAL_ERROR_MESSAGE,
            _ => "order publisher unavailable",
        };
        error_response(self.status_code(), message)
    }
}
