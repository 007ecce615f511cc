//! Mapping of namespace errors onto HTTP responses

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use paxfs_common::PaxfsError;
use paxfs_common::error::PARAMETER_VALIDATE_ERROR;

use crate::model::response::Result;

/// HTTP status for a namespace error
pub fn status_of(error: &PaxfsError) -> StatusCode {
    match error {
        PaxfsError::NotLeader | PaxfsError::NoQuorum => StatusCode::SERVICE_UNAVAILABLE,
        PaxfsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        PaxfsError::Conflict { .. } | PaxfsError::AlreadyExists(_) | PaxfsError::NotEmpty(_) => {
            StatusCode::CONFLICT
        }
        PaxfsError::NotFound(_) | PaxfsError::ParentMissing(_) => StatusCode::NOT_FOUND,
        PaxfsError::IsDirectory(_) | PaxfsError::InvalidPath(_) | PaxfsError::Config(_) => {
            StatusCode::BAD_REQUEST
        }
        PaxfsError::Storage(_) | PaxfsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(error: &PaxfsError) -> HttpResponse {
    Result::<()>::http_response(
        status_of(error).as_u16(),
        error.error_code().code,
        error.to_string(),
        (),
    )
}

pub fn bad_request(message: String) -> HttpResponse {
    Result::<()>::http_response(
        StatusCode::BAD_REQUEST.as_u16(),
        PARAMETER_VALIDATE_ERROR.code,
        message,
        (),
    )
}
