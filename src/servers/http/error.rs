use crate::{
    constants::{METHOD_NOT_ALLOWED, NOT_FOUND},
    gateway::DispatchError,
    storage,
};
use hyper::StatusCode;
use serde_json::json;
use std::error::Error as StdError;

use super::response::HttpResponse;

#[derive(Debug)]
pub(super) enum HttpError {
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
    ServiceUnavailable(String),
    Other(String),
}

/// Alias for a `Result` with the error type `HttpError`.
pub(super) type Result<T> = std::result::Result<T, HttpError>;

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HttpError::NotFound => write!(f, "{}", NOT_FOUND),
            HttpError::MethodNotAllowed => write!(f, "{}", METHOD_NOT_ALLOWED),
            HttpError::BadRequest(reason) => write!(f, "{}", reason),
            HttpError::ServiceUnavailable(reason) => write!(f, "{}", reason),
            HttpError::Other(reason) => write!(f, "{}", reason),
        }
    }
}

impl StdError for HttpError {}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HttpError> for HttpResponse {
    fn from(err: HttpError) -> Self {
        HttpResponse::json(err.status(), &json!({ "error": err.to_string() }))
    }
}

impl From<DispatchError> for HttpError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(reason) => HttpError::BadRequest(reason),
            DispatchError::NoExecutorAvailable | DispatchError::StoreUnavailable(_) => {
                HttpError::ServiceUnavailable(err.to_string())
            }
        }
    }
}

impl From<storage::Error> for HttpError {
    fn from(err: storage::Error) -> Self {
        match err.is_unavailable() {
            true => HttpError::ServiceUnavailable(err.to_string()),
            false => HttpError::Other(err.to_string()),
        }
    }
}
