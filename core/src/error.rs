//! Error taxonomy and response classification.
//!
//! # Design
//! Every operation returns `ApiError`. Missing required fields are caught
//! locally as `Validation` before any request is built. A response the server
//! rejected becomes `RateLimited` (429) or `Remote`, and a body that does not
//! parse, or lacks a server-assigned id, becomes `Decode`.
//!
//! How strictly a response status is checked differs per resource, so the
//! gates live in `StatusGate` and each resource picks its own.

use std::time::Duration;

use thiserror::Error;

use crate::http::{HttpResponse, TransportError};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_MULTIPLE_CHOICES: u16 = 300;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// A required field was empty.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("API key name is required")]
    ApiKeyNameRequired,
    #[error("API key id is required")]
    ApiKeyIdRequired,
    #[error("template name is required")]
    TemplateNameRequired,
    #[error("template id is required")]
    TemplateIdRequired,
    #[error("template version id is required")]
    TemplateVersionIdRequired,
    #[error("template version name is required")]
    TemplateVersionNameRequired,
    #[error("template version subject is required")]
    TemplateVersionSubjectRequired,
}

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The server rejected the request. `body` is empty when the resource
    /// reports only the status.
    #[error("HTTP {status}{}", body_suffix(.body))]
    Remote { status: u16, body: String },

    #[error("rate limited (HTTP 429){}", body_suffix(.body))]
    RateLimited { body: String },

    #[error("deserialization failed: {0}")]
    Decode(String),

    #[error("serialization failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("deadline exceeded after {attempts} attempt(s) in {elapsed:?}")]
    DeadlineExceeded { attempts: u32, elapsed: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl ApiError {
    /// HTTP-equivalent severity of the error.
    ///
    /// Decode and transport failures count as internal errors (500). Errors
    /// raised without talking to the server have no status.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(STATUS_TOO_MANY_REQUESTS),
            ApiError::Decode(_) | ApiError::Transport(_) => Some(STATUS_INTERNAL_SERVER_ERROR),
            ApiError::Validation(_)
            | ApiError::Encode(_)
            | ApiError::DeadlineExceeded { .. }
            | ApiError::Cancelled => None,
        }
    }

    /// The only condition the retry wrapper treats as recoverable.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }
}

/// Classify a response the caller has already decided is a rejection.
pub fn classify(response: &HttpResponse) -> ApiError {
    if response.status == STATUS_TOO_MANY_REQUESTS {
        return ApiError::RateLimited {
            body: response.body.clone(),
        };
    }
    ApiError::Remote {
        status: response.status,
        body: response.body.clone(),
    }
}

/// Which statuses a resource accepts before decoding a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusGate {
    /// Everything below 300.
    Success,
    /// Exactly this status.
    Exact(u16),
    /// Everything below 500 except 429.
    BelowServerError,
    /// No check; the decoder decides.
    Ungated,
}

impl StatusGate {
    pub fn check(self, response: &HttpResponse) -> Result<(), ApiError> {
        let accepted = match self {
            StatusGate::Success => response.status < STATUS_MULTIPLE_CHOICES,
            StatusGate::Exact(expected) => response.status == expected,
            StatusGate::BelowServerError => {
                response.status < STATUS_INTERNAL_SERVER_ERROR
                    && response.status != STATUS_TOO_MANY_REQUESTS
            }
            StatusGate::Ungated => true,
        };
        if accepted {
            Ok(())
        } else {
            Err(classify(response))
        }
    }
}

/// Decode a JSON body. Any failure is reported as `Decode`.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(what: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(format!("failed parsing {what}: {e}")))
}

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|e| ApiError::Encode(e.to_string()))
}
