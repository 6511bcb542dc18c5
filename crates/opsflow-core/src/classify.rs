//! Remote API errors and their retryable/fatal classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by the control plane SDK for a single call
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ApiError {
    #[serde(rename = "Code")]
    pub code: String,

    #[serde(rename = "Message")]
    pub message: String,

    #[serde(rename = "RequestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// A call that returned normally but whose payload reports a rejection
    /// (e.g. a `FAILED` status inside a successful response)
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(codes::FAILED_OPERATION, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(codes::NETWORK_ERROR, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(codes::REQUEST_LIMIT_EXCEEDED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::RESOURCE_NOT_FOUND, message)
    }

    /// True when the code equals `code` or is a sub-code of it
    /// (`ResourceInUse.Instance` matches `ResourceInUse`)
    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
            || (self.code.len() > code.len()
                && self.code.starts_with(code)
                && self.code.as_bytes()[code.len()] == b'.')
    }
}

/// Well-known control plane error codes
pub mod codes {
    pub const REQUEST_LIMIT_EXCEEDED: &str = "RequestLimitExceeded";
    pub const RESOURCE_IN_USE: &str = "ResourceInUse";
    pub const RESOURCE_BUSY: &str = "ResourceBusy";
    pub const INTERNAL_ERROR: &str = "InternalError";
    pub const NETWORK_ERROR: &str = "ClientError.NetworkError";
    pub const HTTP_STATUS_ERROR: &str = "ClientError.HttpStatusCodeError";
    pub const OPERATION_IN_PROGRESS: &str = "OperationDenied.InstanceStatusLimit";
    pub const FAILED_OPERATION: &str = "FailedOperation";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    pub const INVALID_PARAMETER: &str = "InvalidParameter";
    pub const AUTH_FAILURE: &str = "AuthFailure";
    pub const UNAUTHORIZED_OPERATION: &str = "UnauthorizedOperation";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

/// Decides whether a failed call is worth another attempt
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ApiError) -> Classification;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&ApiError) -> Classification + Send + Sync,
{
    fn classify(&self, error: &ApiError) -> Classification {
        self(error)
    }
}

/// Classifies by error code. Listed codes (and their sub-codes) are
/// retryable, everything else is fatal.
#[derive(Debug, Clone)]
pub struct CodeClassifier {
    retryable: Vec<String>,
}

impl Default for CodeClassifier {
    fn default() -> Self {
        Self {
            retryable: [
                codes::REQUEST_LIMIT_EXCEEDED,
                codes::RESOURCE_IN_USE,
                codes::RESOURCE_BUSY,
                codes::INTERNAL_ERROR,
                codes::NETWORK_ERROR,
                codes::HTTP_STATUS_ERROR,
                codes::OPERATION_IN_PROGRESS,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

impl CodeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `code` (and its sub-codes) as retryable as well
    pub fn with_retryable(mut self, code: impl Into<String>) -> Self {
        self.retryable.push(code.into());
        self
    }
}

impl ErrorClassifier for CodeClassifier {
    fn classify(&self, error: &ApiError) -> Classification {
        if self.retryable.iter().any(|code| error.has_code(code)) {
            Classification::Retryable
        } else {
            Classification::Fatal
        }
    }
}
