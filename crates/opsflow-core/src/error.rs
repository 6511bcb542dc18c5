//! Orchestration error types

use crate::classify::ApiError;
use crate::handle::OperationHandle;
use opsflow_config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Orchestration errors
///
/// Retry exhaustion, remote operation failure and poll timeout are separate
/// variants so callers can tell "the operation failed" from "we stopped
/// waiting".
#[derive(Error, Debug)]
pub enum OpsError {
    /// Non-retryable API error, surfaced as returned by the remote
    #[error(transparent)]
    Fatal(ApiError),

    #[error("{operation} still failing after {attempts} attempts in {elapsed:?}: {last}")]
    RetryTimeout {
        operation: String,
        elapsed: Duration,
        attempts: u32,
        last: ApiError,
    },

    /// The remote accepted the operation and later reported it failed
    #[error("Operation {handle} failed (status {status}): {message}")]
    OperationFailed {
        handle: OperationHandle,
        status: String,
        message: String,
    },

    #[error("Timed out after {elapsed:?} waiting for {handle} ({polls} polls, last status {last_status})")]
    PollTimeout {
        handle: OperationHandle,
        elapsed: Duration,
        polls: u32,
        last_status: String,
    },

    #[error("{operation} returned no operation handle")]
    MissingHandle { operation: String },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse error category for matching without inspecting messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Fatal,
    Timeout,
    OperationFailed,
    Cancelled,
    Config,
}

impl OpsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OpsError::Fatal(_) | OpsError::MissingHandle { .. } => ErrorCategory::Fatal,
            OpsError::RetryTimeout { .. } | OpsError::PollTimeout { .. } => {
                ErrorCategory::Timeout
            }
            OpsError::OperationFailed { .. } => ErrorCategory::OperationFailed,
            OpsError::Cancelled { .. } => ErrorCategory::Cancelled,
            OpsError::InvalidConfig(_) | OpsError::Config(_) => ErrorCategory::Config,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// The remote error behind a fatal failure or an exhausted retry
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            OpsError::Fatal(err) => Some(err),
            OpsError::RetryTimeout { last, .. } => Some(last),
            _ => None,
        }
    }

    pub(crate) fn cancelled(operation: &str) -> Self {
        OpsError::Cancelled {
            operation: operation.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OpsError>;
