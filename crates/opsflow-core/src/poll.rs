//! Status polling for accepted asynchronous operations

use crate::cancel::{self, CancelSignal};
use crate::error::{OpsError, Result};
use crate::handle::OperationHandle;
use opsflow_config::PollingSettings;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one status describe
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult<O> {
    pub status: String,

    /// Error message reported by the remote; non-empty means the operation
    /// failed regardless of status
    pub failure: Option<String>,

    pub object: O,
}

impl<O> PollResult<O> {
    pub fn new(status: impl Into<String>, object: O) -> Self {
        Self {
            status: status.into(),
            failure: None,
            object,
        }
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

/// Status values that end polling
#[derive(Debug, Clone, Default)]
pub struct TerminalStates {
    success: HashSet<String>,
    failure: HashSet<String>,
}

impl TerminalStates {
    pub fn success<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: states.into_iter().map(Into::into).collect(),
            failure: HashSet::new(),
        }
    }

    pub fn with_failure<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure.extend(states.into_iter().map(Into::into));
        self
    }

    pub fn is_success(&self, status: &str) -> bool {
        self.success.contains(status)
    }

    pub fn is_failure(&self, status: &str) -> bool {
        self.failure.contains(status)
    }
}

enum Observation<O> {
    Done(O),
    Failed { status: String, message: String },
    Pending(String),
}

/// Polls a status endpoint on a fixed interval until a terminal state or
/// the timeout. Never asks the remote to cancel anything.
#[derive(Debug, Clone)]
pub struct OperationPoller {
    interval: Duration,
    timeout: Duration,
    cancel: Option<CancelSignal>,
}

impl OperationPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            cancel: None,
        }
    }

    pub fn from_settings(settings: &PollingSettings) -> Self {
        Self::new(settings.interval(), settings.timeout())
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `describe_status` until its status is in `states`' success set.
    ///
    /// A non-empty failure message or a status in the failure set ends
    /// polling with [`OpsError::OperationFailed`]. Errors from
    /// `describe_status` are returned as-is; wrap it in a
    /// [`RetryingExecutor`](crate::RetryingExecutor) to ride out transient
    /// fetch failures.
    pub async fn poll_until<O, F, Fut>(
        &self,
        handle: &OperationHandle,
        mut describe_status: F,
        states: &TerminalStates,
    ) -> Result<O>
    where
        F: FnMut(OperationHandle) -> Fut,
        Fut: Future<Output = Result<PollResult<O>>>,
    {
        self.run(handle, |h| {
            let fetch = describe_status(h);
            async move {
                let PollResult {
                    status,
                    failure,
                    object,
                } = fetch.await?;

                Ok(if states.is_success(&status) {
                    Observation::Done(object)
                } else if let Some(message) = failure.filter(|m| !m.is_empty()) {
                    Observation::Failed { status, message }
                } else if states.is_failure(&status) {
                    Observation::Failed {
                        message: format!("reached failure state {}", status),
                        status,
                    }
                } else {
                    Observation::Pending(status)
                })
            }
        })
        .await
    }

    /// Poll until the resource behind `handle` is gone.
    ///
    /// `describe` returns `None` once the remote no longer knows the
    /// resource. A status in the success set also counts as gone (e.g.
    /// `DELETED`); the failure set aborts as in
    /// [`poll_until`](Self::poll_until).
    pub async fn poll_until_gone<F, Fut>(
        &self,
        handle: &OperationHandle,
        mut describe: F,
        states: &TerminalStates,
    ) -> Result<()>
    where
        F: FnMut(OperationHandle) -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        self.run(handle, |h| {
            let fetch = describe(h);
            async move {
                Ok(match fetch.await? {
                    None => Observation::Done(()),
                    Some(status) if states.is_success(&status) => Observation::Done(()),
                    Some(status) if states.is_failure(&status) => Observation::Failed {
                        message: format!("reached failure state {}", status),
                        status,
                    },
                    Some(status) => Observation::Pending(status),
                })
            }
        })
        .await
    }

    async fn run<O, F, Fut>(&self, handle: &OperationHandle, mut observe: F) -> Result<O>
    where
        F: FnMut(OperationHandle) -> Fut,
        Fut: Future<Output = Result<Observation<O>>>,
    {
        let cancel = self.cancel.as_ref();
        let operation = format!("polling {}", handle);
        let start = Instant::now();
        let mut polls: u32 = 0;

        loop {
            let observation = cancel::race(observe(handle.clone()), cancel)
                .await
                .ok_or_else(|| OpsError::cancelled(&operation))??;
            polls += 1;

            let status = match observation {
                Observation::Done(object) => {
                    tracing::info!("{} reached a terminal state after {} polls", handle, polls);
                    return Ok(object);
                }
                Observation::Failed { status, message } => {
                    tracing::warn!("{} failed with status {}: {}", handle, status, message);
                    return Err(OpsError::OperationFailed {
                        handle: handle.clone(),
                        status,
                        message,
                    });
                }
                Observation::Pending(status) => status,
            };

            let elapsed = start.elapsed();
            tracing::debug!("{} is {} (poll {}, {:?} elapsed)", handle, status, polls, elapsed);

            if elapsed >= self.timeout {
                tracing::warn!(
                    "Gave up waiting for {} after {:?}; last status {}",
                    handle,
                    elapsed,
                    status
                );
                return Err(OpsError::PollTimeout {
                    handle: handle.clone(),
                    elapsed,
                    polls,
                    last_status: status,
                });
            }

            let wait = self.interval.min(self.timeout - elapsed);
            if !cancel::sleep(wait, cancel).await {
                return Err(OpsError::cancelled(&operation));
            }
        }
    }
}
