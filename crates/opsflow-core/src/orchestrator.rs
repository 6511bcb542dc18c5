//! Orchestrator facade
//!
//! Owns the shared rate gate, the error classifier and the tunables, and
//! hands out executors, collectors and pollers wired to them. One
//! orchestrator per SDK client; clone the `Arc` to share it.

use crate::cancel::CancelSignal;
use crate::classify::{ApiError, CodeClassifier, ErrorClassifier};
use crate::error::{OpsError, Result};
use crate::gate::RateGate;
use crate::handle::OperationHandle;
use crate::page::{Page, PageCollector};
use crate::poll::{OperationPoller, PollResult, TerminalStates};
use crate::retry::{ClientToken, RetryConfig, RetryingExecutor};
use async_trait::async_trait;
use opsflow_config::OpsConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A mutating remote operation that completes asynchronously
///
/// Implementations wrap the SDK calls of one operation: the submit call,
/// the status describe for the handle it returns, and the final read-back.
/// Keeping them on one type keeps the handle paired with its own status
/// check.
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    /// Response of the submit call
    type Accepted: Send;

    /// Object carried by status responses
    type Status: Send;

    /// What the caller gets back once the operation completed
    type Output: Send;

    /// Operation name used for rate gating and logs (e.g. "CreateDBInstance")
    fn name(&self) -> &str;

    /// Submit the request. Every attempt of one `apply` gets the same token.
    async fn submit(&self, token: &ClientToken) -> std::result::Result<Self::Accepted, ApiError>;

    /// Extract the handle to poll from the submit response
    fn handle(&self, accepted: &Self::Accepted) -> Option<OperationHandle>;

    /// Operation name of the status describe. Gated on its own quota.
    fn status_operation(&self) -> &str {
        self.name()
    }

    /// Operation name of the read-back call
    fn read_back_operation(&self) -> &str {
        self.name()
    }

    async fn describe_status(
        &self,
        handle: &OperationHandle,
    ) -> std::result::Result<PollResult<Self::Status>, ApiError>;

    fn terminal_states(&self) -> TerminalStates;

    async fn read_back(&self, handle: &OperationHandle) -> std::result::Result<Self::Output, ApiError>;
}

/// Shared entry point to the orchestration primitives
pub struct Orchestrator {
    gate: Arc<RateGate>,
    classifier: Arc<dyn ErrorClassifier>,
    retry: RetryConfig,
    read_deadline: Duration,
    write_deadline: Duration,
    page_size: u64,
    poll_interval: Duration,
    poll_timeout: Duration,
    cancel: Option<CancelSignal>,
}

impl Orchestrator {
    pub fn new(config: &OpsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: Arc::new(RateGate::from_settings(&config.rate_limit)),
            classifier: Arc::new(CodeClassifier::default()),
            retry: RetryConfig::from_settings(&config.retry),
            read_deadline: config.retry.read_deadline(),
            write_deadline: config.retry.write_deadline(),
            page_size: config.pagination.page_size,
            poll_interval: config.polling.interval(),
            poll_timeout: config.polling.timeout(),
            cancel: None,
        })
    }

    /// Build from the discovered config file and environment
    pub fn from_env() -> Result<Self> {
        let config = OpsConfig::load()?;
        Self::new(&config)
    }

    /// Use an existing gate, e.g. one shared with another client
    pub fn with_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn read_deadline(&self) -> Duration {
        self.read_deadline
    }

    pub fn write_deadline(&self) -> Duration {
        self.write_deadline
    }

    pub fn executor(&self) -> RetryingExecutor {
        let executor = RetryingExecutor::new(self.gate.clone())
            .with_shared_classifier(self.classifier.clone())
            .with_config(self.retry.clone());
        match &self.cancel {
            Some(cancel) => executor.with_cancel(cancel.clone()),
            None => executor,
        }
    }

    pub fn collector(&self) -> PageCollector {
        let collector = PageCollector::new(self.page_size);
        match &self.cancel {
            Some(cancel) => collector.with_cancel(cancel.clone()),
            None => collector,
        }
    }

    pub fn poller(&self) -> OperationPoller {
        let poller = OperationPoller::new(self.poll_interval, self.poll_timeout);
        match &self.cancel {
            Some(cancel) => poller.with_cancel(cancel.clone()),
            None => poller,
        }
    }

    /// Read call with the read deadline
    pub async fn read<T, F, Fut>(&self, operation: &str, work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        self.executor().execute(operation, self.read_deadline, work).await
    }

    /// Mutating call with the write deadline and a client token
    pub async fn write<T, F, Fut>(&self, operation: &str, work: F) -> Result<T>
    where
        F: FnMut(ClientToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        self.executor()
            .execute_mutation(operation, self.write_deadline, work)
            .await
    }

    /// Every item of a paginated describe, each page retried on its own
    pub async fn list<T, F, Fut>(&self, operation: &str, describe: F) -> Result<Vec<T>>
    where
        F: Fn(u64, u64) -> Fut,
        Fut: Future<Output = std::result::Result<Page<T>, ApiError>>,
    {
        let executor = self.executor();
        self.collector()
            .collect_all_retrying(&executor, operation, self.read_deadline, describe)
            .await
    }

    /// Submit → extract handle → poll until terminal → read back
    pub async fn apply<Op: RemoteOperation>(&self, op: &Op) -> Result<Op::Output> {
        let executor = self.executor();
        let executor = &executor;
        let name = op.name();

        tracing::info!("Submitting {}", name);
        let accepted = executor
            .execute_mutation(name, self.write_deadline, |token| async move {
                op.submit(&token).await
            })
            .await?;

        let handle = op.handle(&accepted).ok_or_else(|| OpsError::MissingHandle {
            operation: name.to_string(),
        })?;
        tracing::info!("{} accepted as {}", name, handle);

        let states = op.terminal_states();
        let status_operation = op.status_operation();
        self.poller()
            .poll_until(
                &handle,
                |h| async move {
                    executor
                        .execute(status_operation, self.read_deadline, || op.describe_status(&h))
                        .await
                },
                &states,
            )
            .await?;

        executor
            .execute(op.read_back_operation(), self.read_deadline, || {
                op.read_back(&handle)
            })
            .await
    }
}
