//! Deadline-bounded retry around a single remote call

use crate::cancel::{self, CancelSignal};
use crate::classify::{ApiError, Classification, CodeClassifier, ErrorClassifier};
use crate::error::{OpsError, Result};
use crate::gate::RateGate;
use opsflow_config::RetrySettings;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff between attempts
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Upper bound for the delay
    pub max_delay: Duration,

    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,

    /// Spread each delay by up to ±25%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl RetryConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max.max(initial),
            backoff_multiplier: multiplier.max(1.0),
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::exponential(
            settings.initial_delay(),
            settings.max_delay(),
            settings.backoff_multiplier,
        )
        .with_jitter(settings.jitter)
    }

    /// Delay after the `attempt`-th failure (1-based), before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if scaled.is_finite() && scaled < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_delay
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        delay.mul_f64(factor)
    }
}

/// Token sent with every attempt of one logical mutating call, so the
/// remote can drop duplicates caused by retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one attempt
#[derive(Debug)]
enum Attempt<T> {
    Success(T),
    RetryableFailure(ApiError),
    FatalFailure(ApiError),
}

impl<T> Attempt<T> {
    fn classify(outcome: std::result::Result<T, ApiError>, classifier: &dyn ErrorClassifier) -> Self {
        match outcome {
            Ok(value) => Attempt::Success(value),
            Err(err) => match classifier.classify(&err) {
                Classification::Retryable => Attempt::RetryableFailure(err),
                Classification::Fatal => Attempt::FatalFailure(err),
            },
        }
    }
}

/// Runs one remote call through the rate gate, retrying retryable failures
/// until the call succeeds, fails fatally, or the deadline passes.
#[derive(Clone)]
pub struct RetryingExecutor {
    gate: Arc<RateGate>,
    classifier: Arc<dyn ErrorClassifier>,
    config: RetryConfig,
    cancel: Option<CancelSignal>,
}

impl fmt::Debug for RetryingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingExecutor")
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl RetryingExecutor {
    pub fn new(gate: Arc<RateGate>) -> Self {
        Self {
            gate,
            classifier: Arc::new(CodeClassifier::default()),
            config: RetryConfig::default(),
            cancel: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_shared_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Run `work` until it succeeds, fails fatally, or `deadline` elapses.
    ///
    /// `work` performs exactly one remote call per invocation. A response
    /// that reports an asynchronous rejection should come back as an error
    /// the classifier treats as fatal (see [`ApiError::rejected`]).
    pub async fn execute<T, F, Fut>(&self, operation: &str, deadline: Duration, mut work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let cancel = self.cancel.as_ref();
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            cancel::race(self.gate.acquire(operation), cancel)
                .await
                .ok_or_else(|| OpsError::cancelled(operation))?;

            attempts += 1;
            let outcome = cancel::race(work(), cancel)
                .await
                .ok_or_else(|| OpsError::cancelled(operation))?;

            let error = match Attempt::classify(outcome, self.classifier.as_ref()) {
                Attempt::Success(value) => {
                    if attempts > 1 {
                        tracing::debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Attempt::FatalFailure(err) => {
                    tracing::debug!("{} failed with non-retryable error: {}", operation, err);
                    return Err(OpsError::Fatal(err));
                }
                Attempt::RetryableFailure(err) => err,
            };

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                tracing::warn!(
                    "{} gave up after {} attempts in {:?}. Last error: {}",
                    operation,
                    attempts,
                    elapsed,
                    error
                );
                return Err(OpsError::RetryTimeout {
                    operation: operation.to_string(),
                    elapsed,
                    attempts,
                    last: error,
                });
            }

            let delay = self.config.delay_for_attempt(attempts).min(deadline - elapsed);
            tracing::warn!(
                "{} attempt {} failed: {}. Retrying in {:?}...",
                operation,
                attempts,
                error,
                delay
            );

            if !cancel::sleep(delay, cancel).await {
                return Err(OpsError::cancelled(operation));
            }
        }
    }

    /// Like [`execute`](Self::execute), for mutating calls: one client token
    /// is generated up front and handed to every attempt.
    pub async fn execute_mutation<T, F, Fut>(&self, operation: &str, deadline: Duration, mut work: F) -> Result<T>
    where
        F: FnMut(ClientToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let token = ClientToken::generate();
        tracing::debug!("{} using client token {}", operation, token);
        self.execute(operation, deadline, || work(token.clone())).await
    }
}
