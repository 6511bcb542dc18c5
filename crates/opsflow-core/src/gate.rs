//! Process-wide admission control for outbound calls
//!
//! Every remote call, read or write, passes through [`RateGate::acquire`]
//! first. The gate keeps one token bucket per operation name plus an
//! optional global bucket; an admission consumes a token from both.
//!
//! Callers reserve a token under the lock and sleep outside of it, so
//! admissions are granted in arrival order and waiting callers never hold
//! the lock.
//!
//! Share one gate per client through an `Arc`. A gate created per operation
//! enforces nothing.

use opsflow_config::RateLimitSettings;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    per_second: f64,
    capacity: f64,
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn new(per_second: u32, burst: u32, now: Instant) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            per_second: f64::from(per_second.max(1)),
            capacity,
            tokens: capacity,
            updated: now,
        }
    }

    /// Take one token, possibly going into debt, and return how long the
    /// caller must wait before the token is really available.
    fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.updated = now;
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.per_second)
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    global: Option<Bucket>,
    operations: HashMap<String, Bucket>,
}

/// Token-bucket throttle shared by all concurrent operations
#[derive(Debug)]
pub struct RateGate {
    default_per_second: u32,
    global_per_second: Option<u32>,
    burst: u32,
    overrides: HashMap<String, u32>,
    unlimited: bool,
    state: Mutex<GateState>,
    admissions: AtomicU64,
}

impl RateGate {
    /// Gate with a quota of `per_second` calls for each operation name
    pub fn new(per_second: u32) -> Self {
        Self {
            default_per_second: per_second.max(1),
            global_per_second: None,
            burst: 1,
            overrides: HashMap::new(),
            unlimited: false,
            state: Mutex::new(GateState::default()),
            admissions: AtomicU64::new(0),
        }
    }

    /// Gate that admits immediately. Admissions are still counted.
    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            ..Self::new(1)
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let mut gate = Self::new(settings.default_per_second).with_burst(settings.burst);
        if let Some(global) = settings.global_per_second {
            gate = gate.with_global_limit(global);
        }
        for (operation, per_second) in &settings.operations {
            gate = gate.with_operation_limit(operation.clone(), *per_second);
        }
        gate
    }

    /// Cap the aggregate rate across all operations
    pub fn with_global_limit(mut self, per_second: u32) -> Self {
        self.global_per_second = Some(per_second.max(1));
        self
    }

    pub fn with_operation_limit(mut self, operation: impl Into<String>, per_second: u32) -> Self {
        self.overrides.insert(operation.into(), per_second.max(1));
        self
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }

    /// Block until `operation` may issue a call. Never fails.
    pub async fn acquire(&self, operation: &str) {
        if self.unlimited {
            self.admissions.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            let per_second = self
                .overrides
                .get(operation)
                .copied()
                .unwrap_or(self.default_per_second);
            let burst = self.burst;
            let op_wait = state
                .operations
                .entry(operation.to_string())
                .or_insert_with(|| Bucket::new(per_second, burst, now))
                .reserve(now);

            let global_wait = match self.global_per_second {
                Some(global) => state
                    .global
                    .get_or_insert_with(|| Bucket::new(global, burst, now))
                    .reserve(now),
                None => Duration::ZERO,
            };

            op_wait.max(global_wait)
        };

        if !wait.is_zero() {
            tracing::debug!("Rate gate holding {} for {:?}", operation, wait);
            tokio::time::sleep(wait).await;
        }
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of admissions granted so far
    pub fn admissions(&self) -> u64 {
        self.admissions.load(Ordering::Relaxed)
    }
}
