//! opsflow core
//!
//! Primitives for talking to an eventually-consistent, rate-limited,
//! paginated cloud control plane. The SDK client is a black box; these
//! types decide when to call it, how often, and when to stop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Orchestrator                    │
//! │     read / write / list / apply(RemoteOperation) │
//! └───────┬──────────────────┬──────────────────────┘
//!         │                  │
//! ┌───────▼───────┐  ┌───────▼────────┐
//! │ PageCollector │  │ OperationPoller│
//! └───────┬───────┘  └───────┬────────┘
//!         │                  │
//! ┌───────▼──────────────────▼──────────────────────┐
//! │               RetryingExecutor                   │
//! │        (ErrorClassifier, backoff, deadline)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │          RateGate (one per process)              │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use opsflow_core::{Orchestrator, Page};
//!
//! let orchestrator = Orchestrator::from_env()?;
//!
//! let instances = orchestrator
//!     .list("DescribeDBInstances", |offset, limit| async move {
//!         sdk.describe_db_instances(offset, limit).await.map(Page::from)
//!     })
//!     .await?;
//! ```

pub mod cancel;
pub mod classify;
pub mod error;
pub mod gate;
pub mod handle;
pub mod orchestrator;
pub mod page;
pub mod poll;
pub mod retry;

// Re-exports
pub use cancel::{CancelSignal, Canceller, cancel_pair};
pub use classify::{ApiError, Classification, CodeClassifier, ErrorClassifier, codes};
pub use error::{ErrorCategory, OpsError, Result};
pub use gate::RateGate;
pub use handle::OperationHandle;
pub use opsflow_config::OpsConfig;
pub use orchestrator::{Orchestrator, RemoteOperation};
pub use page::{Page, PageCollector};
pub use poll::{OperationPoller, PollResult, TerminalStates};
pub use retry::{ClientToken, RetryConfig, RetryingExecutor};
