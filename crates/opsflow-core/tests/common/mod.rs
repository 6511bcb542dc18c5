use async_trait::async_trait;
use opsflow_core::{
    ApiError, ClientToken, OperationHandle, OpsConfig, PollResult, RemoteOperation, TerminalStates,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tunables scaled down so tests finish in (virtual) milliseconds
pub fn fast_config() -> OpsConfig {
    let mut config = OpsConfig::default();
    config.rate_limit.default_per_second = 1000;
    config.retry.initial_delay_ms = 5;
    config.retry.max_delay_ms = 5;
    config.retry.read_deadline_secs = 1;
    config.retry.write_deadline_secs = 1;
    config.polling.interval_ms = 10;
    config.polling.timeout_secs = 1;
    config
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Default)]
struct State {
    next_id: u32,
    instances: HashMap<String, Instance>,
    /// client token -> (instance id, task id)
    tokens: HashMap<String, (String, String)>,
    /// task id -> polls so far
    tasks: HashMap<String, u32>,
}

/// In-memory stand-in for the remote control plane
#[allow(dead_code)]
pub struct FakeControlPlane {
    state: Mutex<State>,
    polls_until_done: u32,
    pub fail_tasks: AtomicBool,
    pub throttled_submits: AtomicU32,
    pub lose_next_response: AtomicBool,
    pub flaky_status_calls: AtomicU32,
    pub submits: AtomicU32,
    pub status_calls: AtomicU32,
}

#[allow(dead_code)]
impl FakeControlPlane {
    pub fn new(polls_until_done: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            polls_until_done,
            fail_tasks: AtomicBool::new(false),
            throttled_submits: AtomicU32::new(0),
            lose_next_response: AtomicBool::new(false),
            flaky_status_calls: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    /// Returns (instance id, task id). Repeated tokens return the first result.
    pub fn create_instance(&self, name: &str, token: &ClientToken) -> Result<(String, String), ApiError> {
        self.submits.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.throttled_submits) {
            return Err(ApiError::rate_limited("request rate too high"));
        }

        let mut state = self.state.lock().unwrap();
        let accepted = match state.tokens.get(token.as_str()) {
            Some(existing) => existing.clone(),
            None => {
                state.next_id += 1;
                let instance_id = format!("cdb-{:04}", state.next_id);
                let task_id = format!("task-{:04}", state.next_id);
                state.instances.insert(
                    instance_id.clone(),
                    Instance {
                        id: instance_id.clone(),
                        name: name.to_string(),
                        status: "CREATING".to_string(),
                    },
                );
                state.tasks.insert(task_id.clone(), 0);
                state
                    .tokens
                    .insert(token.as_str().to_string(), (instance_id.clone(), task_id.clone()));
                (instance_id, task_id)
            }
        };

        // applied server-side, but the caller never sees the response
        if self.lose_next_response.swap(false, Ordering::SeqCst) {
            return Err(ApiError::network("read: connection reset by peer"));
        }
        Ok(accepted)
    }

    pub fn describe_task(&self, instance_id: &str, task_id: &str) -> Result<PollResult<String>, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.flaky_status_calls) {
            return Err(ApiError::new("InternalError", "backend unavailable"));
        }

        let mut state = self.state.lock().unwrap();
        let polls = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ApiError::not_found(format!("task {} not found", task_id)))?;
        *polls += 1;
        let polls = *polls;

        if self.fail_tasks.load(Ordering::SeqCst) && polls >= 2 {
            return Ok(PollResult::new("FAILED", task_id.to_string()).with_failure("insufficient resources in zone"));
        }

        if polls >= self.polls_until_done {
            if let Some(instance) = state.instances.get_mut(instance_id) {
                instance.status = "RUNNING".to_string();
            }
            Ok(PollResult::new("SUCCEED", task_id.to_string()))
        } else {
            Ok(PollResult::new("RUNNING", task_id.to_string()))
        }
    }

    pub fn describe_instance(&self, id: &str) -> Result<Instance, ApiError> {
        self.state
            .lock()
            .unwrap()
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("instance {} not found", id)))
    }

    pub fn instance_count(&self) -> usize {
        self.state.lock().unwrap().instances.len()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Create-instance operation: submit, poll the task, read the instance back
pub struct CreateInstance {
    pub plane: Arc<FakeControlPlane>,
    pub name: String,
}

#[async_trait]
impl RemoteOperation for CreateInstance {
    type Accepted = (String, String);
    type Status = String;
    type Output = Instance;

    fn name(&self) -> &str {
        "CreateDBInstance"
    }

    fn status_operation(&self) -> &str {
        "DescribeTasks"
    }

    fn read_back_operation(&self) -> &str {
        "DescribeDBInstances"
    }

    async fn submit(&self, token: &ClientToken) -> Result<Self::Accepted, ApiError> {
        self.plane.create_instance(&self.name, token)
    }

    fn handle(&self, accepted: &Self::Accepted) -> Option<OperationHandle> {
        OperationHandle::composite(&[&accepted.0, &accepted.1])
    }

    async fn describe_status(&self, handle: &OperationHandle) -> Result<PollResult<String>, ApiError> {
        let parts = handle.parts();
        self.plane.describe_task(parts[0], parts[1])
    }

    fn terminal_states(&self) -> TerminalStates {
        TerminalStates::success(["SUCCEED"]).with_failure(["FAILED"])
    }

    async fn read_back(&self, handle: &OperationHandle) -> Result<Instance, ApiError> {
        self.plane.describe_instance(handle.parts()[0])
    }
}
