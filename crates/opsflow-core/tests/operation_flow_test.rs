mod common;

use common::{CreateInstance, FakeControlPlane, fast_config, init_logging};
use opsflow_core::{ErrorCategory, Orchestrator, OpsError, RateGate, cancel_pair};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

fn create(plane: &Arc<FakeControlPlane>, name: &str) -> CreateInstance {
    CreateInstance {
        plane: plane.clone(),
        name: name.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_apply_creates_and_reads_back() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(3));
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();

    let instance = orchestrator.apply(&create(&plane, "orders-db")).await.unwrap();

    assert_eq!(instance.name, "orders-db");
    assert_eq!(instance.status, "RUNNING");
    assert_eq!(plane.submits.load(Ordering::SeqCst), 1);
    assert_eq!(plane.status_calls.load(Ordering::SeqCst), 3);
    // submit + 3 polls + read back
    assert_eq!(orchestrator.gate().admissions(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_submit_quota_does_not_throttle_polling() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(3));
    let mut config = fast_config();
    config.rate_limit.operations.insert("CreateDBInstance".to_string(), 1);
    let orchestrator = Orchestrator::new(&config).unwrap();
    let start = Instant::now();

    orchestrator.apply(&create(&plane, "orders-db")).await.unwrap();

    // polls and the read-back run under their own quotas
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(plane.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(orchestrator.gate().admissions(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_submit_is_retried() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(1));
    plane.throttled_submits.store(2, Ordering::SeqCst);
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();

    orchestrator.apply(&create(&plane, "orders-db")).await.unwrap();

    assert_eq!(plane.submits.load(Ordering::SeqCst), 3);
    assert_eq!(plane.instance_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_response_does_not_create_twice() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(1));
    plane.lose_next_response.store(true, Ordering::SeqCst);
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();

    let instance = orchestrator.apply(&create(&plane, "orders-db")).await.unwrap();

    assert_eq!(plane.submits.load(Ordering::SeqCst), 2);
    assert_eq!(plane.instance_count(), 1);
    assert_eq!(instance.id, "cdb-0001");
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_are_retried() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(2));
    plane.flaky_status_calls.store(2, Ordering::SeqCst);
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();

    let instance = orchestrator.apply(&create(&plane, "orders-db")).await.unwrap();

    assert_eq!(instance.status, "RUNNING");
    assert_eq!(plane.status_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_is_not_a_timeout() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(100));
    plane.fail_tasks.store(true, Ordering::SeqCst);
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();

    let err = orchestrator.apply(&create(&plane, "orders-db")).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::OperationFailed);
    match err {
        OpsError::OperationFailed { handle, message, .. } => {
            assert_eq!(handle.parts(), vec!["cdb-0001", "task-0001"]);
            assert_eq!(message, "insufficient resources in zone");
        }
        other => panic!("Expected OperationFailed, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_operation_times_out() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(u32::MAX));
    let orchestrator = Orchestrator::new(&fast_config()).unwrap();
    let start = Instant::now();

    let err = orchestrator.apply(&create(&plane, "orders-db")).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, OpsError::PollTimeout { .. }));
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_millis(1100));
    // the instance is left as the remote has it
    assert_eq!(plane.instance_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_operations_share_the_gate() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(2));
    let gate = Arc::new(RateGate::new(1000).with_global_limit(100));
    let orchestrator = Arc::new(Orchestrator::new(&fast_config()).unwrap().with_gate(gate.clone()));
    let start = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let orchestrator = orchestrator.clone();
        let op = create(&plane, &format!("db-{}", i));
        tasks.push(tokio::spawn(async move { orchestrator.apply(&op).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(plane.instance_count(), 5);
    // 5 x (submit + 2 polls + read back) through a 100/s global gate
    assert_eq!(gate.admissions(), 20);
    assert!(start.elapsed() >= Duration::from_millis(190));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_polling() {
    init_logging();
    let plane = Arc::new(FakeControlPlane::new(u32::MAX));
    let (canceller, signal) = cancel_pair();
    let orchestrator = Orchestrator::new(&fast_config()).unwrap().with_cancel(signal);
    let op = create(&plane, "orders-db");

    let task = tokio::spawn(async move { orchestrator.apply(&op).await });
    tokio::time::sleep(Duration::from_millis(55)).await;
    canceller.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Cancelled);
    assert!(plane.status_calls.load(Ordering::SeqCst) < 10);
}
