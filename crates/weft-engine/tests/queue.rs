//! Processing queue tests against a scripted worker
//!
//! The scripted spawner hands each worker endpoint to the test, which then
//! plays the worker by hand: it sees exactly which requests were sent and
//! decides when and how to reply.

use std::sync::Arc;
use std::time::Duration;

use smol::channel::{self, Receiver, Sender};

use weft_engine::{
    CssProcessor, PipelineError, ProcessingResult, ProcessorConfig, QueueState, RuleChange,
    StyleChange, StyleOverrides, TaskId, WorkerEndpoint, WorkerLink, WorkerReply, WorkerRequest,
    WorkerSpawner,
};

struct ScriptedWorker {
    endpoints: Sender<WorkerEndpoint>,
}

impl WorkerSpawner for ScriptedWorker {
    fn spawn(&self) -> Result<WorkerLink, PipelineError> {
        let (link, endpoint) = WorkerLink::channel();
        self.endpoints
            .try_send(endpoint)
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;
        Ok(link)
    }
}

fn scripted(config: ProcessorConfig) -> (CssProcessor, Receiver<WorkerEndpoint>) {
    let (endpoints, endpoint_rx) = channel::unbounded();
    let processor =
        CssProcessor::with_spawner(config, Arc::new(ScriptedWorker { endpoints })).unwrap();
    (processor, endpoint_rx)
}

fn no_timeout() -> ProcessorConfig {
    ProcessorConfig {
        task_timeout: None,
        ..ProcessorConfig::default()
    }
}

fn change(value: &str) -> StyleChange {
    StyleChange::set_property(".a", "color", value)
}

fn result(css: &str) -> ProcessingResult {
    ProcessingResult {
        css: css.to_string(),
        ..ProcessingResult::default()
    }
}

/// Wait until the driver has handled every command sent so far
fn settle(processor: &CssProcessor) {
    smol::block_on(processor.snapshot()).unwrap();
}

fn expect_idle(processor: &CssProcessor, worker: &WorkerEndpoint) {
    settle(processor);
    assert!(
        worker.requests.try_recv().is_err(),
        "worker received a request it should not have"
    );
}

fn init_ready(processor: &CssProcessor, worker: &WorkerEndpoint) {
    let init = processor.initialize(".a { color: red; }", StyleOverrides::new());
    let request = worker.requests.recv_blocking().unwrap();
    assert!(matches!(request, WorkerRequest::Init { .. }));
    worker
        .replies
        .send_blocking(WorkerReply::Initialized {
            id: request.id(),
            result: result("init"),
        })
        .unwrap();
    assert_eq!(init.wait().unwrap().css, "init");
}

// ============================================================================
// Gating and dispatch
// ============================================================================

#[test]
fn test_changes_wait_for_initialization() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();

    let early = processor.process_change(change("blue"), StyleOverrides::new());
    expect_idle(&processor, &worker);
    let snapshot = smol::block_on(processor.snapshot()).unwrap();
    assert_eq!(snapshot.state, QueueState::Uninitialized);
    assert_eq!(snapshot.pending, 1);

    let init = processor.initialize("", StyleOverrides::new());
    let request = worker.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), init.id());
    assert!(matches!(request, WorkerRequest::Init { .. }));

    // The parked change stays behind the in-flight init
    expect_idle(&processor, &worker);

    worker
        .replies
        .send_blocking(WorkerReply::Initialized {
            id: request.id(),
            result: result("baseline"),
        })
        .unwrap();
    assert_eq!(init.wait().unwrap().css, "baseline");

    let request = worker.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), early.id());
    match &request {
        WorkerRequest::Change { change, .. } => assert_eq!(change.value.as_deref(), Some("blue")),
        other => panic!("unexpected request {:?}", other),
    }
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: request.id(),
            result: result("after"),
        })
        .unwrap();
    assert_eq!(early.wait().unwrap().css, "after");
}

#[test]
fn test_single_request_in_flight() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let tasks: Vec<_> = ["red", "green", "blue"]
        .into_iter()
        .map(|value| processor.process_change(change(value), StyleOverrides::new()))
        .collect();

    for task in &tasks {
        let request = worker.requests.recv_blocking().unwrap();
        assert_eq!(request.id(), task.id());

        expect_idle(&processor, &worker);
        let snapshot = smol::block_on(processor.snapshot()).unwrap();
        assert_eq!(snapshot.in_flight, Some(task.id()));

        worker
            .replies
            .send_blocking(WorkerReply::Processed {
                id: request.id(),
                result: result(&format!("{}", request.id())),
            })
            .unwrap();
    }

    for task in tasks {
        let id = task.id();
        assert_eq!(task.wait().unwrap().css, id.to_string());
    }
}

#[test]
fn test_results_resolve_in_submission_order() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let tasks: Vec<_> = (0..5)
        .map(|n| processor.process_change(change(&format!("#00{}", n)), StyleOverrides::new()))
        .collect();

    let responder = std::thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..5 {
            let request = worker.requests.recv_blocking().unwrap();
            let value = match &request {
                WorkerRequest::Change { change, .. } => change.value.clone().unwrap_or_default(),
                other => panic!("unexpected request {:?}", other),
            };
            seen.push(request.id());
            worker
                .replies
                .send_blocking(WorkerReply::Processed {
                    id: request.id(),
                    result: result(&value),
                })
                .unwrap();
        }
        seen
    });

    let results: Vec<String> = smol::block_on(async {
        let mut out = Vec::new();
        for task in tasks {
            out.push(task.await.unwrap().css);
        }
        out
    });

    assert_eq!(results, vec!["#000", "#001", "#002", "#003", "#004"]);
    let seen = responder.join().unwrap();
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failed_task_does_not_stall_queue() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let bad = processor.process_change(change("}"), StyleOverrides::new());
    let good = processor.process_change(change("blue"), StyleOverrides::new());

    let request = worker.requests.recv_blocking().unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Failed {
            id: request.id(),
            message: "invalid value".into(),
        })
        .unwrap();

    let request = worker.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), good.id());
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: request.id(),
            result: result("ok"),
        })
        .unwrap();

    assert_eq!(
        bad.wait(),
        Err(PipelineError::Worker {
            id: TaskId(2),
            message: "invalid value".into(),
        })
    );
    assert_eq!(good.wait().unwrap().css, "ok");
}

#[test]
fn test_failed_init_rejects_parked_changes() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();

    let init = processor.initialize("", StyleOverrides::new());
    let parked = processor.process_change(change("blue"), StyleOverrides::new());
    let request = worker.requests.recv_blocking().unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Failed {
            id: request.id(),
            message: "bad overrides".into(),
        })
        .unwrap();

    assert!(matches!(init.wait(), Err(PipelineError::Worker { .. })));
    assert_eq!(
        parked.wait(),
        Err(PipelineError::NotInitialized { id: TaskId(2) })
    );
    assert_eq!(
        smol::block_on(processor.snapshot()).unwrap().state,
        QueueState::Uninitialized
    );
}

#[test]
fn test_stuck_task_times_out_and_queue_advances() {
    let (processor, endpoints) = scripted(ProcessorConfig {
        task_timeout: Some(Duration::from_millis(100)),
        ..ProcessorConfig::default()
    });
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let stuck = processor.process_change(change("red"), StyleOverrides::new());
    let next = processor.process_change(change("blue"), StyleOverrides::new());

    let first = worker.requests.recv_blocking().unwrap();
    assert_eq!(first.id(), stuck.id());
    assert!(matches!(
        stuck.wait(),
        Err(PipelineError::Timeout { after, .. }) if after == Duration::from_millis(100)
    ));

    let second = worker.requests.recv_blocking().unwrap();
    assert_eq!(second.id(), next.id());

    // The late reply never settles the live task
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: first.id(),
            result: result("late"),
        })
        .unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: second.id(),
            result: result("fresh"),
        })
        .unwrap();
    assert_eq!(next.wait().unwrap().css, "fresh");
}

#[test]
fn test_late_reply_changes_are_carried_forward() {
    let (processor, endpoints) = scripted(ProcessorConfig {
        task_timeout: Some(Duration::from_millis(100)),
        ..ProcessorConfig::default()
    });
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let stuck = processor.process_change(change("blue"), StyleOverrides::new());
    let first = worker.requests.recv_blocking().unwrap();
    assert!(matches!(stuck.wait(), Err(PipelineError::Timeout { .. })));

    let retry = processor.process_change(change("blue"), StyleOverrides::new());
    let second = worker.requests.recv_blocking().unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: first.id(),
            result: ProcessingResult {
                changes: vec![
                    RuleChange::new(".a", "color: blue;"),
                    RuleChange::new(".b", "top: 0;"),
                ],
                ..ProcessingResult::default()
            },
        })
        .unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: second.id(),
            result: ProcessingResult {
                changes: vec![RuleChange::new(".b", "top: 1px;")],
                ..ProcessingResult::default()
            },
        })
        .unwrap();

    let carried = retry.wait().unwrap();
    assert_eq!(carried.changes.len(), 2);
    assert_eq!(carried.changes[0], RuleChange::new(".a", "color: blue;"));
    assert_eq!(carried.change(".b"), Some("top: 1px;"));
}

#[test]
fn test_reply_of_wrong_kind_rejects_task() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let confused = processor.process_change(change("blue"), StyleOverrides::new());
    let next = processor.process_change(change("green"), StyleOverrides::new());

    let request = worker.requests.recv_blocking().unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Initialized {
            id: request.id(),
            result: result("wrong"),
        })
        .unwrap();
    assert!(matches!(
        confused.wait(),
        Err(PipelineError::Worker { id, .. }) if id == TaskId(2)
    ));

    let request = worker.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), next.id());
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: request.id(),
            result: result("ok"),
        })
        .unwrap();
    assert_eq!(next.wait().unwrap().css, "ok");
}

#[test]
fn test_init_answered_as_change_abandons_initialization() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();

    let init = processor.initialize("", StyleOverrides::new());
    let parked = processor.process_change(change("blue"), StyleOverrides::new());
    let request = worker.requests.recv_blocking().unwrap();
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: request.id(),
            result: result("wrong"),
        })
        .unwrap();

    assert!(matches!(init.wait(), Err(PipelineError::Worker { .. })));
    assert_eq!(
        parked.wait(),
        Err(PipelineError::NotInitialized { id: TaskId(2) })
    );
    expect_idle(&processor, &worker);
    assert_eq!(
        smol::block_on(processor.snapshot()).unwrap().state,
        QueueState::Uninitialized
    );
}

#[test]
fn test_worker_crash_rejects_pending_and_respawns() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let in_flight = processor.process_change(change("red"), StyleOverrides::new());
    let queued = processor.process_change(change("blue"), StyleOverrides::new());
    worker.requests.recv_blocking().unwrap();
    drop(worker);

    assert_eq!(
        in_flight.wait(),
        Err(PipelineError::WorkerTerminated { id: TaskId(2) })
    );
    assert_eq!(
        queued.wait(),
        Err(PipelineError::WorkerTerminated { id: TaskId(3) })
    );

    let fresh = endpoints.recv_blocking().unwrap();
    assert_eq!(
        smol::block_on(processor.snapshot()).unwrap().state,
        QueueState::Uninitialized
    );

    // The new worker needs its own init
    let parked = processor.process_change(change("green"), StyleOverrides::new());
    expect_idle(&processor, &fresh);
    init_ready(&processor, &fresh);
    let request = fresh.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), parked.id());
}

// ============================================================================
// Re-initialization and shutdown
// ============================================================================

#[test]
fn test_reinitialize_cancels_pending_tasks() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let in_flight = processor.process_change(change("red"), StyleOverrides::new());
    let queued = processor.process_change(change("blue"), StyleOverrides::new());
    let old = worker.requests.recv_blocking().unwrap();

    let reinit = processor.initialize(".b { top: 0; }", StyleOverrides::new());
    assert_eq!(
        in_flight.wait(),
        Err(PipelineError::Cancelled { id: old.id() })
    );
    assert!(matches!(queued.wait(), Err(PipelineError::Cancelled { .. })));

    // The worker still holds the old request, so the init waits for it
    expect_idle(&processor, &worker);
    worker
        .replies
        .send_blocking(WorkerReply::Processed {
            id: old.id(),
            result: result("stale"),
        })
        .unwrap();

    let request = worker.requests.recv_blocking().unwrap();
    assert_eq!(request.id(), reinit.id());
    match &request {
        WorkerRequest::Init { css, .. } => assert_eq!(css, ".b { top: 0; }"),
        other => panic!("unexpected request {:?}", other),
    }
    worker
        .replies
        .send_blocking(WorkerReply::Initialized {
            id: request.id(),
            result: result("second"),
        })
        .unwrap();
    assert_eq!(reinit.wait().unwrap().css, "second");
    assert_eq!(
        smol::block_on(processor.snapshot()).unwrap().state,
        QueueState::Ready
    );
}

#[test]
fn test_drop_rejects_outstanding_tasks() {
    let (processor, endpoints) = scripted(no_timeout());
    let worker = endpoints.recv_blocking().unwrap();
    init_ready(&processor, &worker);

    let pending = processor.process_change(change("red"), StyleOverrides::new());
    worker.requests.recv_blocking().unwrap();
    drop(processor);

    assert_eq!(pending.wait(), Err(PipelineError::Closed));
}
