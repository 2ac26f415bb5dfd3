//! End-to-end tests driving the real `taskbridge-worker` binary.
//!
//! Each test spawns a worker process through the supervisor and talks to it
//! over its stdin/stdout:
//! - handshake, primary operation and progress callbacks
//! - faults raised inside the worker
//! - teardown and process reaping

mod helpers;

use helpers::{Recorded, forked_supervisor};
use serde_json::json;
use taskbridge::bridges::{build, release, submit};
use taskbridge::{Fault, Handlers, TaskSpec, TaskState};

#[tokio::test]
async fn forked_build_reports_progress_and_returns_result() {
    let states = Recorded::default();
    let task = forked_supervisor()
        .create(TaskSpec::new("build", "echo-build"), build::producer(states.sink()))
        .await
        .expect("worker should become ready");

    assert!(!task.is_local());
    assert_eq!(task.state(), TaskState::Ready);

    let result = build::build(&task, json!({"entries": ["main", "admin"]}))
        .await
        .expect("build should succeed");
    assert_eq!(result, json!({"bundles": ["main.bundle", "admin.bundle"]}));

    assert_eq!(
        states.values(),
        vec![
            json!({"state": "building"}),
            json!({"state": "bundling", "entry": "main"}),
            json!({"state": "bundling", "entry": "admin"}),
            json!({"state": "built"}),
        ],
        "progress must arrive in order and before the result"
    );

    task.teardown().await.expect("teardown should succeed");
    assert_eq!(task.state(), TaskState::Closed);
}

#[tokio::test]
async fn forked_fault_is_reraised_on_the_host() {
    let states = Recorded::default();
    let task = forked_supervisor()
        .create(TaskSpec::new("build", "failing-build"), build::producer(states.sink()))
        .await
        .unwrap();

    let err = build::build(&task, json!({})).await.unwrap_err();
    assert_eq!(err.fault(), Some(&Fault::new("BoomCondition", "oops")));

    let states = states.values();
    assert_eq!(states.last().unwrap()["state"], "failed");
    task.teardown().await.unwrap();
}

#[tokio::test]
async fn forked_release_and_submit_round_trip() {
    let supervisor = forked_supervisor();

    let states = Recorded::default();
    let releaser = supervisor
        .create(TaskSpec::new("release", "echo-release"), release::producer(states.sink()))
        .await
        .unwrap();
    let released = release::release(&releaser, json!({"version": "0.3.0"})).await.unwrap();
    assert_eq!(released, json!({"released": "0.3.0"}));
    assert_eq!(
        states.values(),
        vec![json!({"state": "releasing"}), json!({"state": "released"})]
    );

    let submitter = supervisor
        .create(TaskSpec::new("submit", "echo-submit"), Handlers::new())
        .await
        .unwrap();
    let dependencies = submit::find_dependencies(&submitter, json!({"packages": ["core", "ui"]}))
        .await
        .unwrap();
    assert_eq!(dependencies, vec![json!("core"), json!("ui")]);

    releaser.teardown().await.unwrap();
    submitter.teardown().await.unwrap();
}

#[tokio::test]
async fn concurrent_calls_on_one_worker_are_correlated() {
    let task = forked_supervisor()
        .create(TaskSpec::new("build", "echo-build"), build::producer(|_| {}))
        .await
        .unwrap();

    let calls = (0..10).map(|n| {
        let task = &task;
        async move {
            let entry = format!("entry{n}");
            let result = build::build(task, json!({"entries": [entry.clone()]})).await;
            (entry, result)
        }
    });
    for (entry, result) in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap(), json!({"bundles": [format!("{entry}.bundle")]}));
    }

    task.teardown().await.unwrap();
}

#[tokio::test]
async fn teardown_twice_is_a_no_op() {
    let task = forked_supervisor()
        .create(TaskSpec::new("submit", "echo-submit"), Handlers::new())
        .await
        .unwrap();

    task.teardown().await.unwrap();
    task.teardown().await.unwrap();
    assert_eq!(task.state(), TaskState::Closed);

    let err = submit::find_dependencies(&task, json!({})).await.unwrap_err();
    assert!(err.is_channel_closed(), "call after teardown: {err}");
}
