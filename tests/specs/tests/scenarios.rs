// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios over real want graphs.

use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wantcore::want::WantStatus;
use wantrun_specs::{graph, run_graph, run_graph_with, LingeringWant};

#[tokio::test]
async fn numbers_through_queue_into_sink() -> anyhow::Result<()> {
    let g = graph(json!({
        "nodes": [
            {"id": "numbers", "name": "arrivals", "type": "numbers",
             "params": {"count": 10, "rate": 1.0, "deterministic": true}},
            {"id": "queue", "name": "server", "type": "queue",
             "params": {"service_time": 1.0}, "uses": ["numbers"]},
            {"id": "sink", "name": "collector", "type": "sink", "uses": ["queue"]},
        ],
    }))?;

    let run = run_graph(&g).await?;

    assert!(run.summary.all_achieved(), "summary: {:?}", run.summary);
    assert_eq!(run.want("sink").state.get("total_processed"), Some(json!(10)));
    assert_eq!(run.want("queue").state.get("total_processed"), Some(json!(10)));
    // Deterministic arrivals exactly match the service rate: nothing waits.
    assert_eq!(run.want("queue").state.get("average_wait_time"), Some(json!(0.0)));
    Ok(())
}

#[tokio::test]
async fn two_producers_reach_the_coordinator_every_time() -> anyhow::Result<()> {
    for iteration in 0..10 {
        let g = graph(json!({
            "nodes": [
                {"id": "evidence", "name": "evidence", "type": "numbers",
                 "params": {"count": 1, "deterministic": true}},
                {"id": "description", "name": "description", "type": "numbers",
                 "params": {"count": 1, "deterministic": true}},
                {"id": "coordinator", "name": "coordinator", "type": "combine",
                 "params": {"required_inputs": 2},
                 "uses": ["evidence", "description"]},
            ],
        }))?;

        let run = run_graph(&g).await?;
        assert!(run.summary.all_achieved(), "iteration {iteration}: {:?}", run.summary);

        let coordinator = run.want("coordinator");
        assert_eq!(
            coordinator.state.get("approval_status"),
            Some(json!("approved")),
            "iteration {iteration}"
        );
        assert_eq!(coordinator.state.get("total_packets_received"), Some(json!(2)));
        let by_channel = coordinator.state.get("data_by_channel").unwrap_or_default();
        let channels = by_channel.as_object().map(|o| o.len()).unwrap_or(0);
        assert_eq!(channels, 2, "iteration {iteration}: both channel entries must be present");
        assert!(by_channel.get("0").is_some() && by_channel.get("1").is_some());
    }
    Ok(())
}

#[tokio::test]
async fn plugin_pipeline_retries_compile_failures() -> anyhow::Result<()> {
    let g = graph(json!({
        "nodes": [
            {"id": "plugin", "name": "plugin-builder", "type": "pipeline",
             "params": {"inject_compile_failures": 2}},
        ],
    }))?;

    let run = run_graph(&g).await?;

    assert!(run.summary.all_achieved());
    let plugin = run.want("plugin");
    assert_eq!(plugin.state.get_string("phase", "").0, "stable");
    assert_eq!(plugin.phase_failures_total("compiling"), 2);
    assert_eq!(plugin.state.get("error_feedback"), Some(json!("")));
    Ok(())
}

#[tokio::test]
async fn subprocess_want_captures_output() -> anyhow::Result<()> {
    let g = graph(json!({
        "nodes": [
            {"id": "hello", "name": "hello", "type": "command",
             "params": {"command": "echo hello", "shell": "/bin/bash", "timeout": 5}},
        ],
    }))?;

    let run = run_graph(&g).await?;

    assert!(run.summary.all_achieved(), "summary: {:?}", run.summary);
    let hello = run.want("hello");
    assert_eq!(hello.state.get("exit_code"), Some(json!(0)));
    assert_eq!(hello.state.get("stdout"), Some(json!("hello\n")));
    assert_eq!(hello.state.get_string("status", "").0, "completed");
    let (elapsed, ok) = hello.state.get_int("execution_time_ms", -1);
    assert!(ok && elapsed >= 0);
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn unanswered_reminder_times_out() -> anyhow::Result<()> {
    let event_time = (chrono::Utc::now() + chrono::Duration::seconds(2)).to_rfc3339();
    let g = graph(json!({
        "nodes": [
            {"id": "nudge", "name": "nudge", "type": "remind",
             "params": {
                 "ahead": "1 second",
                 "event_time": event_time,
                 "require_reaction": true,
                 "timeout": "3s",
             }},
        ],
    }))?;

    let run = run_graph(&g).await?;

    let report = run.summary.report("nudge").cloned();
    assert_eq!(report.map(|r| r.status), Some(WantStatus::Failed));
    let nudge = run.want("nudge");
    assert_eq!(nudge.state.get_string("phase", "").0, "failed");
    assert_eq!(nudge.state.get("timeout"), Some(json!(true)));
    assert_eq!(nudge.state.get("reminded"), Some(json!(true)));
    Ok(())
}

#[tokio::test]
async fn graph_files_run_through_the_library_entrypoint() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&json!({
            "nodes": [
                {"id": "one", "name": "one", "type": "numbers",
                 "params": {"count": 2, "deterministic": true}},
                {"id": "sink", "name": "sink", "type": "sink", "uses": ["one"]},
            ],
        }))?,
    )?;

    let summary = wantrun::run_file(wantrun_specs::test_config(), &path).await?;
    assert!(summary.all_achieved());
    Ok(())
}

#[tokio::test]
#[serial_test::serial]
async fn cancellation_cleans_up_every_want_exactly_once() -> anyhow::Result<()> {
    let nodes: Vec<_> = (0..5)
        .map(|i| json!({"id": format!("w{i}"), "name": format!("w{i}"), "type": "lingering"}))
        .collect();
    let g = graph(json!({ "nodes": nodes }))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let run = run_graph_with(&g, shutdown, |builder| {
        builder.register_want_type("lingering", |_meta, _spec| Ok(Box::new(LingeringWant::new())));
    })
    .await?;

    for i in 0..5 {
        let want = run.want(&format!("w{i}"));
        assert_eq!(want.status(), WantStatus::Terminated);
        assert_eq!(
            want.state.get("deleted_count"),
            Some(json!(1)),
            "on_delete must run exactly once for w{i}"
        );
        assert_eq!(want.background_running().await, 0, "w{i} monitor must be stopped");
    }
    Ok(())
}
