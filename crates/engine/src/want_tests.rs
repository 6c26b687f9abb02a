// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;
use crate::registry::{AgentSpec, Capability};
use crate::test_support::{want_ctx, want_ctx_with};
use serde_json::json;

// ── status transitions ────────────────────────────────────────────────

#[yare::parameterized(
    pending_starts_reaching   = { WantStatus::Pending, WantStatus::Reaching, true },
    reaching_achieves         = { WantStatus::Reaching, WantStatus::Achieved, true },
    reaching_fails            = { WantStatus::Reaching, WantStatus::Failed, true },
    achieved_reopens          = { WantStatus::Achieved, WantStatus::Reaching, true },
    achieved_never_fails      = { WantStatus::Achieved, WantStatus::Failed, false },
    achieved_never_pending    = { WantStatus::Achieved, WantStatus::Pending, false },
    failed_is_final           = { WantStatus::Failed, WantStatus::Reaching, false },
    terminated_is_final       = { WantStatus::Terminated, WantStatus::Reaching, false },
)]
fn transition_guard(from: WantStatus, to: WantStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed);
}

#[test]
fn set_status_drops_disallowed_transitions() {
    let ctx = want_ctx("w");
    assert!(ctx.want.set_status(WantStatus::Reaching));
    assert!(ctx.want.set_status(WantStatus::Achieved));
    assert!(!ctx.want.set_status(WantStatus::Failed));
    assert_eq!(ctx.want.status(), WantStatus::Achieved);

    // An explicit re-open is the only way out of achieved.
    assert!(ctx.want.set_status(WantStatus::Reaching));
    assert_eq!(ctx.want.status(), WantStatus::Reaching);
}

// ── retry bookkeeping ─────────────────────────────────────────────────

#[test]
fn phase_failures_accumulate_until_the_budget_is_spent() {
    let ctx = want_ctx("w");
    ctx.want.set_status(WantStatus::Reaching);

    assert_eq!(ctx.want.record_phase_failure("compiling", EngineError::agent("boom 1")), WantStatus::Reaching);
    assert_eq!(ctx.want.record_phase_failure("compiling", EngineError::agent("boom 2")), WantStatus::Reaching);
    assert_eq!(ctx.want.phase_retry_count("compiling"), 2);

    // Third failure exhausts the default budget of 3.
    assert_eq!(ctx.want.record_phase_failure("compiling", EngineError::agent("boom 3")), WantStatus::Failed);
    assert!(ctx.want.phase_retry_count("compiling") <= 3);
    let (msg, ok) = ctx.want.state.get_string("error_message", "");
    assert!(ok, "error_message should be set");
    assert!(msg.contains("after 3 attempts"), "got {msg}");
}

#[test]
fn phase_success_resets_the_counter_but_not_the_total() {
    let ctx = want_ctx("w");
    ctx.want.set_status(WantStatus::Reaching);

    ctx.want.record_phase_failure("compiling", EngineError::agent("boom"));
    ctx.want.record_phase_failure("compiling", EngineError::agent("boom"));
    ctx.want.record_phase_success("compiling");

    assert_eq!(ctx.want.phase_retry_count("compiling"), 0);
    assert_eq!(ctx.want.phase_failures_total("compiling"), 2);
    assert_eq!(ctx.want.last_phase_error(), None);
    assert_eq!(ctx.want.state.get("last_phase_error"), Some(serde_json::Value::Null));
}

#[test]
fn rewound_phase_keeps_an_independent_counter() {
    let ctx = want_ctx("w");
    ctx.want.set_status(WantStatus::Reaching);

    ctx.want.record_phase_failure("compiling", EngineError::agent("boom"));
    ctx.want.record_phase_failure("coding", EngineError::agent("other"));

    assert_eq!(ctx.want.phase_retry_count("compiling"), 1);
    assert_eq!(ctx.want.phase_retry_count("coding"), 1);
}

#[yare::parameterized(
    config = { ErrorKind::Config },
    fatal  = { ErrorKind::Fatal },
)]
fn terminal_kinds_bypass_retries(kind: ErrorKind) {
    let ctx = want_ctx("w");
    ctx.want.set_status(WantStatus::Reaching);
    let status = ctx.want.record_phase_failure("setup", EngineError::new(kind, "broken"));
    assert_eq!(status, WantStatus::Failed);
    assert_eq!(ctx.want.phase_retry_count("setup"), 0);
}

// ── parameters ────────────────────────────────────────────────────────

#[test]
fn param_helpers_coerce_like_the_state_store() {
    let params = json!({"count": 10, "rate": 1.5, "deterministic": true, "name": "n", "frac": 2.9});
    let ctx = want_ctx_with(
        "w",
        params.as_object().cloned().unwrap_or_default(),
        Vec::new(),
        std::sync::Arc::new(AgentRegistry::new()),
    );

    assert_eq!(ctx.want.param_i64("count"), Some(10));
    assert_eq!(ctx.want.param_i64("frac"), Some(2));
    assert_eq!(ctx.want.param_f64("rate"), Some(1.5));
    assert_eq!(ctx.want.param_bool("deterministic"), Some(true));
    assert_eq!(ctx.want.param_str("name"), Some("n"));
    assert_eq!(ctx.want.param_i64("missing"), None);
}

// ── execute_agents ────────────────────────────────────────────────────

fn recording_registry() -> std::sync::Arc<AgentRegistry> {
    let registry = AgentRegistry::new();
    let _ = registry.register(AgentSpec::do_agent(
        "greeter",
        vec![Capability::named("greet")],
        |_ctx, want| async move {
            want.state.store_for_agent("greeter", "greeting", json!("hello"));
            Ok(())
        },
    ));
    let _ = registry.register(AgentSpec::do_agent(
        "stamper",
        vec![Capability::named("stamp")],
        |_ctx, want| async move {
            want.state.store_for_agent("stamper", "stamped", json!(true));
            Ok(())
        },
    ));
    std::sync::Arc::new(registry)
}

#[tokio::test]
async fn execute_agents_runs_providers_and_flushes_buffers() -> anyhow::Result<()> {
    let registry = recording_registry();
    let ctx = want_ctx_with(
        "w",
        serde_json::Map::new(),
        vec!["greet".to_owned(), "stamp".to_owned()],
        std::sync::Arc::clone(&registry),
    );

    ctx.execute_agents().await.map_err(|e| anyhow::anyhow!(e))?;

    assert_eq!(ctx.want.state.get("greeting"), Some(json!("hello")));
    assert_eq!(ctx.want.state.get("stamped"), Some(json!(true)));

    // Each agent's flush is one attributed history entry.
    let history = ctx.want.state.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].writer, crate::state::Writer::Agent("greeter".to_owned()));
    assert_eq!(history[1].writer, crate::state::Writer::Agent("stamper".to_owned()));
    Ok(())
}

#[tokio::test]
async fn execute_agents_names_the_first_missing_capability() {
    let registry = recording_registry();
    let ctx = want_ctx_with(
        "w",
        serde_json::Map::new(),
        vec!["greet".to_owned(), "levitate".to_owned()],
        std::sync::Arc::clone(&registry),
    );

    let err = match ctx.execute_agents().await {
        Err(e) => e,
        Ok(()) => {
            assert!(false, "expected resolve error");
            return;
        }
    };
    assert_eq!(err.kind, ErrorKind::Resolve);
    assert!(err.message.contains("levitate"), "got {}", err.message);
}

#[tokio::test]
async fn execute_agents_stops_at_the_first_failure_but_still_flushes() {
    let registry = AgentRegistry::new();
    let _ = registry.register(AgentSpec::do_agent(
        "faulty",
        vec![Capability::named("explode")],
        |_ctx, want| async move {
            want.state.store_for_agent("faulty", "attempted", json!(true));
            Err(EngineError::agent("kaboom"))
        },
    ));
    let _ = registry.register(AgentSpec::do_agent(
        "never-runs",
        vec![Capability::named("after")],
        |_ctx, want| async move {
            want.state.store("should_not_exist", json!(true));
            Ok(())
        },
    ));
    let registry = std::sync::Arc::new(registry);
    let ctx = want_ctx_with(
        "w",
        serde_json::Map::new(),
        vec!["explode".to_owned(), "after".to_owned()],
        std::sync::Arc::clone(&registry),
    );

    let result = ctx.execute_agents().await;
    assert!(result.is_err());
    // Writes before the failure still land at cycle close.
    assert_eq!(ctx.want.state.get("attempted"), Some(json!(true)));
    assert_eq!(ctx.want.state.get("should_not_exist"), None);
}

#[tokio::test]
async fn empty_requirements_are_a_no_op() -> anyhow::Result<()> {
    let ctx = want_ctx("w");
    ctx.execute_agents().await.map_err(|e| anyhow::anyhow!(e))?;
    assert_eq!(ctx.want.state.history_len(), 0);
    Ok(())
}
