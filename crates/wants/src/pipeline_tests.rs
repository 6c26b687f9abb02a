// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use wantcore::test_support::want_ctx_with;
use wantcore::want::WantStatus;

fn ctx_for(params: serde_json::Value) -> WantCtx {
    want_ctx_with(
        "pipeline",
        params.as_object().cloned().unwrap_or_default(),
        Vec::new(),
        std::sync::Arc::new(wantcore::registry::AgentRegistry::new()),
    )
}

async fn drive(w: &mut PipelineWant, ctx: &WantCtx, max_steps: u32) -> u32 {
    let mut steps = 0;
    for _ in 0..max_steps {
        if w.is_achieved(ctx) || !ctx.want.status().is_active() {
            break;
        }
        let _ = w.progress(ctx).await;
        steps += 1;
    }
    steps
}

#[tokio::test]
async fn advances_one_phase_per_step() -> anyhow::Result<()> {
    let ctx = ctx_for(json!({}));
    ctx.want.set_status(WantStatus::Reaching);
    let mut w = PipelineWant::new();
    w.initialize(&ctx)?;

    let expected = ["coding", "compiling", "validation", "stable"];
    for phase in expected {
        w.progress(&ctx).await?;
        assert_eq!(ctx.want.state.get_string("phase", "").0, phase);
    }
    assert!(w.is_achieved(&ctx));
    assert_eq!(w.achieving_percentage(&ctx), Some(100));
    Ok(())
}

#[tokio::test]
async fn compile_failures_retry_in_place_then_succeed() -> anyhow::Result<()> {
    let ctx = ctx_for(json!({"inject_compile_failures": 2}));
    ctx.want.set_status(WantStatus::Reaching);
    let mut w = PipelineWant::new();
    w.initialize(&ctx)?;

    drive(&mut w, &ctx, 20).await;

    assert!(w.is_achieved(&ctx));
    assert_eq!(ctx.want.state.get_string("phase", "").0, "stable");
    // Two failed attempts were charged to compiling before it cleared.
    assert_eq!(ctx.want.phase_failures_total("compiling"), 2);
    assert_eq!(ctx.want.phase_retry_count("compiling"), 0);
    assert_eq!(ctx.want.state.get("error_feedback"), Some(json!("")));
    Ok(())
}

#[tokio::test]
async fn exhausting_the_compile_budget_fails_the_want() -> anyhow::Result<()> {
    let ctx = ctx_for(json!({"inject_compile_failures": 5}));
    ctx.want.set_status(WantStatus::Reaching);
    let mut w = PipelineWant::new();
    w.initialize(&ctx)?;

    drive(&mut w, &ctx, 20).await;

    assert_eq!(ctx.want.status(), WantStatus::Failed);
    assert!(ctx.want.phase_retry_count("compiling") <= 3);
    Ok(())
}

#[tokio::test]
async fn validation_failure_rewinds_to_coding() -> anyhow::Result<()> {
    let ctx = ctx_for(json!({"inject_validation_failures": 1}));
    ctx.want.set_status(WantStatus::Reaching);
    let mut w = PipelineWant::new();
    w.initialize(&ctx)?;

    let mut phases = vec![ctx.want.state.get_string("phase", "").0];
    for _ in 0..20 {
        if w.is_achieved(&ctx) || !ctx.want.status().is_active() {
            break;
        }
        w.progress(&ctx).await?;
        phases.push(ctx.want.state.get_string("phase", "").0);
    }

    assert!(w.is_achieved(&ctx));
    // The rewound pass repeats coding and compiling before validating.
    assert_eq!(
        phases,
        vec!["discovery", "coding", "compiling", "validation", "coding", "compiling", "validation", "stable"]
    );
    // Rewind keeps counters independent.
    assert_eq!(ctx.want.phase_failures_total("validation"), 1);
    assert_eq!(ctx.want.phase_failures_total("coding"), 0);
    Ok(())
}

#[test]
fn rejects_negative_injections() {
    let ctx = ctx_for(json!({"inject_compile_failures": -1}));
    assert!(PipelineWant::new().initialize(&ctx).is_err());
}
