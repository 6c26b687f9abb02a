// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic plugin pipeline: discovery → coding → compiling → validation
//! → stable, one phase per progress step.
//!
//! Failed compile attempts retry the same phase against its budget; a
//! failed validation rewinds to coding, whose retry counter is
//! independent. `error_feedback` carries the latest failure detail and
//! clears on success.

use std::future::Future;
use std::pin::Pin;

use serde_json::json;

use wantcore::error::EngineError;
use wantcore::want::{Progressable, WantCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discovery,
    Coding,
    Compiling,
    Validation,
    Stable,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Coding => "coding",
            Self::Compiling => "compiling",
            Self::Validation => "validation",
            Self::Stable => "stable",
        }
    }

    fn percent(self) -> u8 {
        match self {
            Self::Discovery => 0,
            Self::Coding => 25,
            Self::Compiling => 50,
            Self::Validation => 75,
            Self::Stable => 100,
        }
    }
}

/// Parameters: `inject_compile_failures` and `inject_validation_failures`
/// (defaults 0) force that many failures before the phase succeeds, for
/// exercising retry and rewind paths.
pub struct PipelineWant {
    phase: Phase,
    inject_compile_failures: u32,
    inject_validation_failures: u32,
    compile_failures_used: u32,
    validation_failures_used: u32,
}

impl PipelineWant {
    pub fn new() -> Self {
        Self {
            phase: Phase::Discovery,
            inject_compile_failures: 0,
            inject_validation_failures: 0,
            compile_failures_used: 0,
            validation_failures_used: 0,
        }
    }

    fn enter(&mut self, ctx: &WantCtx, next: Phase) {
        self.phase = next;
        ctx.want.state.store("phase", json!(next.as_str()));
    }
}

impl Default for PipelineWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for PipelineWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        let compile = ctx.want.param_i64("inject_compile_failures").unwrap_or(0);
        let validation = ctx.want.param_i64("inject_validation_failures").unwrap_or(0);
        if compile < 0 || validation < 0 {
            anyhow::bail!("failure injections must not be negative");
        }
        self.inject_compile_failures = compile as u32;
        self.inject_validation_failures = validation as u32;

        let mut seed = serde_json::Map::new();
        seed.insert("phase".into(), json!(Phase::Discovery.as_str()));
        seed.insert("error_feedback".into(), json!(""));
        ctx.want.state.store_multi(seed);
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_string("phase", "").0 == "stable"
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match self.phase {
                Phase::Discovery => {
                    ctx.want.state.store("discovered_plugins", json!(["builtin"]));
                    ctx.want.record_phase_success("discovery");
                    self.enter(ctx, Phase::Coding);
                }
                Phase::Coding => {
                    ctx.want.record_phase_success("coding");
                    self.enter(ctx, Phase::Compiling);
                }
                Phase::Compiling => {
                    if self.compile_failures_used < self.inject_compile_failures {
                        self.compile_failures_used += 1;
                        let feedback =
                            format!("compile failed (attempt {})", self.compile_failures_used);
                        ctx.want.state.store("error_feedback", json!(feedback.clone()));
                        ctx.want.record_phase_failure("compiling", EngineError::agent(feedback));
                        // Stay in compiling; the next tick retries.
                    } else {
                        ctx.want.record_phase_success("compiling");
                        ctx.want.state.store("error_feedback", json!(""));
                        self.enter(ctx, Phase::Validation);
                    }
                }
                Phase::Validation => {
                    if self.validation_failures_used < self.inject_validation_failures {
                        self.validation_failures_used += 1;
                        let feedback =
                            format!("validation failed (attempt {})", self.validation_failures_used);
                        ctx.want.state.store("error_feedback", json!(feedback.clone()));
                        ctx.want.record_phase_failure("validation", EngineError::agent(feedback));
                        // Rewind: regenerate the code and compile again.
                        self.enter(ctx, Phase::Coding);
                    } else {
                        ctx.want.record_phase_success("validation");
                        ctx.want.state.store("error_feedback", json!(""));
                        self.enter(ctx, Phase::Stable);
                    }
                }
                Phase::Stable => {}
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }

    fn achieving_percentage(&self, _ctx: &WantCtx) -> Option<u8> {
        Some(self.phase.percent())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
