// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-in coordinator: collects one contribution per inbound channel and
//! approves once enough distinct channels have delivered.
//!
//! End-of-stream forwarding is configurable per node. `done_when = "any"`
//! forwards the sentinel at the first one observed (after draining
//! already-queued packets); `"all"` forwards only when every input has
//! ended.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::{json, Map, Value};

use wantcore::error::EngineError;
use wantcore::want::{Progressable, WantCtx};

const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// When a fan-in node considers its inputs finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneRule {
    /// The first sentinel observed ends the node.
    Any,
    /// Every input must end.
    All,
}

impl DoneRule {
    fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            other => anyhow::bail!("done_when must be \"any\" or \"all\", got {other:?}"),
        }
    }
}

/// Parameters: `required_inputs` (default: the number of inbound
/// channels), `done_when` (`"any"` or `"all"`, default `"any"`).
pub struct CombineWant {
    required_inputs: Option<u64>,
    done_rule: DoneRule,
    data_by_channel: Map<String, Value>,
    ended: BTreeSet<usize>,
    total_received: u64,
    done_seen: bool,
}

impl CombineWant {
    pub fn new() -> Self {
        Self {
            required_inputs: None,
            done_rule: DoneRule::Any,
            data_by_channel: Map::new(),
            ended: BTreeSet::new(),
            total_received: 0,
            done_seen: false,
        }
    }

    fn approved(&self, input_count: usize) -> bool {
        let required = self.required_inputs.unwrap_or(input_count as u64);
        self.data_by_channel.len() as u64 >= required
    }

    fn store_progress(&self, ctx: &WantCtx) {
        let mut changes = Map::new();
        changes.insert("data_by_channel".into(), Value::Object(self.data_by_channel.clone()));
        changes.insert("total_packets_received".into(), json!(self.total_received));
        ctx.want.state.store_multi(changes);
    }
}

impl Default for CombineWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for CombineWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        if let Some(required) = ctx.want.param_i64("required_inputs") {
            if required <= 0 {
                anyhow::bail!("required_inputs must be positive, got {required}");
            }
            self.required_inputs = Some(required as u64);
        }
        if let Some(rule) = ctx.want.param_str("done_when") {
            self.done_rule = DoneRule::parse(rule)?;
        }
        let mut seed = Map::new();
        seed.insert("approval_status".into(), json!("waiting"));
        seed.insert("total_packets_received".into(), json!(0));
        seed.insert("data_by_channel".into(), json!({}));
        ctx.want.state.store_multi(seed);
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_string("approval_status", "").0 == "approved"
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let input_count = ctx.want.in_edge_count().await;
            let mut changed = false;

            while let Some((channel, packet)) = ctx.want.use_any(DRAIN_WAIT).await {
                if packet.is_end() {
                    self.ended.insert(channel);
                    self.done_seen = true;
                    continue;
                }
                let payload = packet.payload().cloned().unwrap_or(Value::Null);
                self.data_by_channel.insert(channel.to_string(), payload);
                self.total_received += 1;
                changed = true;
            }

            if changed {
                self.store_progress(ctx);
            }

            if self.approved(input_count) {
                ctx.want.state.store("approval_status", json!("approved"));
                let forward = match self.done_rule {
                    DoneRule::Any => self.done_seen,
                    DoneRule::All => self.ended.len() >= input_count,
                };
                if forward {
                    // Retirement retries while downstream is full.
                    let _ = ctx.want.provide_done().await;
                }
                return Ok(());
            }

            // Every producer has ended (or dropped) and the requirement
            // can no longer be met: surface it instead of spinning.
            let inputs_exhausted =
                self.ended.len() >= input_count || ctx.want.in_edges_closed().await;
            if inputs_exhausted {
                ctx.want.fail(&EngineError::comm(format!(
                    "inputs ended after {} of {} required contributions",
                    self.data_by_channel.len(),
                    self.required_inputs.unwrap_or(input_count as u64),
                )));
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

#[cfg(test)]
#[path = "combine_tests.rs"]
mod tests;
