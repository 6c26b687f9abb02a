// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative progress driver.
//!
//! One task sweeps the active set in creation order, invoking each want's
//! progress step at most once per pass. Wants never progress
//! concurrently with each other; background agents run on their own
//! tasks and synchronize through the per-want state store.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::want::{WantNode, WantStatus};

/// Final per-want outcome reported after a run.
#[derive(Debug, Clone, Serialize)]
pub struct WantReport {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub status: WantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achieving_percentage: Option<u8>,
}

/// Outcome of a scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub wants: Vec<WantReport>,
}

impl Summary {
    pub fn all_achieved(&self) -> bool {
        self.wants.iter().all(|w| w.status == WantStatus::Achieved)
    }

    pub fn failed_count(&self) -> usize {
        self.wants.iter().filter(|w| w.status == WantStatus::Failed).count()
    }

    pub fn report(&self, id: &str) -> Option<&WantReport> {
        self.wants.iter().find(|w| w.id == id)
    }
}

/// Round-robin driver over a built graph.
pub struct Scheduler {
    config: EngineConfig,
    nodes: Vec<WantNode>,
    shutdown: CancellationToken,
    /// Whether each node's `on_delete` has run. Exactly-once.
    deleted: Vec<bool>,
}

impl Scheduler {
    pub fn new(config: EngineConfig, nodes: Vec<WantNode>, shutdown: CancellationToken) -> Self {
        let deleted = vec![false; nodes.len()];
        Self { config, nodes, shutdown, deleted }
    }

    /// Drive every want until the active set drains or shutdown fires.
    pub async fn run(mut self) -> Summary {
        let quantum = self.config.tick_quantum();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let mut any_active = false;
            for i in 0..self.nodes.len() {
                if self.shutdown.is_cancelled() {
                    break;
                }

                let status = self.nodes[i].ctx.want.status();
                match status {
                    WantStatus::Achieved | WantStatus::Failed | WantStatus::Terminated => {
                        if !self.deleted[i] {
                            self.retire(i).await;
                        } else if !self.nodes[i].ctx.want.outbound_settled().await {
                            // Downstream was full at retirement; keep
                            // nudging until the sentinel lands.
                            let _ = self.nodes[i].ctx.want.provide_done().await;
                        }
                        continue;
                    }
                    WantStatus::Pending => {
                        self.nodes[i].ctx.want.set_status(WantStatus::Reaching);
                    }
                    WantStatus::Reaching => {}
                }
                any_active = true;

                let achieved = {
                    let node = &self.nodes[i];
                    node.behavior.is_achieved(&node.ctx)
                };
                if achieved {
                    self.nodes[i].ctx.want.set_status(WantStatus::Achieved);
                    self.retire(i).await;
                    continue;
                }

                let step = {
                    let node = &mut self.nodes[i];
                    AssertUnwindSafe(node.behavior.progress(&node.ctx)).catch_unwind().await
                };
                match step {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        // Recoverable failures are the want's own business;
                        // an error escaping progress is unrecoverable.
                        self.nodes[i].ctx.want.fail(&EngineError::fatal(format!("{e:#}")));
                    }
                    Err(payload) => {
                        let message = panic_message(payload);
                        warn!(want = %self.nodes[i].ctx.want.meta.id, "progress panicked: {message}");
                        self.nodes[i]
                            .ctx
                            .want
                            .fail(&EngineError::fatal(format!("panic in progress: {message}")));
                    }
                }
            }

            if !any_active && self.background_idle().await {
                break;
            }
            tokio::time::sleep(quantum).await;
        }

        self.finalize().await;
        self.summary()
    }

    /// Post-terminal bookkeeping for one want: emit end-of-stream, run the
    /// behavior's cleanup, then stop any background agents it left behind.
    async fn retire(&mut self, idx: usize) {
        if self.deleted[idx] {
            return;
        }
        self.deleted[idx] = true;

        let grace = self.config.stop_grace();
        let node = &mut self.nodes[idx];
        debug!(want = %node.ctx.want.meta.id, status = %node.ctx.want.status(), "retiring want");

        if let Err(e) = node.ctx.want.provide_done().await {
            // Later sweeps retry until the sentinel lands.
            warn!(want = %node.ctx.want.meta.id, "end-of-stream broadcast incomplete: {}", e.message);
        }
        node.behavior.on_delete(&node.ctx).await;
        node.ctx.want.stop_all_background_agents(grace).await;
        node.ctx.want.cancel.cancel();
    }

    /// Whether every remaining background agent task has finished.
    async fn background_idle(&self) -> bool {
        for node in &self.nodes {
            if node.ctx.want.background_running().await > 0 {
                return false;
            }
        }
        true
    }

    /// Cancellation and exit path: every not-yet-retired want is
    /// terminated and cleaned up exactly once.
    async fn finalize(&mut self) {
        for i in 0..self.nodes.len() {
            if self.deleted[i] {
                continue;
            }
            let want = &self.nodes[i].ctx.want;
            if want.status().is_active() {
                want.set_status(WantStatus::Terminated);
            }
            self.retire(i).await;
        }
    }

    fn summary(&self) -> Summary {
        let wants = self
            .nodes
            .iter()
            .map(|node| {
                let want = &node.ctx.want;
                let (message, has_message) = want.state.get_string("error_message", "");
                WantReport {
                    id: want.meta.id.clone(),
                    name: want.meta.name.clone(),
                    type_name: want.meta.type_name.clone(),
                    status: want.status(),
                    error_message: has_message.then_some(message),
                    achieving_percentage: node.behavior.achieving_percentage(&node.ctx),
                }
            })
            .collect();
        let summary = Summary { wants };
        info!(
            wants = summary.wants.len(),
            failed = summary.failed_count(),
            all_achieved = summary.all_achieved(),
            "scheduler drained"
        );
        summary
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
