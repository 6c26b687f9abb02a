// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end want graph runs.
//!
//! Builds real graphs out of the reference want library, drives them
//! through the scheduler, and keeps handles on the want cores so the
//! suites can inspect state after the run.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use wantcore::builder::{ChainBuilder, GraphSpec};
use wantcore::config::EngineConfig;
use wantcore::registry::AgentRegistry;
use wantcore::scheduler::{Scheduler, Summary};
use wantcore::want::{Progressable, Want, WantCtx};

/// Outcome of a harness run: the scheduler summary plus want handles by
/// node id.
pub struct GraphRun {
    pub summary: Summary,
    pub wants: HashMap<String, Arc<Want>>,
}

impl GraphRun {
    #[allow(clippy::panic)]
    pub fn want(&self, id: &str) -> Arc<Want> {
        match self.wants.get(id) {
            Some(want) => Arc::clone(want),
            None => panic!("no want with id {id} in this graph"),
        }
    }
}

/// Fast scheduler settings for tests.
pub fn test_config() -> EngineConfig {
    EngineConfig { tick_ms: 1, ..EngineConfig::default() }
}

/// Parse a graph document from inline JSON.
pub fn graph(value: serde_json::Value) -> anyhow::Result<GraphSpec> {
    Ok(serde_json::from_value(value)?)
}

/// Run a graph of reference want types to completion.
pub async fn run_graph(graph: &GraphSpec) -> anyhow::Result<GraphRun> {
    run_graph_with(graph, CancellationToken::new(), |_| {}).await
}

/// Run a graph with an external shutdown token and extra type
/// registrations (for suite-local fixture wants).
pub async fn run_graph_with(
    graph: &GraphSpec,
    shutdown: CancellationToken,
    register_extra: impl FnOnce(&mut ChainBuilder),
) -> anyhow::Result<GraphRun> {
    let config = test_config();
    let registry = Arc::new(AgentRegistry::new());
    let mut builder = ChainBuilder::new(config.clone(), registry);
    wantrun::register_all(&mut builder);
    register_extra(&mut builder);

    let nodes = builder.build(graph, &shutdown)?;
    let wants: HashMap<String, Arc<Want>> =
        nodes.iter().map(|n| (n.ctx.want.meta.id.clone(), Arc::clone(&n.ctx.want))).collect();

    let summary = Scheduler::new(config, nodes, shutdown).run().await;
    Ok(GraphRun { summary, wants })
}

/// Fixture: a want that never achieves, keeps a monitoring agent alive,
/// and counts `on_delete` invocations in state.
pub struct LingeringWant {
    armed: bool,
}

impl LingeringWant {
    pub fn new() -> Self {
        Self { armed: false }
    }
}

impl Default for LingeringWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for LingeringWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        ctx.want.state.store("deleted_count", serde_json::json!(0));
        Ok(())
    }

    fn is_achieved(&self, _ctx: &WantCtx) -> bool {
        false
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.armed {
                self.armed = true;
                ctx
                    .add_monitoring_agent(
                        "pulse",
                        std::time::Duration::from_millis(5),
                        Arc::new(|_token, want: Arc<Want>| {
                            Box::pin(async move {
                                let (n, _) = want.state.get_int("pulses", 0);
                                want.state.store_for_agent("pulse", "pulses", serde_json::json!(n + 1));
                                (false, Ok(()))
                            })
                        }),
                    )
                    .await;
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let (n, _) = ctx.want.state.get_int("deleted_count", 0);
            ctx.want.state.store("deleted_count", serde_json::json!(n + 1));
        })
    }
}
