// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wantcore: execution engine for declarative intent graphs.
//!
//! A *want* is a typed, parameterized node representing a desired outcome.
//! The engine wires wants through bounded packet channels, drives each
//! one's progress step from a single cooperative scheduler, and runs
//! capability agents inline or on background tickers, until every want is
//! achieved, failed, or terminated.

pub mod agent;
pub mod builder;
pub mod channel;
pub mod config;
pub mod error;
pub mod packet;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod test_support;
pub mod want;

use tokio_util::sync::CancellationToken;

use crate::builder::{ChainBuilder, GraphSpec};
use crate::config::EngineConfig;
use crate::scheduler::{Scheduler, Summary};

/// Build a graph and drive it until it drains or ctrl-c fires.
pub async fn run(
    config: EngineConfig,
    builder: &ChainBuilder,
    graph: &GraphSpec,
) -> anyhow::Result<Summary> {
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, terminating wants");
                shutdown.cancel();
            }
        });
    }

    let nodes = builder.build(graph, &shutdown)?;
    Ok(Scheduler::new(config, nodes, shutdown).run().await)
}
