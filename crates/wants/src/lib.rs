// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wantrun: reference want library and graph runner.
//!
//! The behaviors here implement the core [`wantcore::want::Progressable`]
//! contract: packet sources and sinks, a queue simulation, a fan-in
//! coordinator, a subprocess runner, a reminder, and a plugin pipeline.

pub mod combine;
pub mod command;
pub mod duration;
pub mod numbers;
pub mod pipeline;
pub mod queue;
pub mod remind;
pub mod sink;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use wantcore::builder::{ChainBuilder, GraphSpec};
use wantcore::config::EngineConfig;
use wantcore::registry::AgentRegistry;
use wantcore::scheduler::Summary;

/// Register every reference want type on a builder.
pub fn register_all(builder: &mut ChainBuilder) {
    builder.register_want_type("numbers", |_meta, _spec| Ok(Box::new(numbers::NumbersWant::new())));
    builder.register_want_type("queue", |_meta, _spec| Ok(Box::new(queue::QueueWant::new())));
    builder.register_want_type("sink", |_meta, _spec| Ok(Box::new(sink::SinkWant::new())));
    builder.register_want_type("combine", |_meta, _spec| Ok(Box::new(combine::CombineWant::new())));
    builder.register_want_type("command", |_meta, _spec| Ok(Box::new(command::CommandWant::new())));
    builder.register_want_type("remind", |_meta, _spec| Ok(Box::new(remind::RemindWant::new())));
    builder.register_want_type("pipeline", |_meta, _spec| Ok(Box::new(pipeline::PipelineWant::new())));
}

/// Load a JSON graph from disk and drive it to completion.
pub async fn run_file(config: EngineConfig, path: &Path) -> anyhow::Result<Summary> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    let graph: GraphSpec = serde_json::from_str(&contents)
        .with_context(|| format!("parsing graph {}", path.display()))?;

    let registry = Arc::new(AgentRegistry::new());
    let mut builder = ChainBuilder::new(config.clone(), registry);
    register_all(&mut builder);

    wantcore::run(config, &builder, &graph).await
}
