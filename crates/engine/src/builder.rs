// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph materialization: want type registration and instantiation of a
//! declarative node list into wired [`WantNode`]s.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::channel;
use crate::config::EngineConfig;
use crate::registry::AgentRegistry;
use crate::want::{Progressable, Want, WantCtx, WantMeta, WantNode};

/// Declarative graph document: the builder is its sole consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// One node descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Stable node id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Capability names required each cycle.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Upstream node ids; one packet edge per entry, and the entry's
    /// position is the consumer's inbound channel index.
    #[serde(default)]
    pub uses: Vec<String>,
    /// Per-node override of the inbound edge capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

type WantCtor = Box<dyn Fn(WantMeta, &NodeSpec) -> anyhow::Result<Box<dyn Progressable>> + Send + Sync>;

/// Registers want type constructors and materializes graphs.
pub struct ChainBuilder {
    config: EngineConfig,
    registry: Arc<AgentRegistry>,
    types: HashMap<String, WantCtor>,
}

impl ChainBuilder {
    pub fn new(config: EngineConfig, registry: Arc<AgentRegistry>) -> Self {
        Self { config, registry, types: HashMap::new() }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Register a constructor for a want type name. Later registrations
    /// replace earlier ones.
    pub fn register_want_type<F>(&mut self, type_name: &str, ctor: F)
    where
        F: Fn(WantMeta, &NodeSpec) -> anyhow::Result<Box<dyn Progressable>> + Send + Sync + 'static,
    {
        self.types.insert(type_name.to_owned(), Box::new(ctor));
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Instantiate every node, wire one bounded channel per `uses` edge,
    /// and run each behavior's initialize.
    ///
    /// Rejects unknown types, duplicate ids, references to missing nodes,
    /// and packet-producing cycles. A want whose initialize fails is
    /// returned in `Failed` status rather than aborting the build.
    pub fn build(
        &self,
        graph: &GraphSpec,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<Vec<WantNode>> {
        // Assign ids and index the graph as a flat array.
        let ids: Vec<String> = graph
            .nodes
            .iter()
            .map(|n| n.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
            .collect();

        let mut index_of = HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            if index_of.insert(id.clone(), i).is_some() {
                anyhow::bail!("duplicate node id {id}");
            }
        }

        // Validate types and edge references up front.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (i, node) in graph.nodes.iter().enumerate() {
            if !self.types.contains_key(&node.type_name) {
                anyhow::bail!("unknown want type {} (node {})", node.type_name, ids[i]);
            }
            for upstream in &node.uses {
                let Some(&u) = index_of.get(upstream) else {
                    anyhow::bail!("node {} uses unknown node {upstream}", ids[i]);
                };
                edges.push((u, i));
            }
        }
        reject_cycles(graph.nodes.len(), &edges)?;

        // Build the cores and wire edges before anything is shared.
        let mut cores: Vec<Want> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let meta = WantMeta {
                    id: ids[i].clone(),
                    name: node.name.clone(),
                    type_name: node.type_name.clone(),
                };
                Want::new(
                    meta,
                    node.params.clone(),
                    node.requires.clone(),
                    self.config.max_phase_retries,
                    shutdown.child_token(),
                )
            })
            .collect();

        for (i, node) in graph.nodes.iter().enumerate() {
            let capacity = node.channel_capacity.unwrap_or(self.config.channel_capacity);
            for upstream in &node.uses {
                let u = index_of[upstream];
                let (tx, rx) = channel::edge(capacity);
                cores[u].attach_out_edge(tx);
                cores[i].attach_in_edge(rx);
            }
        }

        // Construct behaviors and initialize.
        let mut nodes = Vec::with_capacity(cores.len());
        for (core, spec) in cores.into_iter().zip(&graph.nodes) {
            let ctor = self
                .types
                .get(&spec.type_name)
                .ok_or_else(|| anyhow::anyhow!("unknown want type {}", spec.type_name))?;
            let mut behavior = ctor(core.meta.clone(), spec)?;
            let ctx = WantCtx { want: Arc::new(core), registry: Arc::clone(&self.registry) };
            if let Err(e) = behavior.initialize(&ctx) {
                ctx.want.fail(&crate::error::EngineError::config(format!("{e:#}")));
            }
            nodes.push(WantNode { ctx, behavior });
        }
        Ok(nodes)
    }
}

/// Reject cycles among packet-producing edges. Control relationships
/// (shared capability registrations) carry no edges and are fine.
fn reject_cycles(node_count: usize, edges: &[(usize, usize)]) -> anyhow::Result<()> {
    let mut adjacency = vec![Vec::new(); node_count];
    for (from, to) in edges {
        adjacency[*from].push(*to);
    }

    // 0 = unvisited, 1 = on stack, 2 = done.
    let mut color = vec![0u8; node_count];
    for start in 0..node_count {
        if color[start] != 0 {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        color[start] = 1;
        while let Some(&mut (node, next)) = stack.last_mut() {
            if next < adjacency[node].len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let child = adjacency[node][next];
                match color[child] {
                    0 => {
                        color[child] = 1;
                        stack.push((child, 0));
                    }
                    1 => anyhow::bail!("packet-producing cycle through node index {child}"),
                    _ => {}
                }
            } else {
                color[node] = 2;
                stack.pop();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
