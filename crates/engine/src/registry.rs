// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability and agent registration.
//!
//! Populated at startup, read-mostly during execution. A requirement
//! resolves to an exact agent id when one matches, otherwise to the
//! first-registered provider of the capability.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::want::Want;

/// A named behavior and the keywords it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Capability {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), keywords: Vec::new() }
    }

    pub fn with_keywords(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self { name: name.into(), keywords: keywords.iter().map(|k| (*k).to_owned()).collect() }
    }
}

/// Synchronous single-shot agent body.
pub type DoFn = Arc<
    dyn Fn(
            CancellationToken,
            Arc<Want>,
        ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>
        + Send
        + Sync,
>;

/// Periodic agent body: `(should_stop, result)` per tick.
pub type PollFn = Arc<
    dyn Fn(
            CancellationToken,
            Arc<Want>,
        ) -> Pin<Box<dyn Future<Output = (bool, Result<(), EngineError>)> + Send>>
        + Send
        + Sync,
>;

/// How a registered agent executes.
pub enum AgentExec {
    /// Invoked inline during a progress cycle.
    Do(DoFn),
    /// Driven by a ticker in its own task.
    Poll { interval: Duration, poll: PollFn },
}

/// A registered capability provider.
pub struct AgentSpec {
    pub id: String,
    pub capabilities: Vec<Capability>,
    pub exec: AgentExec,
}

impl AgentSpec {
    pub fn do_agent<F, Fut>(id: impl Into<String>, capabilities: Vec<Capability>, f: F) -> Self
    where
        F: Fn(CancellationToken, Arc<Want>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let exec: DoFn = Arc::new(move |ctx, want| Box::pin(f(ctx, want)));
        Self { id: id.into(), capabilities, exec: AgentExec::Do(exec) }
    }

    pub fn poll_agent<F, Fut>(
        id: impl Into<String>,
        capabilities: Vec<Capability>,
        interval: Duration,
        f: F,
    ) -> Self
    where
        F: Fn(CancellationToken, Arc<Want>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (bool, Result<(), EngineError>)> + Send + 'static,
    {
        let poll: PollFn = Arc::new(move |ctx, want| Box::pin(f(ctx, want)));
        Self { id: id.into(), capabilities, exec: AgentExec::Poll { interval, poll } }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Agent id → spec, in registration order.
    agents: IndexMap<String, Arc<AgentSpec>>,
    /// Capability name → provider ids, in registration order.
    by_capability: IndexMap<String, Vec<String>>,
}

/// Process-wide agent registry, safe for concurrent reads.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: AgentSpec) -> anyhow::Result<()> {
        let mut inner = self.inner.write();
        if inner.agents.contains_key(&spec.id) {
            anyhow::bail!("duplicate agent id {}", spec.id);
        }
        let id = spec.id.clone();
        for cap in &spec.capabilities {
            inner.by_capability.entry(cap.name.clone()).or_default().push(id.clone());
        }
        inner.agents.insert(id, Arc::new(spec));
        Ok(())
    }

    pub fn agent(&self, id: &str) -> Option<Arc<AgentSpec>> {
        self.inner.read().agents.get(id).cloned()
    }

    /// Resolve a requirement: an exact agent id wins, otherwise the
    /// first-registered provider of the capability.
    pub fn resolve(&self, requirement: &str) -> Option<Arc<AgentSpec>> {
        let inner = self.inner.read();
        if let Some(agent) = inner.agents.get(requirement) {
            return Some(Arc::clone(agent));
        }
        let providers = inner.by_capability.get(requirement)?;
        providers.first().and_then(|id| inner.agents.get(id).cloned())
    }

    /// All providers of a capability, in registration order.
    pub fn providers(&self, capability: &str) -> Vec<Arc<AgentSpec>> {
        let inner = self.inner.read();
        inner
            .by_capability
            .get(capability)
            .map(|ids| ids.iter().filter_map(|id| inner.agents.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Position of an agent in registration order.
    pub fn registration_index(&self, id: &str) -> Option<usize> {
        self.inner.read().agents.get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().agents.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
