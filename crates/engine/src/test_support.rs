// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine and spec tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel;
use crate::packet::Packet;
use crate::registry::AgentRegistry;
use crate::want::{Progressable, Want, WantCtx, WantMeta};

/// Build a standalone want context with no channels and an empty registry.
pub fn want_ctx(name: &str) -> WantCtx {
    want_ctx_with(name, Map::new(), Vec::new(), Arc::new(AgentRegistry::new()))
}

/// Build a standalone want context with explicit parameters, requirements,
/// and registry.
pub fn want_ctx_with(
    name: &str,
    params: Map<String, Value>,
    requires: Vec<String>,
    registry: Arc<AgentRegistry>,
) -> WantCtx {
    let meta = WantMeta {
        id: format!("{name}-id"),
        name: name.to_owned(),
        type_name: "test".to_owned(),
    };
    let want = Want::new(meta, params, requires, 3, CancellationToken::new());
    WantCtx { want: Arc::new(want), registry }
}

/// Build a want context wired with `inputs` inbound and `outputs`
/// outbound edges at the default capacity. Returns the senders feeding
/// the want and the receivers fed by it.
pub fn wired_want_ctx(
    name: &str,
    params: Map<String, Value>,
    inputs: usize,
    outputs: usize,
) -> (WantCtx, Vec<mpsc::Sender<Packet>>, Vec<mpsc::Receiver<Packet>>) {
    wired_want_ctx_cap(name, params, inputs, outputs, channel::DEFAULT_CAPACITY)
}

/// Like [`wired_want_ctx`] with an explicit per-edge capacity, for
/// backpressure tests.
pub fn wired_want_ctx_cap(
    name: &str,
    params: Map<String, Value>,
    inputs: usize,
    outputs: usize,
    capacity: usize,
) -> (WantCtx, Vec<mpsc::Sender<Packet>>, Vec<mpsc::Receiver<Packet>>) {
    let meta = WantMeta {
        id: format!("{name}-id"),
        name: name.to_owned(),
        type_name: "test".to_owned(),
    };
    let mut want = Want::new(meta, params, Vec::new(), 3, CancellationToken::new());

    let mut feeds = Vec::new();
    for _ in 0..inputs {
        let (tx, rx) = channel::edge(capacity);
        want.attach_in_edge(rx);
        feeds.push(tx);
    }
    let mut taps = Vec::new();
    for _ in 0..outputs {
        let (tx, rx) = channel::edge(capacity);
        want.attach_out_edge(tx);
        taps.push(rx);
    }

    let ctx = WantCtx { want: Arc::new(want), registry: Arc::new(AgentRegistry::new()) };
    (ctx, feeds, taps)
}

/// Behavior assembled from closures, for tests that only need synchronous
/// steps. Tracks how many times `on_delete` ran.
pub struct FnWant {
    achieved: Box<dyn Fn(&WantCtx) -> bool + Send>,
    step: Box<dyn FnMut(&WantCtx) -> anyhow::Result<()> + Send>,
    pub deleted: Arc<AtomicUsize>,
}

impl FnWant {
    pub fn new(
        achieved: impl Fn(&WantCtx) -> bool + Send + 'static,
        step: impl FnMut(&WantCtx) -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        Self { achieved: Box::new(achieved), step: Box::new(step), deleted: Arc::new(AtomicUsize::new(0)) }
    }

    /// A want that achieves after `steps` progress calls.
    pub fn counting(steps: usize) -> Self {
        Self::new(
            move |ctx| {
                let (count, _) = ctx.want.state.get_int("steps", 0);
                count >= steps as i64
            },
            |ctx| {
                let (count, _) = ctx.want.state.get_int("steps", 0);
                ctx.want.state.store("steps", serde_json::json!(count + 1));
                Ok(())
            },
        )
    }
}

impl Progressable for FnWant {
    fn initialize(&mut self, _ctx: &WantCtx) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        (self.achieved)(ctx)
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move { (self.step)(ctx) })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        self.deleted.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

/// Behavior whose progress always panics.
pub struct PanickingWant;

impl Progressable for PanickingWant {
    fn initialize(&mut self, _ctx: &WantCtx) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_achieved(&self, _ctx: &WantCtx) -> bool {
        false
    }

    fn progress<'a>(
        &'a mut self,
        _ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async { unreachable_step() })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

#[allow(clippy::panic)]
fn unreachable_step() -> anyhow::Result<()> {
    panic!("injected progress panic")
}
