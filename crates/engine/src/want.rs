// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The want entity: identity, parameters, state, channels, retry
//! bookkeeping, and the contract concrete behaviors implement.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{spawn_background, spawn_poller, BackgroundAgent, BackgroundHandle};
use crate::channel::{InPorts, OutPorts};
use crate::error::EngineError;
use crate::packet::Packet;
use crate::registry::{AgentExec, AgentRegistry, PollFn};
use crate::state::StateStore;

/// Externally observable lifecycle state of a want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WantStatus {
    Pending,
    Reaching,
    Achieved,
    Failed,
    Terminated,
}

impl WantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reaching => "reaching",
            Self::Achieved => "achieved",
            Self::Failed => "failed",
            Self::Terminated => "terminated",
        }
    }

    /// Whether the want still belongs in the scheduler's active set.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Reaching)
    }

    /// Whether a transition from `self` to `next` is allowed. `Achieved`
    /// may only re-open to `Reaching` (an explicit want decision);
    /// `Failed` and `Terminated` are final.
    pub fn can_transition(self, next: WantStatus) -> bool {
        match self {
            Self::Pending | Self::Reaching => true,
            Self::Achieved => matches!(next, Self::Reaching),
            Self::Failed | Self::Terminated => false,
        }
    }
}

impl std::fmt::Display for WantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of a want.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantMeta {
    pub id: String,
    pub name: String,
    pub type_name: String,
}

#[derive(Default)]
struct RetryBook {
    /// Current consecutive-failure count per phase. Reset on success.
    counts: HashMap<String, u32>,
    /// Total failures per phase over the want's lifetime. Never reset.
    totals: HashMap<String, u32>,
    last_error: Option<EngineError>,
}

/// Core want entity shared between the scheduler, the concrete behavior,
/// and any background agents the behavior starts.
pub struct Want {
    pub meta: WantMeta,
    pub params: Map<String, Value>,
    pub state: StateStore,
    /// Child of the scheduler's root token; cancelling it stops every
    /// background agent this want owns.
    pub cancel: CancellationToken,
    max_phase_retries: u32,
    status: Mutex<WantStatus>,
    requires: Mutex<Vec<String>>,
    retries: Mutex<RetryBook>,
    in_ports: AsyncMutex<InPorts>,
    out_ports: AsyncMutex<OutPorts>,
    background: AsyncMutex<Vec<BackgroundHandle>>,
}

impl Want {
    pub fn new(
        meta: WantMeta,
        params: Map<String, Value>,
        requires: Vec<String>,
        max_phase_retries: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            meta,
            params,
            state: StateStore::new(),
            cancel,
            max_phase_retries,
            status: Mutex::new(WantStatus::Pending),
            requires: Mutex::new(requires),
            retries: Mutex::new(RetryBook::default()),
            in_ports: AsyncMutex::new(InPorts::default()),
            out_ports: AsyncMutex::new(OutPorts::default()),
            background: AsyncMutex::new(Vec::new()),
        }
    }

    // -- parameters ---------------------------------------------------------

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Integer parameter; a float value truncates toward zero.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        let v = self.param(key)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(Value::as_f64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.param(key).and_then(Value::as_bool)
    }

    // -- status -------------------------------------------------------------

    pub fn status(&self) -> WantStatus {
        *self.status.lock()
    }

    /// Apply a guarded status transition. Disallowed transitions are
    /// dropped (with a debug log) and return `false`.
    pub fn set_status(&self, next: WantStatus) -> bool {
        let mut status = self.status.lock();
        if *status == next {
            return true;
        }
        if !status.can_transition(next) {
            debug!(want = %self.meta.id, from = %status, to = %next, "dropping disallowed status transition");
            return false;
        }
        debug!(want = %self.meta.id, from = %status, to = %next, "status transition");
        *status = next;
        true
    }

    /// Mark the want failed and surface the error through state.
    pub fn fail(&self, err: &EngineError) {
        warn!(want = %self.meta.id, kind = %err.kind, "want failed: {}", err.message);
        self.state.store("error_message", Value::String(err.to_string()));
        self.set_status(WantStatus::Failed);
    }

    // -- requirements -------------------------------------------------------

    pub fn requires(&self) -> Vec<String> {
        self.requires.lock().clone()
    }

    pub fn set_requires(&self, requires: Vec<String>) {
        *self.requires.lock() = requires;
    }

    // -- retry bookkeeping --------------------------------------------------

    pub fn phase_retry_count(&self, phase: &str) -> u32 {
        self.retries.lock().counts.get(phase).copied().unwrap_or(0)
    }

    /// Lifetime failure total for a phase; unlike the retry counter this
    /// is never reset by success.
    pub fn phase_failures_total(&self, phase: &str) -> u32 {
        self.retries.lock().totals.get(phase).copied().unwrap_or(0)
    }

    pub fn last_phase_error(&self) -> Option<EngineError> {
        self.retries.lock().last_error.clone()
    }

    /// Charge a failed attempt against `phase`. Terminal kinds and
    /// exhausted retry budgets fail the want; otherwise it stays
    /// `Reaching` and may retry on the next scheduler tick. Returns the
    /// resulting status.
    pub fn record_phase_failure(&self, phase: &str, err: EngineError) -> WantStatus {
        if err.kind.is_terminal() {
            self.retries.lock().last_error = Some(err.clone());
            self.state.store("last_phase_error", Value::String(err.to_string()));
            self.fail(&err);
            return self.status();
        }

        let exhausted = {
            let mut book = self.retries.lock();
            let count = {
                let count = book.counts.entry(phase.to_owned()).or_insert(0);
                *count = (*count + 1).min(self.max_phase_retries);
                *count
            };
            *book.totals.entry(phase.to_owned()).or_insert(0) += 1;
            book.last_error = Some(err.clone());
            count >= self.max_phase_retries
        };
        self.state.store("last_phase_error", Value::String(err.to_string()));

        if exhausted {
            self.fail(&EngineError::new(
                err.kind,
                format!("phase {phase} failed after {} attempts: {}", self.max_phase_retries, err.message),
            ));
        } else {
            warn!(
                want = %self.meta.id,
                phase,
                attempt = self.phase_retry_count(phase),
                "phase attempt failed: {}", err.message
            );
            self.set_status(WantStatus::Reaching);
        }
        self.status()
    }

    /// Clear `phase`'s retry counter and the last phase error.
    pub fn record_phase_success(&self, phase: &str) {
        let had_error = {
            let mut book = self.retries.lock();
            book.counts.insert(phase.to_owned(), 0);
            book.last_error.take().is_some()
        };
        if had_error {
            self.state.store("last_phase_error", Value::Null);
        }
    }

    // -- channels -----------------------------------------------------------

    /// Wire an inbound edge. Only the builder calls this, before the want
    /// is shared.
    pub fn attach_in_edge(&mut self, rx: tokio::sync::mpsc::Receiver<Packet>) {
        self.in_ports.get_mut().attach(rx);
    }

    /// Wire an outbound edge. Only the builder calls this, before the want
    /// is shared.
    pub fn attach_out_edge(&mut self, tx: tokio::sync::mpsc::Sender<Packet>) {
        self.out_ports.get_mut().attach(tx);
    }

    /// Select across inbound edges with a bounded wait.
    pub async fn use_any(&self, wait: Duration) -> Option<(usize, Packet)> {
        self.in_ports.lock().await.use_any(wait).await
    }

    /// Select across inbound edges until one delivers or all close.
    pub async fn use_forever(&self) -> Option<(usize, Packet)> {
        self.in_ports.lock().await.use_forever().await
    }

    /// Fan a packet out to every outbound edge with a bounded wait per
    /// edge. `Ok` accepts the packet (a stalled edge takes delivery on a
    /// later call); `Err` rejects it while an earlier broadcast is still
    /// undelivered, and the caller should park the packet until the next
    /// step.
    pub async fn provide(&self, packet: Packet) -> Result<(), EngineError> {
        self.out_ports.lock().await.provide(packet).await
    }

    /// Broadcast one end-of-stream sentinel per outbound edge; at most
    /// once per edge, and safe to retry after a timeout.
    pub async fn provide_done(&self) -> Result<(), EngineError> {
        self.out_ports.lock().await.provide_done().await
    }

    /// Whether every outbound edge has taken its sentinel and no data
    /// broadcast is still in flight.
    pub async fn outbound_settled(&self) -> bool {
        self.out_ports.lock().await.settled()
    }

    pub async fn in_edge_count(&self) -> usize {
        self.in_ports.lock().await.len()
    }

    /// Whether every inbound edge has been observed closed.
    pub async fn in_edges_closed(&self) -> bool {
        self.in_ports.lock().await.all_closed()
    }

    pub async fn out_edge_count(&self) -> usize {
        self.out_ports.lock().await.len()
    }

    // -- agents -------------------------------------------------------------

    /// Cancel every background agent and wait up to `grace` for each to
    /// finish; stragglers are aborted.
    pub async fn stop_all_background_agents(&self, grace: Duration) {
        let handles: Vec<BackgroundHandle> = self.background.lock().await.drain(..).collect();
        for handle in handles {
            handle.stop(grace).await;
        }
    }

    /// Number of background agent tasks still running.
    pub async fn background_running(&self) -> usize {
        self.background.lock().await.iter().filter(|h| !h.is_finished()).count()
    }
}

// -- the Progressable contract ----------------------------------------------

/// Per-want context handed to every contract method.
#[derive(Clone)]
pub struct WantCtx {
    pub want: Arc<Want>,
    pub registry: Arc<AgentRegistry>,
}

impl WantCtx {
    /// Execute every required capability's do-agent, bracketed by a write
    /// epoch. Resolution failures name the first missing capability. Do
    /// agents run in registry registration order; the first error stops
    /// the sequence. Buffered agent writes flush (in registration order)
    /// even when an agent fails.
    pub async fn execute_agents(&self) -> Result<(), EngineError> {
        let want = &self.want;
        let required = want.requires();
        if required.is_empty() {
            return Ok(());
        }

        let mut resolved = Vec::new();
        for cap in &required {
            match self.registry.resolve(cap) {
                Some(agent) => resolved.push(agent),
                None => {
                    return Err(EngineError::resolve(format!("no provider for capability {cap}")))
                }
            }
        }
        resolved.sort_by_key(|a| self.registry.registration_index(&a.id).unwrap_or(usize::MAX));
        resolved.dedup_by(|a, b| a.id == b.id);

        want.state.begin_cycle();
        let mut outcome = Ok(());
        for agent in resolved {
            let AgentExec::Do(ref exec) = agent.exec else {
                // Poll/monitor providers satisfy the requirement but are
                // driven by their own tickers, not by the progress cycle.
                continue;
            };
            if let Err(e) = exec(want.cancel.child_token(), Arc::clone(want)).await {
                outcome = Err(EngineError::agent(format!("agent {}: {}", agent.id, e.message)));
                break;
            }
        }
        want.state.flush_all();
        outcome
    }

    /// Start a periodic poll/monitor agent on its own ticker. The task
    /// stops when the poll asks to, on cancellation, or at
    /// [`Want::stop_all_background_agents`].
    pub async fn add_monitoring_agent(&self, name: &str, interval: Duration, poll: PollFn) {
        let handle = spawn_poller(Arc::clone(&self.want), name.to_owned(), interval, poll);
        self.want.background.lock().await.push(handle);
    }

    /// Start a custom-lifecycle background agent.
    pub async fn start_background_agent(&self, name: &str, agent: Box<dyn BackgroundAgent>) {
        let handle = spawn_background(Arc::clone(&self.want), name.to_owned(), agent);
        self.want.background.lock().await.push(handle);
    }
}

/// Contract implemented by every concrete want behavior.
///
/// Object-safe for use as `Box<dyn Progressable>`. Locals live as ordinary
/// fields on the implementing struct. Recoverable failures should be
/// recorded via [`Want::record_phase_failure`] and return `Ok`; an `Err`
/// from `progress` marks the want failed without retry.
pub trait Progressable: Send + 'static {
    /// One-shot setup: validate parameters, seed state, declare initial
    /// requirements. An `Err` fails the want before it is ever scheduled.
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()>;

    /// Pure check over current state.
    fn is_achieved(&self, ctx: &WantCtx) -> bool;

    /// Advance exactly one step. Must not block except on bounded waits.
    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

    /// Cleanup on removal: stop background agents, release external
    /// resources. Runs exactly once.
    fn on_delete<'a>(&'a mut self, ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Optional completion estimate in `[0, 100]`.
    fn achieving_percentage(&self, _ctx: &WantCtx) -> Option<u8> {
        None
    }
}

/// A built graph node: the shared core plus its boxed behavior.
pub struct WantNode {
    pub ctx: WantCtx,
    pub behavior: Box<dyn Progressable>,
}

#[cfg(test)]
#[path = "want_tests.rs"]
mod tests;
