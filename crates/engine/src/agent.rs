// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background agent execution: periodic pollers and custom-lifecycle
//! workers, one task per agent instance.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::registry::PollFn;
use crate::want::Want;

/// Long-lived worker with a custom lifecycle, owned by a want.
///
/// Object-safe for use as `Box<dyn BackgroundAgent>`. The body must watch
/// `cancel`; stopping an agent cancels the token and joins the task.
pub trait BackgroundAgent: Send + 'static {
    fn run(
        self: Box<Self>,
        want: Arc<Want>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
}

/// Handle to a running background agent task.
pub struct BackgroundHandle {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the agent and wait up to `grace` for it to finish; abort
    /// after the deadline.
    pub async fn stop(mut self, grace: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            warn!(agent = %self.name, "background agent did not stop within grace, aborting");
            self.handle.abort();
        }
    }
}

/// Spawn a ticker task for a poll/monitor agent.
///
/// Each tick is bracketed by a write epoch: `begin_cycle`, the poll body,
/// then `dump_for_agent`, so concurrent ticks of different agents on the
/// same want never lose each other's writes.
pub fn spawn_poller(
    want: Arc<Want>,
    name: String,
    interval: Duration,
    poll: PollFn,
) -> BackgroundHandle {
    let cancel = want.cancel.child_token();
    let token = cancel.clone();
    let agent = name.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            want.state.begin_cycle();
            let (should_stop, result) = poll(token.clone(), Arc::clone(&want)).await;
            want.state.dump_for_agent(&agent);

            if let Err(e) = result {
                // Poll errors never terminate the ticker on their own.
                warn!(want = %want.meta.id, agent = %agent, "poll tick failed: {}", e.message);
            }
            if should_stop {
                break;
            }
        }
    });

    BackgroundHandle { name, cancel, handle }
}

/// Spawn a custom-lifecycle background agent.
pub fn spawn_background(
    want: Arc<Want>,
    name: String,
    agent: Box<dyn BackgroundAgent>,
) -> BackgroundHandle {
    let cancel = want.cancel.child_token();
    let token = cancel.clone();
    let agent_name = name.clone();
    let want_id = want.meta.id.clone();

    let handle = tokio::spawn(async move {
        if let Err(e) = agent.run(want, token).await {
            warn!(want = %want_id, agent = %agent_name, "background agent exited with error: {e:#}");
        }
    });

    BackgroundHandle { name, cancel, handle }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
