// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-server queue simulation on the packets' virtual clock.
//!
//! Each inbound numbered packet is an arrival; the server holds it for
//! `service_time` virtual seconds and forwards it stamped with its
//! departure time. Wait time accrues whenever an arrival finds the
//! server busy.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;

use wantcore::packet::Packet;
use wantcore::want::{Progressable, WantCtx};

const DRAIN_WAIT: Duration = Duration::from_millis(10);

/// Parameters: `service_time` in virtual seconds (default 1.0, >= 0).
pub struct QueueWant {
    service_time: f64,
    server_free_at: f64,
    total_wait: f64,
    processed: u64,
    /// Forward rejected by a full downstream edge, retried next step.
    parked: Option<Packet>,
}

impl QueueWant {
    pub fn new() -> Self {
        Self {
            service_time: 1.0,
            server_free_at: 0.0,
            total_wait: 0.0,
            processed: 0,
            parked: None,
        }
    }

    fn average_wait(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_wait / self.processed as f64
        }
    }

    fn store_stats(&self, ctx: &WantCtx) {
        let mut changes = serde_json::Map::new();
        changes.insert("total_processed".into(), json!(self.processed));
        changes.insert("average_wait_time".into(), json!(self.average_wait()));
        ctx.want.state.store_multi(changes);
    }
}

impl Default for QueueWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for QueueWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        self.service_time = ctx.want.param_f64("service_time").unwrap_or(1.0);
        if self.service_time < 0.0 {
            anyhow::bail!("service_time must not be negative, got {}", self.service_time);
        }
        self.store_stats(ctx);
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_bool("received_done", false).0
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(packet) = self.parked.take() {
                if ctx.want.provide(packet.clone()).await.is_err() {
                    // Downstream is still full; resume next step.
                    self.parked = Some(packet);
                    return Ok(());
                }
            }

            let mut drained = 0;
            while let Some((_, packet)) = ctx.want.use_any(DRAIN_WAIT).await {
                if packet.is_end() {
                    self.store_stats(ctx);
                    ctx.want.state.store("received_done", json!(true));
                    // Any undelivered forward flushes before the sentinel;
                    // retirement retries while downstream is full.
                    let _ = ctx.want.provide_done().await;
                    return Ok(());
                }

                let arrival = packet.time().unwrap_or(self.server_free_at);
                let start = arrival.max(self.server_free_at);
                self.total_wait += start - arrival;
                self.server_free_at = start + self.service_time;
                self.processed += 1;
                drained += 1;

                let forward = match packet.num() {
                    Some(num) => Packet::numbered(num as i64, self.server_free_at),
                    None => packet,
                };
                if ctx.want.provide(forward.clone()).await.is_err() {
                    // Downstream full: park the forward and stop draining
                    // until the next step relieves backpressure.
                    self.parked = Some(forward);
                    break;
                }
            }
            if drained > 0 {
                self.store_stats(ctx);
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
