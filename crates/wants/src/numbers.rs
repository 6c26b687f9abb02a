// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Packet source: emits a configured count of numbered packets on a
//! virtual clock, then one end-of-stream sentinel.

use std::future::Future;
use std::pin::Pin;

use rand::Rng;
use serde_json::json;

use wantcore::packet::Packet;
use wantcore::want::{Progressable, WantCtx};

/// Parameters: `count` (required, > 0), `rate` in packets per virtual
/// second (default 1.0), `deterministic` (default false; when false,
/// inter-arrival spacing is exponentially distributed around `1/rate`).
pub struct NumbersWant {
    count: i64,
    rate: f64,
    deterministic: bool,
    sent: i64,
    clock: f64,
    /// Packet rejected by a full downstream edge, retried next step.
    parked: Option<Packet>,
}

impl NumbersWant {
    pub fn new() -> Self {
        Self { count: 0, rate: 1.0, deterministic: false, sent: 0, clock: 0.0, parked: None }
    }

    fn next_spacing(&self) -> f64 {
        let mean = 1.0 / self.rate;
        if self.deterministic {
            mean
        } else {
            let u: f64 = rand::rng().random();
            -mean * (1.0 - u).ln()
        }
    }
}

impl Default for NumbersWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for NumbersWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        self.count = ctx
            .want
            .param_i64("count")
            .ok_or_else(|| anyhow::anyhow!("missing required parameter count"))?;
        if self.count <= 0 {
            anyhow::bail!("count must be positive, got {}", self.count);
        }
        self.rate = ctx.want.param_f64("rate").unwrap_or(1.0);
        if self.rate <= 0.0 {
            anyhow::bail!("rate must be positive, got {}", self.rate);
        }
        self.deterministic = ctx.want.param_bool("deterministic").unwrap_or(false);
        ctx.want.state.store("total_sent", json!(0));
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_bool("completed", false).0
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(packet) = self.parked.take() {
                if ctx.want.provide(packet.clone()).await.is_err() {
                    // Downstream is still full; try again next step.
                    self.parked = Some(packet);
                    return Ok(());
                }
                self.sent += 1;
                ctx.want.state.store("total_sent", json!(self.sent));
                return Ok(());
            }

            if self.sent >= self.count {
                if ctx.want.provide_done().await.is_err() {
                    return Ok(());
                }
                ctx.want.state.store("completed", json!(true));
                return Ok(());
            }

            self.clock += self.next_spacing();
            let packet = Packet::numbered(self.sent, self.clock);
            if ctx.want.provide(packet.clone()).await.is_err() {
                self.parked = Some(packet);
                return Ok(());
            }
            self.sent += 1;
            ctx.want.state.store("total_sent", json!(self.sent));
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }

    fn achieving_percentage(&self, _ctx: &WantCtx) -> Option<u8> {
        if self.count <= 0 {
            return None;
        }
        Some(((self.sent * 100) / self.count).clamp(0, 100) as u8)
    }
}

#[cfg(test)]
#[path = "numbers_tests.rs"]
mod tests;
