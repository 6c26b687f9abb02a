// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal collector: counts inbound packets until end-of-stream.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;

use wantcore::want::{Progressable, WantCtx};

const DRAIN_WAIT: Duration = Duration::from_millis(10);

pub struct SinkWant {
    processed: u64,
}

impl SinkWant {
    pub fn new() -> Self {
        Self { processed: 0 }
    }
}

impl Default for SinkWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for SinkWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        ctx.want.state.store("total_processed", json!(0));
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
            let mut drained = 0;
            while let Some((_, packet)) = ctx.want.use_any(DRAIN_WAIT).await {
                if packet.is_end() {
                    ctx.want.state.store("total_processed", json!(self.processed));
                    ctx.want.state.store("received_done", json!(true));
                    // Retirement retries while downstream is full.
                    let _ = ctx.want.provide_done().await;
                    return Ok(());
                }
                self.processed += 1;
                drained += 1;
            }
            if drained > 0 {
                ctx.want.state.store("total_processed", json!(self.processed));
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}
