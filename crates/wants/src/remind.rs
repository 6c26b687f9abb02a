// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reminder want: fires ahead of an event time, optionally demanding a
//! reaction before a deadline.
//!
//! Phases: `waiting` until the reminder fires, then `done` directly, or
//! `reaching` while a required reaction is pending. An unanswered
//! reaction times out into `failed` with `timeout = true`. A reaction is
//! any write to the `reaction` state key, typically from a cooperating
//! want or an operator.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;

use wantcore::error::EngineError;
use wantcore::want::{Progressable, WantCtx};

const NOTIFY_PHASE: &str = "notify";

/// Parameters: `event_time` (RFC 3339, required), `ahead` (duration before
/// the event, default 0), `require_reaction` (default false), `timeout`
/// (reaction deadline after the reminder fires, default 60 s).
pub struct RemindWant {
    remind_at: DateTime<Utc>,
    reaction_deadline: DateTime<Utc>,
    require_reaction: bool,
    fired: bool,
}

impl RemindWant {
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::default();
        Self { remind_at: epoch, reaction_deadline: epoch, require_reaction: false, fired: false }
    }
}

impl Default for RemindWant {
    fn default() -> Self {
        Self::new()
    }
}

impl Progressable for RemindWant {
    fn initialize(&mut self, ctx: &WantCtx) -> anyhow::Result<()> {
        let event_time = ctx
            .want
            .param_str("event_time")
            .ok_or_else(|| anyhow::anyhow!("missing required parameter event_time"))?;
        let event_time = DateTime::parse_from_rfc3339(event_time)
            .map_err(|e| anyhow::anyhow!("event_time is not RFC 3339: {e}"))?
            .with_timezone(&Utc);

        let ahead = match ctx.want.param("ahead") {
            Some(value) => crate::duration::duration_value(value)?,
            None => std::time::Duration::ZERO,
        };
        let timeout = match ctx.want.param("timeout") {
            Some(value) => crate::duration::duration_value(value)?,
            None => std::time::Duration::from_secs(60),
        };

        self.remind_at = event_time
            - ChronoDuration::from_std(ahead).map_err(|e| anyhow::anyhow!("ahead out of range: {e}"))?;
        self.reaction_deadline = self.remind_at
            + ChronoDuration::from_std(timeout)
                .map_err(|e| anyhow::anyhow!("timeout out of range: {e}"))?;
        self.require_reaction = ctx.want.param_bool("require_reaction").unwrap_or(false);

        ctx.want.state.store("phase", json!("waiting"));
        Ok(())
    }

    fn is_achieved(&self, ctx: &WantCtx) -> bool {
        ctx.want.state.get_string("phase", "").0 == "done"
    }

    fn progress<'a>(
        &'a mut self,
        ctx: &'a WantCtx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let now = Utc::now();

            if !self.fired {
                if now < self.remind_at {
                    return Ok(());
                }
                self.fired = true;

                // Deliver the reminder through whatever capabilities the
                // node requires (none is fine: the state record is the
                // reminder).
                if let Err(e) = ctx.execute_agents().await {
                    ctx.want.record_phase_failure(NOTIFY_PHASE, e);
                    self.fired = false;
                    return Ok(());
                }
                ctx.want.record_phase_success(NOTIFY_PHASE);

                let mut changes = serde_json::Map::new();
                changes.insert("reminded".into(), json!(true));
                changes.insert("reminded_at".into(), json!(now.to_rfc3339()));
                changes.insert(
                    "phase".into(),
                    json!(if self.require_reaction { "reaching" } else { "done" }),
                );
                ctx.want.state.store_multi(changes);
                return Ok(());
            }

            if !self.require_reaction {
                return Ok(());
            }

            if ctx.want.state.contains_key("reaction") {
                ctx.want.state.store("phase", json!("done"));
                return Ok(());
            }

            if now >= self.reaction_deadline {
                let mut changes = serde_json::Map::new();
                changes.insert("timeout".into(), json!(true));
                changes.insert("phase".into(), json!("failed"));
                ctx.want.state.store_multi(changes);
                ctx.want.fail(&EngineError::timeout("no reaction before the deadline"));
            }
            Ok(())
        })
    }

    fn on_delete<'a>(&'a mut self, _ctx: &'a WantCtx) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

#[cfg(test)]
#[path = "remind_tests.rs"]
mod tests;
