// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the want engine.
#[derive(Debug, Clone, clap::Args)]
pub struct EngineConfig {
    /// Scheduler tick quantum in milliseconds.
    #[arg(long, default_value_t = 10, env = "WANT_TICK_MS")]
    pub tick_ms: u64,

    /// Default packet channel capacity for edges that do not override it.
    #[arg(long, default_value_t = 16, env = "WANT_CHANNEL_CAPACITY")]
    pub channel_capacity: usize,

    /// Retry attempts per want phase before the want fails.
    #[arg(long, default_value_t = 3, env = "WANT_MAX_PHASE_RETRIES")]
    pub max_phase_retries: u32,

    /// Grace budget in milliseconds for stopping background agents.
    #[arg(long, default_value_t = 1000, env = "WANT_STOP_GRACE_MS")]
    pub stop_grace_ms: u64,
}

impl EngineConfig {
    pub fn tick_quantum(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms)
    }

    pub fn stop_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { tick_ms: 10, channel_capacity: 16, max_phase_retries: 3, stop_grace_ms: 1000 }
    }
}
