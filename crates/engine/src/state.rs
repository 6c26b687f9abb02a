// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-want keyed state with write attribution.
//!
//! Two write paths exist: direct writes commit immediately and are
//! attributed to the owning want; agent-scoped writes accumulate in a
//! per-agent buffer and only land when the agent's progress cycle closes,
//! attributed to that agent. Buffers merge atomically, so two agents
//! writing concurrently never lose each other's updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who committed a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Writer {
    /// The want itself, through a direct store call.
    Owner,
    /// A named agent, through a buffered dump.
    Agent(String),
}

/// One committed write batch: the diff it applied and who applied it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub writer: Writer,
    pub changes: Map<String, Value>,
    /// Write epoch the batch landed in.
    pub epoch: u64,
    pub at_ms: u64,
}

#[derive(Default)]
struct Inner {
    public: HashMap<String, Value>,
    history: Vec<HistoryEntry>,
    /// Per-agent buffered writes, in agent registration order. Flush order
    /// at cycle close follows this order, so the last-registered agent wins
    /// deterministically on a same-key collision.
    buffers: IndexMap<String, Map<String, Value>>,
    epoch: u64,
}

/// Keyed value store owned by a single want.
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<Inner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- reads --------------------------------------------------------------

    /// Read a value by key. Returns a clone; the store cannot be mutated
    /// through the return value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().public.get(key).cloned()
    }

    /// Bulk read. Missing keys are absent from the result.
    pub fn get_many(&self, keys: &[&str]) -> HashMap<String, Value> {
        let inner = self.inner.lock();
        keys.iter()
            .filter_map(|k| inner.public.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect()
    }

    /// Read a string key, or the default when missing or not a string.
    pub fn get_string(&self, key: &str, default: &str) -> (String, bool) {
        match self.get(key) {
            Some(Value::String(s)) => (s, true),
            _ => (default.to_owned(), false),
        }
    }

    /// Read an integer key. A float value truncates toward zero.
    pub fn get_int(&self, key: &str, default: i64) -> (i64, bool) {
        match self.get(key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    (i, true)
                } else if let Some(f) = n.as_f64() {
                    (f as i64, true)
                } else {
                    (default, false)
                }
            }
            _ => (default, false),
        }
    }

    /// Read a float key. An integer value widens.
    pub fn get_float(&self, key: &str, default: f64) -> (f64, bool) {
        match self.get(key) {
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) => (f, true),
                None => (default, false),
            },
            _ => (default, false),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> (bool, bool) {
        match self.get(key) {
            Some(Value::Bool(b)) => (b, true),
            _ => (default, false),
        }
    }

    /// Read a time key. Strings parse as RFC 3339; numbers are epoch
    /// seconds. Parse failure returns the default with `ok = false`.
    pub fn get_time(&self, key: &str, default: DateTime<Utc>) -> (DateTime<Utc>, bool) {
        match self.get(key) {
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(&s) {
                Ok(t) => (t.with_timezone(&Utc), true),
                Err(_) => (default, false),
            },
            Some(Value::Number(n)) => {
                let secs = match n.as_f64() {
                    Some(f) => f,
                    None => return (default, false),
                };
                match DateTime::from_timestamp_millis((secs * 1000.0) as i64) {
                    Some(t) => (t, true),
                    None => (default, false),
                }
            }
            _ => (default, false),
        }
    }

    /// Full copy of the public map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.lock().public.clone()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().public.contains_key(key)
    }

    // -- direct writes ------------------------------------------------------

    /// Commit one key immediately. Appends exactly one owner-attributed
    /// history entry.
    pub fn store(&self, key: &str, value: impl Into<Value>) {
        let mut changes = Map::new();
        changes.insert(key.to_owned(), value.into());
        self.store_multi(changes);
    }

    /// Commit a batch of keys immediately, as one history entry.
    pub fn store_multi(&self, changes: Map<String, Value>) {
        let mut inner = self.inner.lock();
        for (k, v) in &changes {
            inner.public.insert(k.clone(), v.clone());
        }
        let epoch = inner.epoch;
        inner.history.push(HistoryEntry { writer: Writer::Owner, changes, epoch, at_ms: epoch_ms() });
    }

    // -- agent-scoped writes ------------------------------------------------

    /// Buffer one key for `agent`. Nothing lands in the public map and no
    /// history is written until the buffer is dumped.
    pub fn store_for_agent(&self, agent: &str, key: &str, value: impl Into<Value>) {
        let mut inner = self.inner.lock();
        inner.buffers.entry(agent.to_owned()).or_default().insert(key.to_owned(), value.into());
    }

    /// Buffer a batch of keys for `agent`.
    pub fn store_multi_for_agent(&self, agent: &str, changes: Map<String, Value>) {
        let mut inner = self.inner.lock();
        inner.buffers.entry(agent.to_owned()).or_default().extend(changes);
    }

    /// Open a new write epoch.
    pub fn begin_cycle(&self) {
        self.inner.lock().epoch += 1;
    }

    /// Atomically merge `agent`'s buffer into the public map, emitting one
    /// history entry attributed to the agent. A no-op when the agent has
    /// nothing buffered. Returns the number of keys merged.
    pub fn dump_for_agent(&self, agent: &str) -> usize {
        let mut inner = self.inner.lock();
        let Some(changes) = inner.buffers.shift_remove(agent) else {
            return 0;
        };
        if changes.is_empty() {
            return 0;
        }
        let merged = changes.len();
        for (k, v) in &changes {
            inner.public.insert(k.clone(), v.clone());
        }
        let epoch = inner.epoch;
        inner.history.push(HistoryEntry {
            writer: Writer::Agent(agent.to_owned()),
            changes,
            epoch,
            at_ms: epoch_ms(),
        });
        merged
    }

    /// Flush every outstanding buffer in agent registration order, one
    /// history entry per agent. Called when a progress cycle closes.
    pub fn flush_all(&self) {
        let agents: Vec<String> = {
            let inner = self.inner.lock();
            inner.buffers.keys().cloned().collect()
        };
        for agent in agents {
            self.dump_for_agent(&agent);
        }
    }

    // -- history ------------------------------------------------------------

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.lock().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
