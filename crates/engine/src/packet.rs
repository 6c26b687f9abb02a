// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value flowing between wants: domain data or the end-of-stream marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Packet {
    Data { payload: Value },
    Done,
}

impl Packet {
    pub fn data(payload: impl Into<Value>) -> Self {
        Self::Data { payload: payload.into() }
    }

    /// A numbered packet carrying a sequence index and a virtual timestamp
    /// in seconds, the shape the queue-simulation wants exchange.
    pub fn numbered(num: i64, time: f64) -> Self {
        Self::Data { payload: serde_json::json!({ "num": num, "time": time }) }
    }

    /// Whether this packet terminates its stream. `Done` always does; a
    /// data packet does when its number is negative.
    pub fn is_end(&self) -> bool {
        match self {
            Self::Done => true,
            Self::Data { payload } => packet_num(payload).is_some_and(|n| n < 0.0),
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Data { payload } => Some(payload),
            Self::Done => None,
        }
    }

    /// Sequence number of a numbered packet, if present.
    pub fn num(&self) -> Option<f64> {
        self.payload().and_then(packet_num)
    }

    /// Virtual timestamp of a numbered packet, if present.
    pub fn time(&self) -> Option<f64> {
        match self {
            Self::Data { payload } => payload.get("time").and_then(Value::as_f64),
            Self::Done => None,
        }
    }
}

/// Extract the number from a packet payload: either a bare number or the
/// `num` field of a numbered object.
fn packet_num(payload: &Value) -> Option<f64> {
    match payload {
        Value::Number(n) => n.as_f64(),
        Value::Object(obj) => obj.get("num").and_then(Value::as_f64),
        _ => None,
    }
}

#[cfg(test)]
#[path = "packet_tests.rs"]
mod tests;
