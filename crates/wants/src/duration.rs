// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable duration parsing for want parameters
//! ("1 second", "500ms", "2.5 minutes", or a bare number of seconds).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

// The pattern is a literal; a failure here is a programmer error.
#[allow(clippy::unwrap_used)]
fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?|m|mins?|minutes?|h|hours?)?\s*$")
            .unwrap()
    })
}

/// Parse a human duration string.
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let captures = pattern()
        .captures(input)
        .ok_or_else(|| anyhow::anyhow!("unparseable duration {input:?}"))?;
    let amount: f64 = captures
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| anyhow::anyhow!("unparseable duration amount in {input:?}"))?;

    let unit_secs = match captures.get(2).map(|m| m.as_str()) {
        Some("ms") | Some("millisecond") | Some("milliseconds") => 0.001,
        None | Some("s") | Some("sec") | Some("secs") | Some("second") | Some("seconds") => 1.0,
        Some("m") | Some("min") | Some("mins") | Some("minute") | Some("minutes") => 60.0,
        Some("h") | Some("hour") | Some("hours") => 3600.0,
        Some(other) => anyhow::bail!("unknown duration unit {other:?}"),
    };
    Ok(Duration::from_secs_f64(amount * unit_secs))
}

/// Parse a duration parameter value: a string in any supported form, or a
/// bare number of seconds.
pub fn duration_value(value: &Value) -> anyhow::Result<Duration> {
    match value {
        Value::String(s) => parse_duration(s),
        Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| anyhow::anyhow!("duration out of range"))?;
            if secs < 0.0 {
                anyhow::bail!("negative duration");
            }
            Ok(Duration::from_secs_f64(secs))
        }
        other => anyhow::bail!("expected duration string or number, got {other}"),
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
