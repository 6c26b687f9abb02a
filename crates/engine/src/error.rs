// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified failure kinds shared across the scheduler, agent runtime, and
/// want implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid parameter at initialize.
    Config,
    /// A required capability has no registered provider.
    Resolve,
    /// A do-agent returned an error during a progress cycle.
    Agent,
    /// A poll agent returned a non-stop error.
    Poll,
    /// A channel closed while data was still expected.
    Comm,
    /// A bounded wait elapsed.
    Timeout,
    /// Panic or unrecoverable invariant break.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Resolve => "RESOLVE_ERROR",
            Self::Agent => "AGENT_ERROR",
            Self::Poll => "POLL_ERROR",
            Self::Comm => "COMM_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Fatal => "FATAL_ERROR",
        }
    }

    /// Whether a failure of this kind is charged against the current phase's
    /// retry budget.
    pub fn counts_as_phase_failure(&self) -> bool {
        matches!(self, Self::Resolve | Self::Agent | Self::Comm | Self::Timeout)
    }

    /// Whether a failure of this kind fails the want immediately, bypassing
    /// retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Config | Self::Fatal)
    }

    /// Whether a failure of this kind is only logged and never escalated.
    pub fn is_logged_only(&self) -> bool {
        matches!(self, Self::Poll)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An engine failure with its classification, as surfaced through want
/// state and scheduler summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn resolve(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolve, message)
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Agent, message)
    }

    pub fn poll(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Poll, message)
    }

    pub fn comm(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Comm, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
