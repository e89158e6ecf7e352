// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data types shared across the monitor, state machine, queue, and
//! delivery engine: the normalized [`AgentEvent`] tagged union, [`Message`]
//! and its [`Priority`], and the [`AgentState`]/substate pair produced by
//! the state machine.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Delivery priority. Ordered `Interrupt > Normal > Idle` by `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Idle,
    Normal,
    Interrupt,
}

/// Delivery outcome of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Delivered,
    Failed,
}

/// A message waiting to be written into the PTY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub priority: Priority,
    pub body: String,
    /// Set once the body exceeds the inline threshold and has been
    /// persisted to `<h2-dir>/messages/<agent>/<id>.md`.
    pub file_path: Option<String>,
    pub status: MessageStatus,
    pub created_at_ms: u64,
    /// Bypasses the `[h2 message from: ...]` header and the
    /// blocked-on-permission gate; written as `body` + `\r` verbatim.
    pub raw: bool,
}

impl Message {
    pub fn new(from: impl Into<String>, body: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.into(),
            priority,
            body: body.into(),
            file_path: None,
            status: MessageStatus::Queued,
            created_at_ms: now_ms(),
            raw: false,
        }
    }

    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: String::new(),
            priority: Priority::Interrupt,
            body: body.into(),
            file_path: None,
            status: MessageStatus::Queued,
            created_at_ms: now_ms(),
            raw: true,
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Coarse activity state. `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    Idle,
    Exited,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Exited => "exited",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained activity label, valid only while `state == Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Substate {
    None,
    Thinking,
    ToolRunning,
    AwaitingApproval,
}

impl Substate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Thinking => "thinking",
            Self::ToolRunning => "tool_running",
            Self::AwaitingApproval => "awaiting_approval",
        }
    }
}

/// A state-machine transition broadcast to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub prev: AgentState,
    pub next: AgentState,
    pub substate: Substate,
    pub seq: u64,
    pub cause: String,
}

/// Exit status of the supervised child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Normalized event produced by an Agent Monitor variant.
///
/// Every variant carries a wall-clock timestamp; downstream consumers
/// (the Event Store, the state machine) never see the agent's native
/// telemetry shape, only this tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    SessionStarted,
    TurnStarted,
    TurnCompleted { input_tokens: u64, output_tokens: u64, cost_usd: Option<f64> },
    ToolStarted { tool: String },
    ToolCompleted { tool: String, duration_ms: u64, success: bool },
    ApprovalRequested { tool: String },
    AgentMessage { text: String },
    StateChange { state: AgentState, substate: Substate },
    SessionEnded,
}

impl AgentEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::TurnStarted => "turn_started",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::AgentMessage { .. } => "agent_message",
            Self::StateChange { .. } => "state_change",
            Self::SessionEnded => "session_ended",
        }
    }
}

/// On-disk envelope for one `events.jsonl` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub tag: String,
    pub timestamp: String,
    pub data: AgentEvent,
}

impl EventEnvelope {
    pub fn new(event: AgentEvent) -> Self {
        Self { tag: event.tag().to_owned(), timestamp: rfc3339_now(), data: event }
    }
}

/// Minimal RFC3339 UTC timestamp with no external date crate, matching the
/// precision (seconds) the teacher's own event envelopes use.
pub fn rfc3339_now() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    humantime_rfc3339(secs)
}

fn humantime_rfc3339(secs: u64) -> String {
    // Civil calendar conversion (Howard Hinnant's days-from-epoch algorithm).
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m_ = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m_ <= 2 { y + 1 } else { y };

    format!("{y:04}-{m_:02}-{d:02}T{h:02}:{m:02}:{s:02}Z")
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
