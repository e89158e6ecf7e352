// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental line-buffered parser for newline-delimited JSON, plus the
//! native→[`AgentEvent`] translation for agent binaries' own session
//! transcripts (the `NativeLogMonitor` variant — see `hook.rs` for the
//! analogous translation on the FIFO-telemetry variant).

use crate::event::AgentEvent;

/// Buffers partial lines across `feed()` calls and yields one
/// [`serde_json::Value`] per well-formed complete line. Malformed lines
/// are silently dropped.
#[derive(Debug, Default)]
pub struct JsonlParser {
    line_buf: Vec<u8>,
}

impl JsonlParser {
    pub fn new() -> Self {
        Self { line_buf: Vec::with_capacity(4096) }
    }

    /// Feed new bytes and return every complete, well-formed JSON value
    /// found so far. Any trailing partial line is retained for the next
    /// call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<serde_json::Value> {
        self.line_buf.extend_from_slice(data);

        let mut results = Vec::new();
        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(line) {
                results.push(value);
            }
        }
        results
    }
}

/// Translate one record of an agent binary's native session transcript
/// into a normalized [`AgentEvent`], mirroring the shape Claude Code and
/// similar CLIs write: a top-level `type` tag (`system`, `user`,
/// `assistant`, `tool_result`, `result`, ...) with a nested `message`
/// whose `content` is an array of typed blocks. Records that don't match
/// a known shape are dropped; translating every agent binary's exact
/// wire format is out of scope.
pub fn translate(value: &serde_json::Value) -> Option<AgentEvent> {
    match value.get("type").and_then(|v| v.as_str())? {
        "system" if value.get("subtype").and_then(|v| v.as_str()) == Some("init") => {
            Some(AgentEvent::SessionStarted)
        }
        "user" => Some(AgentEvent::TurnStarted),
        "assistant" => translate_assistant(value),
        "control_request" if value.get("subtype").and_then(|v| v.as_str()) == Some("can_use_tool") => {
            let tool = value.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
            Some(AgentEvent::ApprovalRequested { tool })
        }
        "tool_result" => {
            let tool = value.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
            let success = !value.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
            Some(AgentEvent::ToolCompleted { tool, duration_ms: 0, success })
        }
        "result" => {
            let usage = value.get("usage");
            let input_tokens =
                usage.and_then(|u| u.get("input_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
            let output_tokens =
                usage.and_then(|u| u.get("output_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
            let cost_usd = value.get("total_cost_usd").and_then(|v| v.as_f64());
            Some(AgentEvent::TurnCompleted { input_tokens, output_tokens, cost_usd })
        }
        _ => None,
    }
}

/// An `assistant` record's `message.content` is an array of typed
/// blocks; the first recognized block wins (a single message rarely
/// mixes a tool call with prose in the same record).
fn translate_assistant(value: &serde_json::Value) -> Option<AgentEvent> {
    let content = value.get("message")?.get("content")?.as_array()?;
    for block in content {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("tool_use") => {
                let tool = block.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
                return Some(AgentEvent::ToolStarted { tool });
            }
            Some("text") => {
                let text = block.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
                return Some(AgentEvent::AgentMessage { text });
            }
            _ => continue,
        }
    }
    None
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
