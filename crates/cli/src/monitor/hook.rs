// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local telemetry endpoint: a named pipe (FIFO) an agent's hook scripts
//! write JSON lines to, translated into normalized [`AgentEvent`]s. The
//! OpenTelemetry-style collector-endpoint variant from SPEC_FULL.md §4.4.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use serde::Deserialize;
use tokio::io::unix::AsyncFd;

use crate::event::AgentEvent;

struct FifoFd(OwnedFd);

impl AsRawFd for FifoFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for FifoFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

#[derive(Deserialize)]
struct RawHookLine {
    event: String,
    data: Option<serde_json::Value>,
}

/// Reads hook JSON lines from a named pipe and decodes them into
/// [`AgentEvent`]s.
pub struct HookReceiver {
    pipe_path: PathBuf,
    async_fd: Option<AsyncFd<FifoFd>>,
    line_buf: Vec<u8>,
}

impl HookReceiver {
    /// Create the named pipe at `pipe_path` with mode `0600`.
    pub fn new(pipe_path: &Path) -> anyhow::Result<Self> {
        nix::unistd::mkfifo(pipe_path, Mode::from_bits_truncate(0o600))?;
        Ok(Self { pipe_path: pipe_path.to_path_buf(), async_fd: None, line_buf: Vec::with_capacity(4096) })
    }

    pub fn pipe_path(&self) -> &Path {
        &self.pipe_path
    }

    /// Read the next hook event. Returns `None` on EOF or unrecoverable
    /// error; malformed or unrecognized lines are skipped.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.ensure_fd().ok()?;

        loop {
            if let Some(event) = self.try_parse_line() {
                return Some(event);
            }

            let afd = self.async_fd.as_ref()?;
            let mut guard = afd.readable().await.ok()?;
            let mut buf = [0u8; 4096];
            match guard.try_io(|inner| {
                nix::unistd::read(inner.get_ref(), &mut buf)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            }) {
                Ok(Ok(0)) => return None,
                Ok(Ok(n)) => self.line_buf.extend_from_slice(&buf[..n]),
                Ok(Err(_)) => return None,
                Err(_would_block) => continue,
            }
        }
    }

    fn try_parse_line(&mut self) -> Option<AgentEvent> {
        loop {
            let pos = self.line_buf.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if let Some(event) = parse_hook_line(line.trim()) {
                return Some(event);
            }
        }
    }

    fn ensure_fd(&mut self) -> anyhow::Result<()> {
        if self.async_fd.is_none() {
            let std_file =
                std::fs::OpenOptions::new().read(true).write(true).open(&self.pipe_path)?;
            crate::pty::nbio::set_nonblocking(&std_file)?;
            let owned: OwnedFd = std_file.into();
            self.async_fd = Some(AsyncFd::new(FifoFd(owned))?);
        }
        Ok(())
    }
}

impl Drop for HookReceiver {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.pipe_path);
    }
}

fn parse_hook_line(line: &str) -> Option<AgentEvent> {
    let raw: RawHookLine = serde_json::from_str(line).ok()?;
    let tool_name = |data: &Option<serde_json::Value>| -> String {
        data.as_ref()
            .and_then(|d| d.get("tool_name"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_owned()
    };
    Some(match raw.event.as_str() {
        "start" | "session_start" => AgentEvent::SessionStarted,
        "stop" | "session_end" => AgentEvent::SessionEnded,
        "user_prompt_submit" | "turn_start" => AgentEvent::TurnStarted,
        "pre_tool_use" => AgentEvent::ToolStarted { tool: tool_name(&raw.data) },
        "post_tool_use" => {
            AgentEvent::ToolCompleted { tool: tool_name(&raw.data), duration_ms: 0, success: true }
        }
        "notification" => {
            let data = raw.data?;
            let kind = data.get("notification_type").and_then(|v| v.as_str())?;
            if kind.contains("permission") {
                AgentEvent::ApprovalRequested { tool: tool_name(&Some(data)) }
            } else {
                return None;
            }
        }
        _ => return None,
    })
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
