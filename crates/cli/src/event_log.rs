// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event log for normalized [`AgentEvent`]s.
//!
//! Events are appended as one JSON object per line in `events.jsonl` inside
//! the session directory. `append` is best-effort: a single `write_all` call,
//! no fsync. `read` decodes every line and silently skips malformed ones.
//! `tail` opens a second handle, seeks to the current end, and polls for
//! newly appended bytes, buffering a trailing partial line across polls.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::{AgentEvent, EventEnvelope};

const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Open (creating if absent) `events.jsonl` under `session_dir`.
    ///
    /// `session_dir` is created with mode `0755` if missing; the file is
    /// created with mode `0644`.
    pub fn open(session_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(session_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(session_dir, std::fs::Permissions::from_mode(0o755))?;
        }
        let path = session_dir.join("events.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        Ok(Self { path })
    }

    /// Append one event. Best-effort: failures are swallowed by the caller's
    /// discretion (this returns `Result` so callers may log at `warn`).
    pub fn append(&self, event: AgentEvent) -> anyhow::Result<()> {
        let envelope = EventEnvelope::new(event);
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every well-formed event in file order. Malformed lines are
    /// silently skipped.
    pub fn read(&self) -> anyhow::Result<Vec<EventEnvelope>> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(contents.lines().filter_map(|line| serde_json::from_str(line).ok()).collect())
    }

    /// Spawn a poll-based tailer that follows new lines appended after the
    /// point this is called, forwarding decoded events to the returned
    /// channel until `cancel` fires.
    pub fn tail(&self, cancel: CancellationToken) -> mpsc::Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel(64);
        let path = self.path.clone();
        tokio::spawn(async move {
            let mut file = match std::fs::File::open(&path) {
                Ok(f) => f,
                Err(_) => return,
            };
            if file.seek(SeekFrom::End(0)).is_err() {
                return;
            }
            let mut partial = Vec::new();
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                let mut chunk = Vec::new();
                if file.read_to_end(&mut chunk).is_err() {
                    return;
                }
                if !chunk.is_empty() {
                    partial.extend_from_slice(&chunk);
                    while let Some(pos) = partial.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = partial.drain(..=pos).collect();
                        let line = &line[..line.len() - 1];
                        if let Ok(envelope) = serde_json::from_slice::<EventEnvelope>(line) {
                            if tx.send(envelope).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(TAIL_POLL_INTERVAL) => {}
                }
            }
        });
        rx
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
