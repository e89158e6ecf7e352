// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure-poll tailer for an agent's native JSONL session log. No
//! filesystem-event fast path: the Monitor's poll interval is the only
//! latency bound, which keeps this independent of platform inotify
//! quirks and lets it run unprivileged inside containers.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
}

impl LogTailer {
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0, poll_interval: Duration::from_millis(200) }
    }

    /// Start reading from a specific byte offset, for resumed sessions.
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self { path, offset, poll_interval: Duration::from_millis(200) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whole lines appended since the last read. A trailing partial
    /// line (no `\n` yet) is left unconsumed for the next call.
    pub fn read_new_lines(&mut self) -> anyhow::Result<Vec<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        // A shorter file than our tracked offset means the log was
        // truncated (e.g. a `/clear`); restart from the top.
        if let Ok(meta) = file.metadata() {
            if meta.len() < self.offset {
                self.offset = 0;
            }
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset))?;

        let mut lines = Vec::new();
        let mut line = String::new();
        let mut consumed = 0u64;
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            if !line.ends_with('\n') {
                // Partial line at EOF: don't advance past it.
                break;
            }
            consumed += bytes_read as u64;
            let trimmed = line.trim_end();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        self.offset += consumed;

        Ok(lines)
    }

    /// Poll until `shutdown` fires, sending batches of new lines.
    pub async fn run(mut self, line_tx: mpsc::Sender<Vec<String>>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }
            match self.read_new_lines() {
                Ok(lines) if !lines.is_empty() => {
                    if line_tx.send(lines).await.is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "log_tail_tests.rs"]
mod tests;
