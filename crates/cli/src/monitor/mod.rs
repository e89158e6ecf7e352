// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Monitor: per-agent-type adapters that convert an agent binary's
//! native telemetry into the normalized [`AgentEvent`] stream the
//! Activity State Machine and Event Store consume.
//!
//! Three concrete variants rather than one configurable type, matching
//! the "one struct per shape" style used elsewhere in this crate:
//! [`NativeLogMonitor`] tails a JSONL session log via the Log Tailer,
//! [`HookTelemetryMonitor`] reads a local FIFO collector endpoint, and
//! [`noop::NoopMonitor`] is a true no-op for untelemetered binaries.

pub mod hook;
pub mod jsonl;
pub mod noop;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::AgentEvent;
use crate::log_tail::LogTailer;
use hook::HookReceiver;
use jsonl::JsonlParser;
use noop::NoopMonitor;

/// Agent binary kind, used to pick a `Monitor` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Codex,
    Gemini,
    Unknown,
}

/// Produces a normalized [`AgentEvent`] stream for one supervised agent.
pub trait Monitor: Send + 'static {
    fn run(
        self: Box<Self>,
        event_tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Tails the agent binary's native JSONL session log, feeds it through
/// [`JsonlParser`] and translates each record into an [`AgentEvent`] the
/// same way [`hook::HookReceiver`] translates its own FIFO shape.
/// Records that don't match a known native shape are silently skipped.
pub struct NativeLogMonitor {
    log_path: PathBuf,
    poll_interval: Duration,
}

impl NativeLogMonitor {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path, poll_interval: Duration::from_millis(200) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Monitor for NativeLogMonitor {
    fn run(
        self: Box<Self>,
        event_tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let tailer = LogTailer::new(self.log_path).with_poll_interval(self.poll_interval);
            let (line_tx, mut line_rx) = mpsc::channel(64);
            let tailer_cancel = cancel.clone();
            let tailer_task = tokio::spawn(tailer.run(line_tx, tailer_cancel));

            // `LogTailer` already splits whole lines (stripping the
            // trailing newline); re-append one so `JsonlParser`'s
            // line-buffering sees a complete record per feed.
            let mut parser = JsonlParser::new();
            while let Some(lines) = line_rx.recv().await {
                for line in lines {
                    for value in parser.feed(format!("{line}\n").as_bytes()) {
                        if let Some(event) = jsonl::translate(&value) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            let _ = tailer_task.await;
        })
    }
}

/// Reads hook-script JSON from a local FIFO, the OpenTelemetry-style
/// collector-endpoint variant.
pub struct HookTelemetryMonitor {
    receiver: HookReceiver,
}

impl HookTelemetryMonitor {
    pub fn new(receiver: HookReceiver) -> Self {
        Self { receiver }
    }
}

impl Monitor for HookTelemetryMonitor {
    fn run(
        mut self: Box<Self>,
        event_tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = self.receiver.next_event() => {
                        match event {
                            Some(event) => {
                                if event_tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                }
            }
        })
    }
}

impl Monitor for NoopMonitor {
    fn run(
        self: Box<Self>,
        _event_tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            cancel.cancelled().await;
        })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
