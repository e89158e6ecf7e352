// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery engine: drains the [`MessageQueue`] against the
//! [`ActivityState`] gate and writes formatted payloads into the PTY.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::{AgentState, Message, MessageStatus, Priority};
use crate::pty::BackendInput;
use crate::queue::MessageQueue;
use crate::state::ActivityState;

const CTRL_C: u8 = 0x03;
const INTERRUPT_RETRIES: u32 = 3;
const INTERRUPT_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs the drain loop until `cancel` fires. In-flight writes are
/// allowed to complete; nothing still `Queued` is redelivered.
pub struct DeliveryEngine {
    queue: Arc<MessageQueue>,
    state: Arc<ActivityState>,
    input_tx: mpsc::Sender<BackendInput>,
}

impl DeliveryEngine {
    pub fn new(
        queue: Arc<MessageQueue>,
        state: Arc<ActivityState>,
        input_tx: mpsc::Sender<BackendInput>,
    ) -> Self {
        Self { queue, state, input_tx }
    }

    /// Drive delivery until cancelled. `enqueued` is notified once per
    /// successful `enqueue` call; `state_changed` is the activity watch.
    pub async fn run(&self, cancel: CancellationToken, enqueued: Arc<tokio::sync::Notify>) {
        let mut state_changed = self.state.state_changed();
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let idle = self.state.is_idle() && !self.state.blocked_on_permission();
            let Some(mut msg) = self.queue.dequeue(idle) else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = enqueued.notified() => {}
                    changed = state_changed.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
                continue;
            };

            if msg.priority == Priority::Interrupt && !msg.raw {
                self.send_interrupt(&cancel).await;
            }

            let payload = format_payload(&msg);
            if self.input_tx.send(BackendInput::Write(payload.into())).await.is_err() {
                msg.status = MessageStatus::Failed;
                return;
            }
            msg.status = MessageStatus::Delivered;
        }
    }

    async fn send_interrupt(&self, cancel: &CancellationToken) {
        self.state.signal_interrupt();
        for _ in 0..INTERRUPT_RETRIES {
            if self.input_tx.send(BackendInput::Write(vec![CTRL_C].into())).await.is_err() {
                return;
            }
            let reached =
                self.state.wait_for_state(AgentState::Idle, cancel.clone());
            match tokio::time::timeout(INTERRUPT_IDLE_TIMEOUT, reached).await {
                Ok(true) => return,
                _ => continue,
            }
        }
    }
}

/// Format a message's wire payload per the header/raw/reference rules.
fn format_payload(msg: &Message) -> Vec<u8> {
    if msg.raw {
        let mut out = msg.body.clone().into_bytes();
        out.push(b'\r');
        return out;
    }

    let header = match msg.priority {
        Priority::Interrupt => format!("[URGENT h2 message from: {}] ", msg.from),
        _ => format!("[h2 message from: {}] ", msg.from),
    };

    let body = match &msg.file_path {
        Some(path) => format!("Read {path}"),
        None => msg.body.clone(),
    };

    let mut out = header.into_bytes();
    out.extend_from_slice(body.as_bytes());
    out.push(b'\r');
    out
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
