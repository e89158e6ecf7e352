// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity state machine: turns raw PTY output timing and normalized
//! [`AgentEvent`]s into the `{Active, Idle, Exited}` + substate pair
//! observers watch for idle/blocked delivery gating.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::event::{AgentEvent, AgentState, Substate, TransitionEvent};

/// A point-in-time view of the state machine, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub state: AgentState,
    pub substate: Substate,
    pub seq: u64,
    pub blocked_on_permission: bool,
    pub last_tool_name: Option<String>,
    pub tool_use_count: u64,
}

struct Inner {
    state: AgentState,
    substate: Substate,
    seq: u64,
    last_output: Instant,
    blocked_on_permission: bool,
    last_tool_name: Option<String>,
    tool_use_count: u64,
    /// Set by `signal_interrupt` and consumed by the next transition out
    /// of `note_output`, so that transition is tagged with its cause.
    interrupt_pending: bool,
}

impl Inner {
    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state: self.state,
            substate: self.substate,
            seq: self.seq,
            blocked_on_permission: self.blocked_on_permission,
            last_tool_name: self.last_tool_name.clone(),
            tool_use_count: self.tool_use_count,
        }
    }
}

/// Drives the `{Active, Idle, Exited}` + substate transitions for one
/// supervised agent.
pub struct ActivityState {
    idle_threshold: Duration,
    inner: Mutex<Inner>,
    tx: tokio::sync::watch::Sender<StateSnapshot>,
    transition_tx: tokio::sync::watch::Sender<TransitionEvent>,
}

impl ActivityState {
    pub fn new(idle_threshold: Duration) -> Self {
        let initial = StateSnapshot {
            state: AgentState::Active,
            substate: Substate::None,
            seq: 0,
            blocked_on_permission: false,
            last_tool_name: None,
            tool_use_count: 0,
        };
        let (tx, _rx) = tokio::sync::watch::channel(initial);
        let (transition_tx, _rx) = tokio::sync::watch::channel(TransitionEvent {
            prev: AgentState::Active,
            next: AgentState::Active,
            substate: Substate::None,
            seq: 0,
            cause: "init".to_owned(),
        });
        Self {
            idle_threshold,
            inner: Mutex::new(Inner {
                state: AgentState::Active,
                substate: Substate::None,
                seq: 0,
                last_output: Instant::now(),
                blocked_on_permission: false,
                last_tool_name: None,
                tool_use_count: 0,
                interrupt_pending: false,
            }),
            tx,
            transition_tx,
        }
    }

    /// Record that an interrupt was just delivered to the child, so the
    /// next transition out of `note_output` is tagged with its cause
    /// instead of the generic "output" cause.
    pub fn signal_interrupt(&self) {
        self.inner.lock().interrupt_pending = true;
    }

    /// Called from the PTY reader after every output chunk: any output
    /// while not `Exited` resets the idle clock and re-enters `Active`.
    pub fn note_output(&self) {
        let mut inner = self.inner.lock();
        inner.last_output = Instant::now();
        if inner.state == AgentState::Exited {
            return;
        }
        if inner.state != AgentState::Active {
            let prev = inner.state;
            inner.state = AgentState::Active;
            inner.seq += 1;
            let cause = if std::mem::take(&mut inner.interrupt_pending) { "interrupt" } else { "output" };
            self.publish(&inner, prev, cause);
        } else {
            inner.interrupt_pending = false;
        }
    }

    /// Terminal: the child process has exited.
    pub fn note_exit(&self) {
        let mut inner = self.inner.lock();
        let prev = inner.state;
        inner.state = AgentState::Exited;
        inner.substate = Substate::None;
        inner.seq += 1;
        self.publish(&inner, prev, "exit");
    }

    /// Apply a normalized monitor event to the blocked/substate fields.
    pub fn apply_event(&self, event: &AgentEvent) {
        let mut inner = self.inner.lock();
        if inner.state == AgentState::Exited {
            return;
        }
        match event {
            AgentEvent::ApprovalRequested { tool } => {
                inner.blocked_on_permission = true;
                inner.last_tool_name = Some(tool.clone());
                inner.substate = Substate::AwaitingApproval;
            }
            AgentEvent::ToolStarted { tool } => {
                inner.last_tool_name = Some(tool.clone());
                inner.tool_use_count += 1;
                inner.substate = Substate::ToolRunning;
            }
            AgentEvent::ToolCompleted { .. } => {
                inner.blocked_on_permission = false;
                inner.substate = Substate::None;
            }
            AgentEvent::AgentMessage { .. } => {
                inner.blocked_on_permission = false;
            }
            AgentEvent::StateChange { substate, .. } => {
                inner.substate = *substate;
            }
            _ => return,
        }
        inner.seq += 1;
        let _ = self.tx.send(inner.snapshot());
    }

    /// Idle threshold has been reached with no output since the last
    /// check; no-op if output has arrived in the meantime or the state
    /// is already `Idle`/`Exited`.
    fn check_idle(&self) {
        let mut inner = self.inner.lock();
        if inner.state != AgentState::Active {
            return;
        }
        if inner.last_output.elapsed() >= self.idle_threshold {
            let prev = inner.state;
            inner.state = AgentState::Idle;
            inner.substate = Substate::None;
            inner.seq += 1;
            self.publish(&inner, prev, "idle_timeout");
        }
    }

    fn publish(&self, inner: &Inner, prev: AgentState, cause: &str) {
        let _ = self.tx.send(inner.snapshot());
        let _ = self.transition_tx.send(TransitionEvent {
            prev,
            next: inner.state,
            substate: inner.substate,
            seq: inner.seq,
            cause: cause.to_owned(),
        });
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock().state == AgentState::Idle
    }

    pub fn blocked_on_permission(&self) -> bool {
        self.inner.lock().blocked_on_permission
    }

    /// A receiver satisfied once per transition published via `publish`.
    pub fn state_changed(&self) -> tokio::sync::watch::Receiver<StateSnapshot> {
        self.tx.subscribe()
    }

    /// A receiver satisfied once per tagged transition (output, interrupt,
    /// exit, idle_timeout).
    pub fn transitions(&self) -> tokio::sync::watch::Receiver<TransitionEvent> {
        self.transition_tx.subscribe()
    }

    /// Block until the state reaches `target` or `cancellation` fires.
    pub async fn wait_for_state(&self, target: AgentState, cancellation: CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        if rx.borrow().state == target {
            return true;
        }
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if rx.borrow().state == target {
                        return true;
                    }
                }
            }
        }
    }

    /// Poll for idle transitions at a quarter of the idle threshold (or
    /// every 250ms, whichever is smaller) until `cancel` fires.
    pub async fn run_idle_watch(&self, cancel: CancellationToken) {
        let tick = (self.idle_threshold / 4).max(Duration::from_millis(50));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(tick) => self.check_idle(),
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
