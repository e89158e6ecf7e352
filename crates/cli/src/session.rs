// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Virtual Terminal's owning task: feeds PTY output into the ring
//! buffer and screen, tracks activity, and forwards output to whichever
//! client is currently attached (at most one at a time — see
//! `attach_protocol`).

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::{AgentEvent, ExitStatus};
use crate::pty::{Backend, BackendInput};
use crate::ring::RingBuffer;
use crate::screen::Screen;
use crate::state::ActivityState;

/// Runtime objects for building a new [`Session`].
pub struct SessionConfig {
    pub backend: Box<dyn Backend>,
    pub cols: u16,
    pub rows: u16,
    /// Rows visible to the child process; may be fewer than `rows` to
    /// reserve a status bar at the bottom of the window. Defaults to
    /// `rows` (no reservation).
    pub child_rows: u16,
    pub ring_capacity: usize,
    pub shutdown: CancellationToken,
}

impl SessionConfig {
    pub fn new(backend: Box<dyn Backend>, cols: u16, rows: u16) -> Self {
        Self {
            backend,
            cols,
            rows,
            child_rows: rows,
            ring_capacity: 1 << 20,
            shutdown: CancellationToken::new(),
        }
    }

    /// Reserve `rows - child_rows` rows at the bottom of the window for a
    /// status bar; the PTY itself only sees `child_rows`.
    pub fn with_child_rows(mut self, child_rows: u16) -> Self {
        self.child_rows = child_rows;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Sink an attach handler installs to receive a copy of every output
/// chunk while it holds the Virtual Terminal's single attach slot.
pub type AttachSink = Arc<Mutex<Option<mpsc::Sender<Bytes>>>>;

pub struct Session {
    pub ring: Arc<Mutex<RingBuffer>>,
    pub screen: Arc<Mutex<Screen>>,
    pub activity: Arc<ActivityState>,
    pub input_tx: mpsc::Sender<BackendInput>,
    pub resize_tx: mpsc::Sender<(u16, u16, u16)>,
    pub attach_sink: AttachSink,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
    child_rows: Arc<AtomicU16>,
    backend_handle: Mutex<Option<tokio::task::JoinHandle<anyhow::Result<ExitStatus>>>>,
}

impl Session {
    /// Spawn the backend and the output-processing loop.
    pub fn new(mut config: SessionConfig, activity: Arc<ActivityState>) -> Self {
        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<BackendInput>(256);
        let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16, u16)>(8);

        let ring = Arc::new(Mutex::new(RingBuffer::new(config.ring_capacity)));
        let screen = Arc::new(Mutex::new(Screen::new(config.cols, config.rows)));
        let attach_sink: AttachSink = Arc::new(Mutex::new(None));
        let cols = Arc::new(AtomicU16::new(config.cols));
        let rows = Arc::new(AtomicU16::new(config.rows));
        let child_rows = Arc::new(AtomicU16::new(config.child_rows));

        let mut backend = config.backend;
        let backend_handle = tokio::spawn(async move {
            backend.run(output_tx, input_rx, resize_rx).await
        });

        let ring_task = ring.clone();
        let screen_task = screen.clone();
        let activity_task = activity.clone();
        let attach_sink_task = attach_sink.clone();
        tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                feed_output(&ring_task, &screen_task, &chunk);
                activity_task.note_output();
                let sink = attach_sink_task.lock().clone();
                if let Some(tx) = sink {
                    let _ = tx.send(chunk).await;
                }
            }
            activity_task.note_exit();
        });

        let _ = config.shutdown.clone();
        Self {
            ring,
            screen,
            activity,
            input_tx,
            resize_tx,
            attach_sink,
            cols,
            rows,
            child_rows,
            backend_handle: Mutex::new(Some(backend_handle)),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols.load(Ordering::Relaxed)
    }

    pub fn rows(&self) -> u16 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn child_rows(&self) -> u16 {
        self.child_rows.load(Ordering::Relaxed)
    }

    /// Resize the window to `total_rows` rows of `cols` columns, with
    /// only `child_rows` of those visible to the child process — the
    /// remainder is reserved for a status bar. Pass `child_rows ==
    /// total_rows` when no status bar is reserved.
    pub async fn resize(&self, cols: u16, total_rows: u16, child_rows: u16) {
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(total_rows, Ordering::Relaxed);
        self.child_rows.store(child_rows, Ordering::Relaxed);
        self.screen.lock().resize(cols, total_rows);
        let _ = self.resize_tx.send((cols, total_rows, child_rows)).await;
    }

    /// Wait for the backend to exit. Must be called at most once.
    pub async fn wait_for_exit(&self) -> anyhow::Result<ExitStatus> {
        // Caller contract violation, not a recoverable runtime condition.
        #[allow(clippy::expect_used)]
        let handle = self.backend_handle.lock().take().expect("wait_for_exit called more than once");
        handle.await?
    }

    /// Attempt to install `tx` as the sole attach sink, or clear it with
    /// `None`. Returns `false` if an attach is already active and `tx` is
    /// `Some` (the caller should report "another client is already
    /// attached").
    pub fn set_attach_sink(&self, tx: Option<mpsc::Sender<Bytes>>) -> bool {
        let mut sink = self.attach_sink.lock();
        if tx.is_some() && sink.is_some() {
            return false;
        }
        *sink = tx;
        true
    }
}

fn feed_output(ring: &Arc<Mutex<RingBuffer>>, screen: &Arc<Mutex<Screen>>, chunk: &[u8]) {
    ring.lock().write(chunk);
    screen.lock().feed(chunk);
}

/// Apply a normalized monitor event to the activity state machine and
/// append it to the event log. Event Store writes are best-effort: a
/// failure is logged by the caller, never fatal to the session.
pub fn record_event(activity: &ActivityState, event: &AgentEvent) {
    activity.apply_event(event);
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
