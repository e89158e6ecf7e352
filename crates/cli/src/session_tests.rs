// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::*;
use crate::event::ExitStatus;

/// Minimal backend stub: emits a fixed output sequence, then idles until
/// told to stop via `input_rx` closing.
struct StubBackend {
    output: Vec<Bytes>,
}

impl Backend for StubBackend {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<BackendInput>,
        mut resize_rx: mpsc::Receiver<(u16, u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        let output = std::mem::take(&mut self.output);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            for chunk in output {
                let _ = output_tx.send(chunk).await;
            }
            loop {
                tokio::select! {
                    input = input_rx.recv() => if input.is_none() { break },
                    resize = resize_rx.recv() => if resize.is_none() { break },
                }
            }
            Ok(ExitStatus { code: Some(0), signal: None })
        })
    }

    fn resize(&self, _cols: u16, _total_rows: u16, _child_rows: u16) -> anyhow::Result<()> {
        Ok(())
    }

    fn child_pid(&self) -> Option<u32> {
        None
    }
}

fn make_session(output: Vec<Bytes>) -> (Session, Arc<ActivityState>) {
    let activity = Arc::new(ActivityState::new(Duration::from_millis(50)));
    let backend = Box::new(StubBackend { output });
    let config = SessionConfig::new(backend, 80, 24);
    let session = Session::new(config, activity.clone());
    (session, activity)
}

#[tokio::test]
async fn output_is_fed_into_ring_and_screen() {
    let (session, activity) = make_session(vec![Bytes::from_static(b"hello")]);
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(session.screen.lock().changed());
    assert_eq!(activity.snapshot().state, crate::event::AgentState::Active);
}

#[tokio::test]
async fn only_one_attach_sink_may_be_installed_at_a_time() {
    let (session, _activity) = make_session(vec![]);
    let (tx, _rx) = mpsc::channel(8);
    assert!(session.set_attach_sink(Some(tx)));

    let (tx2, _rx2) = mpsc::channel(8);
    assert!(!session.set_attach_sink(Some(tx2)), "second attach must be rejected");

    assert!(session.set_attach_sink(None), "clearing the sink always succeeds");
    let (tx3, _rx3) = mpsc::channel(8);
    assert!(session.set_attach_sink(Some(tx3)), "attach is available again after detach");
}

#[tokio::test]
async fn attach_sink_receives_a_copy_of_pty_output() {
    let (session, _activity) = make_session(vec![Bytes::from_static(b"hello")]);
    let (tx, mut rx) = mpsc::channel(8);
    session.set_attach_sink(Some(tx));

    let chunk = tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timed out waiting for forwarded output")
        .expect("sink channel closed");
    assert_eq!(chunk, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn resize_updates_cols_and_rows() {
    let (session, _activity) = make_session(vec![]);
    session.resize(132, 43, 40).await;
    assert_eq!(session.cols(), 132);
    assert_eq!(session.rows(), 43);
    assert_eq!(session.child_rows(), 40);
}

struct ImmediatelyExitingBackend;

impl Backend for ImmediatelyExitingBackend {
    fn run(
        &mut self,
        _output_tx: mpsc::Sender<Bytes>,
        _input_rx: mpsc::Receiver<BackendInput>,
        _resize_rx: mpsc::Receiver<(u16, u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        Box::pin(async move { Ok(ExitStatus { code: Some(7), signal: None }) })
    }

    fn resize(&self, _cols: u16, _total_rows: u16, _child_rows: u16) -> anyhow::Result<()> {
        Ok(())
    }

    fn child_pid(&self) -> Option<u32> {
        None
    }
}

#[tokio::test]
async fn wait_for_exit_returns_backend_status() {
    let activity = Arc::new(ActivityState::new(Duration::from_secs(60)));
    let config = SessionConfig::new(Box::new(ImmediatelyExitingBackend), 80, 24);
    let session = Session::new(config, activity);

    let status = tokio::time::timeout(Duration::from_secs(1), session.wait_for_exit())
        .await
        .expect("wait_for_exit timed out")
        .expect("backend task join failed");
    assert_eq!(status.code, Some(7));
}
