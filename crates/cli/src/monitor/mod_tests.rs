// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn noop_monitor_completes_on_cancel() {
    let (tx, _rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let cancel2 = cancel.clone();
    let task = tokio::spawn(Box::new(NoopMonitor).run(tx, cancel2));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn native_log_monitor_translates_native_shape_and_skips_unrecognized_lines() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("session.jsonl");
    std::fs::write(
        &log_path,
        concat!(
            "{\"some_native_field\":true}\n",
            "{\"type\":\"system\",\"subtype\":\"init\"}\n",
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"tool_use\",\"name\":\"Bash\"}]}}\n",
        ),
    )
    .unwrap();

    let monitor = Box::new(NativeLogMonitor::new(log_path).with_poll_interval(Duration::from_millis(20)));
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let cancel2 = cancel.clone();
    let task = tokio::spawn(monitor.run(tx, cancel2));

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("monitor timed out")
        .expect("channel closed");
    assert!(matches!(first, AgentEvent::SessionStarted));

    let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("monitor timed out")
        .expect("channel closed");
    assert!(matches!(second, AgentEvent::ToolStarted { tool } if tool == "Bash"));

    cancel.cancel();
    let _ = task.await;
}
