// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::event::AgentEvent;

use super::{parse_hook_line, HookReceiver};

#[test]
fn parses_tool_started_event() {
    let event = parse_hook_line(r#"{"event":"pre_tool_use","data":{"tool_name":"Bash"}}"#);
    match event {
        Some(AgentEvent::ToolStarted { tool }) => assert_eq!(tool, "Bash"),
        other => panic!("expected ToolStarted, got {other:?}"),
    }
}

#[test]
fn parses_tool_completed_event() {
    let event = parse_hook_line(r#"{"event":"post_tool_use","data":{"tool_name":"Bash"}}"#);
    match event {
        Some(AgentEvent::ToolCompleted { tool, success, .. }) => {
            assert_eq!(tool, "Bash");
            assert!(success);
        }
        other => panic!("expected ToolCompleted, got {other:?}"),
    }
}

#[test]
fn parses_session_start_event() {
    assert!(matches!(parse_hook_line(r#"{"event":"start"}"#), Some(AgentEvent::SessionStarted)));
}

#[test]
fn parses_session_end_event() {
    assert!(matches!(parse_hook_line(r#"{"event":"session_end"}"#), Some(AgentEvent::SessionEnded)));
}

#[test]
fn parses_permission_notification_as_approval_requested() {
    let event = parse_hook_line(
        r#"{"event":"notification","data":{"notification_type":"permission_prompt","tool_name":"Bash"}}"#,
    );
    assert!(matches!(event, Some(AgentEvent::ApprovalRequested { .. })));
}

#[test]
fn ignores_non_permission_notification() {
    let event =
        parse_hook_line(r#"{"event":"notification","data":{"notification_type":"idle_prompt"}}"#);
    assert_eq!(event, None);
}

#[test]
fn notification_missing_type_returns_none() {
    assert_eq!(parse_hook_line(r#"{"event":"notification","data":{}}"#), None);
}

#[test]
fn ignores_malformed_lines() {
    assert_eq!(parse_hook_line("not json"), None);
    assert_eq!(parse_hook_line("{}"), None);
    assert_eq!(parse_hook_line(r#"{"event":"unknown_event"}"#), None);
    assert_eq!(parse_hook_line(""), None);
}

#[test]
fn creates_pipe_and_cleans_up() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pipe_path = dir.path().join("test.pipe");

    {
        let recv = HookReceiver::new(&pipe_path)?;
        assert!(pipe_path.exists());
        assert_eq!(recv.pipe_path(), pipe_path);
    }
    assert!(!pipe_path.exists());
    Ok(())
}

#[tokio::test]
async fn reads_event_from_pipe() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let pipe_path = dir.path().join("hook.pipe");

    let mut recv = HookReceiver::new(&pipe_path)?;

    let pipe = pipe_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut file = match tokio::fs::OpenOptions::new().write(true).open(&pipe).await {
            Ok(f) => f,
            Err(_) => return,
        };
        use tokio::io::AsyncWriteExt;
        let _ = file.write_all(b"{\"event\":\"session_end\",\"data\":{}}\n").await;
    });

    let event = recv.next_event().await;
    assert!(matches!(event, Some(AgentEvent::SessionEnded)));
    Ok(())
}
