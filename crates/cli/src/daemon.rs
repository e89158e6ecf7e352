// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Daemon composition: wires the socket directory, PTY, Agent
//! Monitor, Event Store, Message Queue, Activity State Machine, and
//! Delivery Engine into one running agent, and handles the per-agent
//! accept loop for the attach protocol.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attach_protocol::{
    self, AgentInfo, ControlMessage, Frame, Request, Response, ALREADY_ATTACHED,
};
use crate::config::Config;
use crate::delivery::DeliveryEngine;
use crate::error::ErrorCode;
use crate::event::{rfc3339_now, AgentEvent, ExitStatus, Message};
use crate::event_log::EventLog;
use crate::monitor::{AgentType, HookTelemetryMonitor, Monitor, NativeLogMonitor, NoopMonitor};
use crate::pty::spawn::NativePty;
use crate::pty::BackendInput;
use crate::queue::MessageQueue;
use crate::session::{Session, SessionConfig};
use crate::sockdir::{SocketDir, SocketType};
use crate::state::ActivityState;

/// Environment variables that would make the child think it's already
/// running nested inside another agent session; stripped before fork.
const NESTING_ENV_VARS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE_SSE_PORT"];

/// Persisted alongside `events.jsonl` in the session directory.
#[derive(Debug, Clone, Serialize)]
struct SessionMetadata {
    name: String,
    session_id: String,
    binary: String,
    command: Vec<String>,
    role: Option<String>,
    pod: Option<String>,
    agent_type: String,
    working_dir: PathBuf,
    config_dir: Option<PathBuf>,
    overrides: BTreeMap<String, String>,
    started_at: String,
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

fn build_monitor(config: &Config) -> anyhow::Result<Box<dyn Monitor>> {
    if let Some(native_log) = &config.native_log {
        return Ok(Box::new(NativeLogMonitor::new(native_log.clone())));
    }
    match config.agent_type_enum()? {
        AgentType::Claude | AgentType::Codex | AgentType::Gemini => {
            let fifo = config.session_dir().join("hooks.fifo");
            let receiver = crate::monitor::hook::HookReceiver::new(&fifo)?;
            Ok(Box::new(HookTelemetryMonitor::new(receiver)))
        }
        AgentType::Unknown => Ok(Box::new(NoopMonitor)),
    }
}

/// Re-exec wrapper: forks a `_daemon` child and waits for its socket file
/// to appear before returning to the invoking command.
pub async fn launch(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let socket_path = SocketDir::new(config.h2_dir().join("sockets")).path(SocketType::Agent, &config.name);

    let exe = std::env::current_exe().context("resolve current executable")?;
    let mut command = tokio::process::Command::new(exe);
    command.arg("_daemon");
    command.args(raw_launch_args());
    for var in NESTING_ENV_VARS {
        command.env_remove(var);
    }
    command.stdin(std::process::Stdio::null());
    command.stdout(std::process::Stdio::null());
    command.stderr(std::process::Stdio::null());

    let mut child = command.spawn().context("spawn daemon process")?;

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if socket_path.exists() {
            return Ok(());
        }
        if let Some(status) = child.try_wait()? {
            anyhow::bail!("daemon exited before listening: {status}");
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for {} to appear", socket_path.display());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Reconstruct the argv this process was invoked with, skipping the
/// program name and any leading subcommand token.
fn raw_launch_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// The `_daemon` body: runs until the supervised child exits, then tears
/// everything down.
pub async fn run_daemon(config: Config) -> anyhow::Result<ExitStatus> {
    config.validate()?;
    init_tracing(&config);

    let h2_dir = config.h2_dir();
    let sockdir = SocketDir::new(h2_dir.join("sockets"));
    sockdir.ensure()?;
    let socket_path = sockdir.path(SocketType::Agent, &config.name);
    SocketDir::probe(&socket_path, &config.name).await?;

    let session_dir = config.session_dir();
    let event_log = Arc::new(EventLog::open(&session_dir)?);
    write_session_metadata(&session_dir, &config)?;

    for var in NESTING_ENV_VARS {
        std::env::remove_var(var);
    }

    let backend = NativePty::spawn(&config.command, config.cols, config.rows)?;
    let activity = Arc::new(ActivityState::new(Duration::from_secs(config.idle_grace)));
    let cancel = CancellationToken::new();
    let session = Arc::new(Session::new(
        SessionConfig::new(Box::new(backend), config.cols, config.rows).with_shutdown(cancel.clone()),
        activity.clone(),
    ));

    let queue = Arc::new(MessageQueue::new(&config.name, &h2_dir));
    let enqueued = Arc::new(Notify::new());
    let delivery = DeliveryEngine::new(queue.clone(), activity.clone(), session.input_tx.clone());
    let delivery_task = {
        let cancel = cancel.clone();
        let enqueued = enqueued.clone();
        tokio::spawn(async move { delivery.run(cancel, enqueued).await })
    };

    let idle_watch_task = {
        let activity = activity.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { activity.run_idle_watch(cancel).await })
    };

    let monitor = build_monitor(&config)?;
    let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(128);
    let monitor_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(event_tx, cancel).await })
    };
    let event_relay_task = {
        let activity = activity.clone();
        let event_log = event_log.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                activity.apply_event(&event);
                if let Err(e) = event_log.append(event) {
                    warn!("event log append failed: {e:#}");
                }
            }
        })
    };

    let listener = UnixListener::bind(&socket_path).context("bind agent socket")?;
    info!(socket = %socket_path.display(), "listening");
    let accept_task = {
        let session = session.clone();
        let queue = queue.clone();
        let enqueued = enqueued.clone();
        let config = Arc::new(config);
        let cancel = cancel.clone();
        let started_at = Instant::now();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let session = session.clone();
                        let queue = queue.clone();
                        let enqueued = enqueued.clone();
                        let config = config.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, session, queue, enqueued, config, started_at, cancel).await
                            {
                                warn!("connection handler failed: {e:#}");
                            }
                        });
                    }
                }
            }
        })
    };

    let status = session.wait_for_exit().await;

    cancel.cancel();
    let _ = std::fs::remove_file(&socket_path);
    accept_task.abort();
    delivery_task.abort();
    idle_watch_task.abort();
    monitor_task.abort();
    let _ = event_relay_task.await;

    status
}

fn write_session_metadata(session_dir: &std::path::Path, config: &Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(session_dir)?;
    let metadata = SessionMetadata {
        name: config.name.clone(),
        session_id: uuid::Uuid::new_v4().to_string(),
        binary: config.command.first().cloned().unwrap_or_default(),
        command: config.command.clone(),
        role: config.role.clone(),
        pod: config.pod.clone(),
        agent_type: config.agent_type.clone(),
        working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        config_dir: config.config_dir.clone(),
        overrides: config.parsed_overrides().into_iter().collect(),
        started_at: rfc3339_now(),
    };
    let path = session_dir.join("session.metadata.json");
    std::fs::write(path, serde_json::to_string_pretty(&metadata)?)?;
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    session: Arc<Session>,
    queue: Arc<MessageQueue>,
    enqueued: Arc<Notify>,
    config: Arc<Config>,
    started_at: Instant,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request: Request = match attach_protocol::read_line_json(&mut reader).await {
        Ok(r) => r,
        Err(e) => {
            let resp = Response::err(ErrorCode::BadRequest, e.to_string());
            let _ = attach_protocol::write_line_json(&mut write_half, &resp).await;
            return Ok(());
        }
    };

    match request {
        Request::Info => {
            let info = build_agent_info(&session, &queue, &config, started_at);
            attach_protocol::write_line_json(&mut write_half, &Response::ok_with_info(info)).await
        }
        Request::Enqueue { from, body, priority } => {
            let msg = Message::new(from, body, priority);
            let id = msg.id.clone();
            match queue.enqueue(msg) {
                Ok(()) => {
                    enqueued.notify_one();
                    attach_protocol::write_line_json(&mut write_half, &Response::ok_with_id(id)).await
                }
                Err(e) => attach_protocol::write_line_json(&mut write_half, &Response::err(ErrorCode::Internal, e.to_string())).await,
            }
        }
        Request::SendRaw { body } => {
            let msg = Message::raw(body);
            let id = msg.id.clone();
            match queue.enqueue(msg) {
                Ok(()) => {
                    enqueued.notify_one();
                    attach_protocol::write_line_json(&mut write_half, &Response::ok_with_id(id)).await
                }
                Err(e) => attach_protocol::write_line_json(&mut write_half, &Response::err(ErrorCode::Internal, e.to_string())).await,
            }
        }
        Request::Attach { cols, rows } => {
            run_attach(reader, write_half, session, cols, rows, cancel).await
        }
    }
}

/// Build a point-in-time `AgentInfo` snapshot for the `info` RPC.
fn build_agent_info(session: &Session, queue: &MessageQueue, config: &Config, started_at: Instant) -> AgentInfo {
    let snapshot = session.activity.snapshot();
    AgentInfo {
        name: config.name.clone(),
        command: config.command.join(" "),
        session_id: config.name.clone(),
        role: config.role.clone(),
        pod: config.pod.clone(),
        uptime_secs: started_at.elapsed().as_secs(),
        state: snapshot.state.as_str().to_owned(),
        substate: snapshot.substate.as_str().to_owned(),
        state_label: state_label(&snapshot),
        state_duration_secs: 0,
        pending_messages: queue.pending_count(),
        input_tokens: None,
        output_tokens: None,
        cost_usd: None,
        last_tool: snapshot.last_tool_name,
        tool_use_count: snapshot.tool_use_count,
        blocked_on_permission: snapshot.blocked_on_permission,
    }
}

/// Human-readable label combining coarse state and substate, e.g.
/// "active (awaiting_approval)" or "idle".
fn state_label(snapshot: &crate::state::StateSnapshot) -> String {
    match snapshot.substate {
        crate::event::Substate::None => snapshot.state.as_str().to_owned(),
        other => format!("{} ({})", snapshot.state, other.as_str()),
    }
}

/// Attach handler: installs the socket as the VT's output sink, repaints
/// the current screen, then relays frames until disconnect.
async fn run_attach(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    session: Arc<Session>,
    cols: u16,
    rows: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (sink_tx, mut sink_rx) = mpsc::channel::<bytes::Bytes>(256);
    if !session.set_attach_sink(Some(sink_tx)) {
        let resp = Response::err(ErrorCode::WriterBusy, ALREADY_ATTACHED);
        attach_protocol::write_line_json(&mut write_half, &resp).await?;
        return Ok(());
    }

    attach_protocol::write_line_json(&mut write_half, &Response::ok()).await?;
    session.resize(cols, rows, rows).await;

    repaint(&mut write_half, &session).await?;

    let input_tx = session.input_tx.clone();
    let reader_session = session.clone();
    let mut reader_task = tokio::spawn(async move {
        loop {
            match attach_protocol::read_frame(&mut reader).await {
                Ok(Some(Frame::Data(bytes))) => {
                    if input_tx.send(BackendInput::Write(bytes.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Some(Frame::Control(ControlMessage::Resize { rows, cols }))) => {
                    reader_session.resize(cols, rows, rows).await;
                }
                Ok(None) | Err(_) => return,
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = sink_rx.recv() => {
                match chunk {
                    Some(bytes) => {
                        if attach_protocol::write_data_frame(&mut write_half, &bytes).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = &mut reader_task => break,
        }
    }

    reader_task.abort();
    session.set_attach_sink(None);
    const MOUSE_OFF: &[u8] = b"\x1b[?1000l";
    let _ = attach_protocol::write_data_frame(&mut write_half, MOUSE_OFF).await;
    Ok(())
}

async fn repaint<W: AsyncWriteExt + Unpin>(writer: &mut W, session: &Session) -> anyhow::Result<()> {
    const CLEAR: &[u8] = b"\x1b[2J\x1b[H";
    const MOUSE_ON: &[u8] = b"\x1b[?1000h";
    let mut buf = Vec::new();
    buf.extend_from_slice(CLEAR);
    buf.extend_from_slice(MOUSE_ON);
    {
        let screen = session.screen.lock();
        for line in screen.snapshot().lines {
            buf.extend_from_slice(line.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }
    attach_protocol::write_data_frame(writer, &buf).await
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
