// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format for the agent socket: a line-oriented JSON handshake,
//! then (for `attach` only) length-prefixed `Data`/`Control` frames.
//!
//! Frame header: `[type:1][length:4 BE]`. `type` is [`FrameType::Data`]
//! (1, raw terminal bytes) or [`FrameType::Control`] (2, JSON).

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ErrorCode;
use crate::event::Priority;

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The client's side of the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Info,
    Attach { cols: u16, rows: u16 },
    Enqueue { from: String, body: String, priority: Priority },
    SendRaw { body: String },
}

/// The server's reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<AgentInfo>,
    /// Id of the message created by an `enqueue` or `send_raw` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self { ok: true, error: None, info: None, id: None }
    }

    pub fn ok_with_info(info: AgentInfo) -> Self {
        Self { ok: true, error: None, info: Some(info), id: None }
    }

    pub fn ok_with_id(id: impl Into<String>) -> Self {
        Self { ok: true, error: None, info: None, id: Some(id.into()) }
    }

    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { ok: false, error: Some(format!("{code}: {}", message.into())), info: None, id: None }
    }
}

/// Snapshot returned by the `info` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub command: String,
    pub session_id: String,
    pub role: Option<String>,
    pub pod: Option<String>,
    pub uptime_secs: u64,
    pub state: String,
    pub substate: String,
    pub state_label: String,
    pub state_duration_secs: u64,
    pub pending_messages: usize,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub last_tool: Option<String>,
    pub tool_use_count: u64,
    pub blocked_on_permission: bool,
}

pub const ALREADY_ATTACHED: &str = "another client is already attached";

/// Framed-phase payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data = 1,
    Control = 2,
}

impl FrameType {
    fn from_byte(b: u8) -> anyhow::Result<Self> {
        match b {
            1 => Ok(Self::Data),
            2 => Ok(Self::Control),
            other => anyhow::bail!("unknown frame type {other}"),
        }
    }
}

/// A `Control` frame's JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Resize { rows: u16, cols: u16 },
}

/// Read one `\n`-terminated JSON line and decode it.
pub async fn read_line_json<T, R>(reader: &mut R) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    R: tokio::io::AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        anyhow::bail!("connection closed before handshake line");
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Write one value as a `\n`-terminated JSON line.
pub async fn write_line_json<T, W>(writer: &mut W, value: &T) -> anyhow::Result<()>
where
    T: Serialize,
    W: tokio::io::AsyncWriteExt + Unpin,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Write a `Data` frame.
pub async fn write_data_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, bytes: &[u8]) -> anyhow::Result<()> {
    write_frame(writer, FrameType::Data, bytes).await
}

/// Write a `Control` frame carrying JSON.
pub async fn write_control_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &ControlMessage,
) -> anyhow::Result<()> {
    let json = serde_json::to_vec(msg)?;
    write_frame(writer, FrameType::Control, &json).await
}

async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame_type: FrameType,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        anyhow::bail!("frame too large: {} bytes", payload.len());
    }
    writer.write_u8(frame_type as u8).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// A decoded frame from the framed phase.
#[derive(Debug, Clone)]
pub enum Frame {
    Data(Vec<u8>),
    Control(ControlMessage),
}

/// Read one frame, or `Ok(None)` on a clean EOF at the header boundary.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> anyhow::Result<Option<Frame>> {
    let mut type_byte = [0u8; 1];
    match reader.read_exact(&mut type_byte).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let frame_type = FrameType::from_byte(type_byte[0])?;

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        anyhow::bail!("frame too large: {len} bytes");
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    match frame_type {
        FrameType::Data => Ok(Some(Frame::Data(payload))),
        FrameType::Control => Ok(Some(Frame::Control(serde_json::from_slice(&payload)?))),
    }
}

#[cfg(test)]
#[path = "attach_protocol_tests.rs"]
mod tests;
