// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `h2` binary as a subprocess and exercises it over its
//! Unix socket protocol: the line-JSON handshake (`info`, `send-raw`,
//! `enqueue`) and the framed `attach` phase.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use h2::attach_protocol::{self, AgentInfo, Request, Response};
use h2::sockdir::{SocketDir, SocketType};
use tokio::io::BufReader;
use tokio::net::UnixStream;

/// Resolve the path to the compiled `h2` binary.
pub fn h2_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("h2")
}

/// A running `h2` daemon (launcher + re-exec'd `_daemon` body), killed on drop.
pub struct H2Process {
    child: Child,
    name: String,
    h2_dir: tempfile::TempDir,
}

impl H2Process {
    /// Launch `h2` under a fresh, isolated `H2_DIR`, wrapping `cmd`.
    pub fn start(name: &str, cmd: &[&str]) -> anyhow::Result<Self> {
        let binary = h2_binary();
        anyhow::ensure!(binary.exists(), "h2 binary not found at {}", binary.display());

        let h2_dir = tempfile::tempdir()?;

        let mut args: Vec<String> =
            vec!["--name".into(), name.into(), "--h2-dir".into(), h2_dir.path().to_string_lossy().into_owned()];
        args.push("--".into());
        args.extend(cmd.iter().map(|s| s.to_string()));

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, name: name.to_owned(), h2_dir })
    }

    fn sockdir(&self) -> SocketDir {
        SocketDir::new(self.h2_dir.path().join("sockets"))
    }

    fn socket_path(&self) -> PathBuf {
        self.sockdir().path(SocketType::Agent, &self.name)
    }

    /// Poll until the agent socket is live and accepting connections.
    pub async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("h2 socket for {} did not become ready within {timeout:?}", self.name);
            }
            if UnixStream::connect(self.socket_path()).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Connect to the agent socket.
    pub async fn connect(&self) -> anyhow::Result<UnixStream> {
        Ok(UnixStream::connect(self.socket_path()).await?)
    }

    /// Issue one line-JSON `Request` and return the decoded `Response`.
    pub async fn request(&self, request: Request) -> anyhow::Result<Response> {
        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        attach_protocol::write_line_json(&mut write_half, &request).await?;
        attach_protocol::read_line_json(&mut reader).await
    }

    /// Convenience wrapper around the `info` RPC.
    pub async fn info(&self) -> anyhow::Result<AgentInfo> {
        let response = self.request(Request::Info).await?;
        response.info.ok_or_else(|| anyhow::anyhow!("info response carried no AgentInfo"))
    }

    /// Poll `info` until the agent's reported state matches `want`.
    pub async fn wait_for_state(&self, want: &str, timeout: Duration) -> anyhow::Result<AgentInfo> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("{} never reached state {want} within {timeout:?}", self.name);
            }
            if let Ok(info) = self.info().await {
                if info.state == want {
                    return Ok(info);
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the daemon process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("h2 did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for H2Process {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
