// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `h2 attach` — interactive terminal client for a running Session Daemon.
//!
//! Dials the agent's Unix socket (resolved by name through the Socket
//! Directory), performs the handshake, puts the local terminal in raw
//! mode, and relays bytes in both directions until disconnect or the
//! detach key (Ctrl-\, 0x1c).

use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;

use clap::Args;
use nix::sys::termios;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::attach_protocol::{self, ControlMessage, Frame, Request, Response};
use crate::sockdir::SocketDir;

/// Detach key: Ctrl-\ (ASCII 0x1c).
const DETACH_KEY: u8 = 0x1c;

#[derive(Debug, Args)]
pub struct AttachArgs {
    /// Agent name to attach to, as registered under the socket directory.
    pub name: String,
}

/// RAII guard that restores the original terminal attributes on drop.
struct RawModeGuard {
    fd: i32,
    original: termios::Termios,
}

impl RawModeGuard {
    fn enter() -> anyhow::Result<Self> {
        let fd = std::io::stdin().as_raw_fd();
        let borrowed = borrow_fd(fd);
        let original = termios::tcgetattr(borrowed)?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(borrowed, termios::SetArg::TCSAFLUSH, &raw)?;
        Ok(Self { fd, original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let borrowed = borrow_fd(self.fd);
        let _ = termios::tcsetattr(borrowed, termios::SetArg::TCSAFLUSH, &self.original);
    }
}

fn borrow_fd(fd: i32) -> BorrowedFd<'static> {
    // SAFETY: stdin fd 0 is valid for the lifetime of the process.
    #[allow(unsafe_code)]
    unsafe {
        BorrowedFd::borrow_raw(fd)
    }
}

fn terminal_size() -> Option<(u16, u16)> {
    let fd = std::io::stdout().as_raw_fd();
    let mut ws = nix::libc::winsize { ws_row: 0, ws_col: 0, ws_xpixel: 0, ws_ypixel: 0 };
    // SAFETY: TIOCGWINSZ ioctl reads terminal size into a winsize struct;
    // fd is stdout and ws is a properly laid-out stack variable.
    #[allow(unsafe_code)]
    let ret = unsafe { nix::libc::ioctl(fd, nix::libc::TIOCGWINSZ, &mut ws) };
    if ret == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some((ws.ws_col, ws.ws_row))
    } else {
        None
    }
}

/// Run the `h2 attach` subcommand. Returns a process exit code.
pub async fn run(args: AttachArgs, h2_dir: PathBuf) -> i32 {
    let sockdir = SocketDir::new(h2_dir.join("sockets"));
    let entry = match sockdir.find(&args.name) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };

    let stream = match UnixStream::connect(&entry.path).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to connect to {}: {e}", entry.path.display());
            return 1;
        }
    };

    let (cols, rows) = terminal_size().unwrap_or((80, 24));
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = Request::Attach { cols, rows };
    if let Err(e) = attach_protocol::write_line_json(&mut write_half, &request).await {
        eprintln!("error: failed to send handshake: {e}");
        return 1;
    }
    let response: Response = match attach_protocol::read_line_json(&mut reader).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: failed to read handshake response: {e}");
            return 1;
        }
    };
    if !response.ok {
        eprintln!("error: {}", response.error.unwrap_or_else(|| "attach refused".to_owned()));
        return 1;
    }

    let raw_guard = match RawModeGuard::enter() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("error: failed to enter raw mode: {e}");
            return 1;
        }
    };

    let mut stdout = std::io::stdout();

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(64);
    std::thread::spawn(move || {
        use std::io::Read;
        let stdin = std::io::stdin();
        let mut handle = stdin.lock();
        let mut buf = [0u8; 4096];
        loop {
            match handle.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if stdin_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut sigwinch =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change()).ok();

    let mut detached = false;
    loop {
        tokio::select! {
            frame = attach_protocol::read_frame(&mut reader) => {
                match frame {
                    Ok(Some(Frame::Data(bytes))) => {
                        let _ = stdout.write_all(&bytes);
                        let _ = stdout.flush();
                    }
                    Ok(Some(Frame::Control(_))) | Ok(None) | Err(_) => break,
                }
            }

            data = stdin_rx.recv() => {
                match data {
                    Some(bytes) => {
                        let send_len = match bytes.iter().position(|&b| b == DETACH_KEY) {
                            Some(pos) => { detached = true; pos }
                            None => bytes.len(),
                        };
                        if send_len > 0 && attach_protocol::write_data_frame(&mut write_half, &bytes[..send_len]).await.is_err() {
                            break;
                        }
                        if detached {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = async {
                match sigwinch.as_mut() {
                    Some(s) => { s.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Some((cols, rows)) = terminal_size() {
                    let _ = attach_protocol::write_control_frame(&mut write_half, &ControlMessage::Resize { rows, cols }).await;
                }
            }
        }
    }

    drop(raw_guard);
    if detached {
        eprintln!("\r\ndetached from h2 session.");
    } else {
        eprintln!("\r\nconnection closed.");
    }
    0
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
