// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `h2 send-raw` — one-shot `send-raw` RPC against a resolved socket, used
//! for scripted injection (e.g. answering a permission prompt from a shell
//! hook) without ever entering the framed phase.

use std::path::PathBuf;

use clap::Args;
use tokio::io::BufReader;
use tokio::net::UnixStream;

use crate::attach_protocol::{self, Request, Response};
use crate::sockdir::SocketDir;

#[derive(Debug, Args)]
pub struct SendRawArgs {
    /// Agent name to send to, as registered under the socket directory.
    pub name: String,
    /// Raw bytes to write to the PTY, verbatim plus a trailing `\r`.
    pub body: String,
}

/// Run the `h2 send-raw` subcommand. Returns a process exit code.
pub async fn run(args: SendRawArgs, h2_dir: PathBuf) -> i32 {
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
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = Request::SendRaw { body: args.body };
    if let Err(e) = attach_protocol::write_line_json(&mut write_half, &request).await {
        eprintln!("error: failed to send request: {e}");
        return 1;
    }
    let response: Response = match attach_protocol::read_line_json(&mut reader).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: failed to read response: {e}");
            return 1;
        }
    };
    if !response.ok {
        eprintln!("error: {}", response.error.unwrap_or_else(|| "send-raw failed".to_owned()));
        return 1;
    }
    0
}

#[cfg(test)]
#[path = "send_raw_tests.rs"]
mod tests;
