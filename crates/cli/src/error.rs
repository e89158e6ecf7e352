// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-visible error vocabulary for the attach protocol's `Response.error`.
///
/// Deliberately decoupled from whatever `anyhow::Error` chain produced the
/// failure internally — clients only ever see one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotReady,
    Exited,
    WriterBusy,
    Unauthorized,
    BadRequest,
    NoDriver,
    AgentBusy,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::Exited => "EXITED",
            Self::WriterBusy => "WRITER_BUSY",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NoDriver => "NO_DRIVER",
            Self::AgentBusy => "AGENT_BUSY",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
