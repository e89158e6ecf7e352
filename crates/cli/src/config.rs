// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use crate::monitor::AgentType;

/// Launch configuration for a Session Daemon, shared by the `_daemon`
/// body and the launcher that re-execs into it.
#[derive(Debug, Parser)]
#[command(name = "h2", version, about)]
pub struct Config {
    /// Name this agent is addressed by under the socket directory. Not
    /// clap-required: `Config` is flattened alongside the `attach` and
    /// `send-raw` subcommands, which never populate it, so emptiness is
    /// checked in `validate()` instead of at the argument-parser level.
    #[arg(long, env = "H2_NAME", default_value = "")]
    pub name: String,

    /// Agent binary kind, used to pick a Monitor variant.
    #[arg(long, env = "H2_AGENT_TYPE", default_value = "unknown")]
    pub agent_type: String,

    /// Role label surfaced in `info` (e.g. "reviewer", "implementer").
    #[arg(long, env = "H2_ROLE")]
    pub role: Option<String>,

    /// Pod label surfaced in `info`, grouping related agents.
    #[arg(long, env = "H2_POD")]
    pub pod: Option<String>,

    /// Root directory for sockets, messages, and session state.
    /// Defaults to `~/.h2`.
    #[arg(long, env = "H2_DIR")]
    pub h2_dir: Option<PathBuf>,

    /// Terminal columns.
    #[arg(long, env = "H2_COLS", default_value = "200")]
    pub cols: u16,

    /// Terminal rows.
    #[arg(long, env = "H2_ROWS", default_value = "50")]
    pub rows: u16,

    /// Ring buffer size in bytes.
    #[arg(long, env = "H2_RING_SIZE", default_value = "1048576")]
    pub ring_size: usize,

    /// Seconds of PTY silence before the agent is considered idle.
    #[arg(long, env = "H2_IDLE_GRACE", default_value = "60")]
    pub idle_grace: u64,

    /// TERM environment variable for the child process.
    #[arg(long, env = "TERM", default_value = "xterm-256color")]
    pub term: String,

    /// Log format (json or text).
    #[arg(long, env = "H2_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "H2_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Path to the agent binary's native JSONL session log, used by
    /// the `NativeLogMonitor` variant.
    #[arg(long, env = "H2_NATIVE_LOG")]
    pub native_log: Option<PathBuf>,

    /// Agent binary's own config directory (e.g. a Claude settings dir),
    /// persisted in session metadata for later inspection.
    #[arg(long, env = "H2_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Role/config override expressed as `key=value`; may be repeated.
    /// Kept unparsed past the split so callers decide how to interpret
    /// the right-hand side.
    #[arg(short = 'c', long = "set", value_name = "key=value")]
    pub overrides: Vec<String>,

    /// Command to run (after --).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.is_empty() {
            anyhow::bail!("a command to run must be specified after --");
        }
        if self.name.is_empty() {
            anyhow::bail!("--name (or H2_NAME) is required");
        }
        if self.name.contains('.') {
            anyhow::bail!("agent name must not contain '.'");
        }
        self.agent_type_enum()?;
        Ok(())
    }

    /// Parse the agent type string into an enum.
    pub fn agent_type_enum(&self) -> anyhow::Result<AgentType> {
        match self.agent_type.to_lowercase().as_str() {
            "claude" => Ok(AgentType::Claude),
            "codex" => Ok(AgentType::Codex),
            "gemini" => Ok(AgentType::Gemini),
            "unknown" => Ok(AgentType::Unknown),
            other => anyhow::bail!("invalid agent type: {other}"),
        }
    }

    /// Resolve the root directory for sockets/messages/session state,
    /// defaulting to `~/.h2`.
    pub fn h2_dir(&self) -> PathBuf {
        self.h2_dir.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
            PathBuf::from(home).join(".h2")
        })
    }

    /// Directory holding this agent's `session.metadata.json` and
    /// `events.jsonl`.
    pub fn session_dir(&self) -> PathBuf {
        self.h2_dir().join("sessions").join(&self.name)
    }

    /// Split each `--set key=value` override on its first `=`.
    /// Malformed entries (no `=`) are dropped.
    pub fn parsed_overrides(&self) -> Vec<(String, String)> {
        self.overrides
            .iter()
            .filter_map(|raw| raw.split_once('=').map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned())))
            .collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
