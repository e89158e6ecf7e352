// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket directory: maps `<type>.<name>.sock` filenames under a per-user
//! directory to live listeners, and distinguishes an alive daemon's socket
//! from a stale inode left behind by a crash.

use std::path::{Path, PathBuf};

/// Socket type. `name` may not contain `.` — the first dot in the filename
/// is the type/name delimiter, any further dots belong to the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Agent,
    Bridge,
}

impl SocketType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Bridge => "bridge",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(Self::Agent),
            "bridge" => Some(Self::Bridge),
            _ => None,
        }
    }
}

/// A parsed `<type>.<name>.sock` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub socket_type: SocketType,
    pub name: String,
    pub path: PathBuf,
}

/// Directory of per-agent Unix sockets, created with mode `0700`.
pub struct SocketDir {
    root: PathBuf,
}

impl SocketDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the directory exists with `0700` permissions.
    pub fn ensure(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// The path a given (type, name) pair would occupy.
    pub fn path(&self, socket_type: SocketType, name: &str) -> PathBuf {
        self.root.join(format!("{}.{name}.sock", socket_type.as_str()))
    }

    /// List every valid `<type>.<name>.sock` entry. A missing directory
    /// returns an empty list rather than an error.
    pub fn list(&self) -> Vec<SocketEntry> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_filename(&e.file_name().to_string_lossy()).map(|(t, n)| SocketEntry {
                socket_type: t,
                name: n,
                path: e.path(),
            }))
            .collect()
    }

    /// List entries of a given type only.
    pub fn list_by_type(&self, socket_type: SocketType) -> Vec<SocketEntry> {
        self.list().into_iter().filter(|e| e.socket_type == socket_type).collect()
    }

    /// Find the unique socket with the given `name`, across all types.
    ///
    /// Zero matches is a not-found error; two or more is an ambiguous-name
    /// error.
    pub fn find(&self, name: &str) -> anyhow::Result<SocketEntry> {
        let mut matches: Vec<SocketEntry> = self.list().into_iter().filter(|e| e.name == name).collect();
        match matches.len() {
            0 => anyhow::bail!("no socket found for {name}"),
            1 => Ok(matches.remove(0)),
            _ => anyhow::bail!("ambiguous name: {name} matches {} sockets", matches.len()),
        }
    }

    /// Probe an existing socket path: if a live daemon accepts the
    /// connection, fail with a message naming `label`. If the connection is
    /// refused or the file is absent, unlink any stale inode and return ok.
    pub async fn probe(path: &Path, label: &str) -> anyhow::Result<()> {
        match tokio::net::UnixStream::connect(path).await {
            Ok(_stream) => anyhow::bail!("already in use by {label}"),
            Err(_) => {
                let _ = std::fs::remove_file(path);
                Ok(())
            }
        }
    }
}

/// Parse a `<type>.<name>.sock` filename.
fn parse_filename(filename: &str) -> Option<(SocketType, String)> {
    let name_and_ext = filename.strip_suffix(".sock")?;
    let (type_str, name) = name_and_ext.split_once('.')?;
    if name.is_empty() {
        return None;
    }
    let socket_type = SocketType::parse(type_str)?;
    Some((socket_type, name.to_owned()))
}

#[cfg(test)]
#[path = "sockdir_tests.rs"]
mod tests;
