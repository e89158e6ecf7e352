// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op monitor for agent binaries with no native telemetry. Emits
//! nothing beyond the session-lifecycle bookends the daemon already
//! records independently; exists purely so every agent type maps to a
//! concrete `Monitor`.

pub struct NoopMonitor;
