// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local priority queue of pending [`Message`]s. Ordered
//! `Interrupt > Normal > Idle`, FIFO within a priority. Bodies over the
//! inline threshold are persisted to `<h2-dir>/messages/<agent>/<id>.md`
//! before the message becomes visible to [`MessageQueue::dequeue`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::event::{Message, MessageStatus, Priority};

/// Inline body size above which a message is spilled to disk and
/// delivered as a file reference instead of an inline blob.
const INLINE_THRESHOLD: usize = 300;

struct QueueEntry {
    priority: Priority,
    sequence: u64,
    message: Message,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority sorts first, and
        // within a priority the *lower* sequence (earlier arrival) must
        // sort first, hence the sequence comparison is reversed.
        self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Inner {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

/// Priority queue of pending inter-agent messages, keyed on the agent
/// name whose directory messages spill into.
pub struct MessageQueue {
    agent_name: String,
    messages_root: PathBuf,
    inner: Mutex<Inner>,
}

impl MessageQueue {
    pub fn new(agent_name: impl Into<String>, h2_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_name: agent_name.into(),
            messages_root: h2_dir.into().join("messages"),
            inner: Mutex::new(Inner { heap: BinaryHeap::new(), next_sequence: 0 }),
        }
    }

    /// Enqueue `msg`, spilling its body to disk first if it exceeds the
    /// inline threshold. The on-disk file exists before this returns, so
    /// it always exists before the message can be observed by `dequeue`.
    pub fn enqueue(&self, mut msg: Message) -> anyhow::Result<()> {
        if msg.body.len() > INLINE_THRESHOLD && msg.file_path.is_none() {
            let dir = self.messages_root.join(&self.agent_name);
            std::fs::create_dir_all(&dir)?;
            let file_path = dir.join(format!("{}.md", msg.id));
            std::fs::write(&file_path, &msg.body)?;
            msg.file_path = Some(file_path.to_string_lossy().into_owned());
        }

        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(QueueEntry { priority: msg.priority, sequence, message: msg });
        Ok(())
    }

    /// Pop the next deliverable message. `Idle`-priority messages are
    /// suppressed unless `idle` is true; everything else is always
    /// eligible.
    pub fn dequeue(&self, idle: bool) -> Option<Message> {
        let mut inner = self.inner.lock();
        if !idle {
            // Pull out any deliverable entry, re-queuing idle-only ones
            // we pass over so FIFO order among them is preserved.
            let mut deferred = Vec::new();
            let popped = loop {
                match inner.heap.pop() {
                    Some(entry) if entry.priority == Priority::Idle => deferred.push(entry),
                    other => break other,
                }
            };
            for entry in deferred {
                inner.heap.push(entry);
            }
            popped.map(|e| e.message)
        } else {
            inner.heap.pop().map(|e| e.message)
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Current status of every pending message, for introspection.
    pub fn pending(&self) -> Vec<MessageStatus> {
        self.inner.lock().heap.iter().map(|e| e.message.status).collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
