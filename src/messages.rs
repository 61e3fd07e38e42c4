//! Message log and wire payload types for the control channel.
//!
//! The log is append-only for local submissions and agent-originated messages,
//! and wholesale-replaceable when the remote peer pushes an authoritative
//! snapshot (`MSG_SYNC`). Entries are stamped on append; the stamp stays local
//! and never crosses the wire.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Wire shape of a single text message (`M` payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub sender: String,
    pub content: String,
}

/// Wire shape of a log snapshot (`MSG_SYNC` payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    pub messages: Vec<MessagePayload>,
}

/// One entry in the local message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageLogEntry {
    pub sender: String,
    pub content: String,
    /// Local wall-clock stamp, set when the entry was appended.
    pub stamp: String,
}

/// Ordered message history shared between the dashboard and the remote peer.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<MessageLogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message, stamping it with the current local time.
    pub fn append(&mut self, sender: impl Into<String>, content: impl Into<String>) {
        self.entries.push(MessageLogEntry {
            sender: sender.into(),
            content: content.into(),
            stamp: Local::now().format("%H:%M:%S").to_string(),
        });
    }

    /// Replace the entire log with a remote-authoritative snapshot.
    pub fn replace(&mut self, snapshot: SyncPayload) {
        self.entries.clear();
        for msg in snapshot.messages {
            self.append(msg.sender, msg.content);
        }
    }

    pub fn entries(&self) -> &[MessageLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the whole log in wire form, for pushing a `MSG_SYNC`.
    pub fn sync_payload(&self) -> SyncPayload {
        SyncPayload {
            messages: self
                .entries
                .iter()
                .map(|e| MessagePayload {
                    sender: e.sender.clone(),
                    content: e.content.clone(),
                })
                .collect(),
        }
    }
}

/// One candidate reply offered by the placebo persona.
///
/// `talk_placebo` always contributes candidates in pairs sharing a `pair`
/// index; the operator forwards one of the two and the whole pair is retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceboOption {
    pub text: String,
    pub pair: u32,
}

/// Holds placebo reply candidates until the operator picks one.
#[derive(Debug, Default)]
pub struct PlaceboBoard {
    options: Vec<PlaceboOption>,
    next_pair: u32,
}

impl PlaceboBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate pair, returning its pair index.
    pub fn add_pair(&mut self, first: impl Into<String>, second: impl Into<String>) -> u32 {
        self.next_pair += 1;
        let pair = self.next_pair;
        self.options.push(PlaceboOption {
            text: first.into(),
            pair,
        });
        self.options.push(PlaceboOption {
            text: second.into(),
            pair,
        });
        pair
    }

    pub fn options(&self) -> &[PlaceboOption] {
        &self.options
    }

    /// Pick one candidate by its position in the visible list. Returns the
    /// chosen text and removes every candidate of the same pair.
    pub fn choose(&mut self, index: usize) -> Option<String> {
        let chosen = self.options.get(index)?.clone();
        self.options.retain(|opt| opt.pair != chosen.pair);
        Some(chosen.text)
    }
}
