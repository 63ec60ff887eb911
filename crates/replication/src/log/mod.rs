//! Replicated log replicas: the in-memory log, followers and leaders

mod leader;
mod participant;

pub use leader::{FollowerProgress, LogLeader};
pub use participant::LogParticipant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{LogIndex, LogTerm, ParticipantId, TermIndexPair};

/// Content of a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum LogPayload {
    /// The first entry written by every new leader
    FirstEntryOfTerm,
    /// Marks a participants config generation as part of the log
    ParticipantsConfig(u64),
    /// Application payload for the replicated state
    Data(Value),
}

/// One entry of a replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term the entry was written in
    pub term: LogTerm,
    /// Position in the log
    pub index: LogIndex,
    /// Content
    pub payload: LogPayload,
}

impl LogEntry {
    /// Term and index of the entry
    #[must_use]
    pub const fn position(&self) -> TermIndexPair {
        TermIndexPair::new(self.term, self.index)
    }
}

/// An ordered, gap-free sequence of log entries starting at index 1
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    entries: Vec<LogEntry>,
}

impl InMemoryLog {
    /// Create an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rebuild a log from a committed prefix
    #[must_use]
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry at the next index, returning that index
    pub fn append(&mut self, term: LogTerm, payload: LogPayload) -> LogIndex {
        let index = self.last_index().next();
        self.entries.push(LogEntry {
            term,
            index,
            payload,
        });
        index
    }

    /// Append a replicated entry; it must directly follow the current spearhead
    pub fn push(&mut self, entry: LogEntry) -> bool {
        if entry.index != self.last_index().next() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove every entry after `index`
    pub fn truncate_after(&mut self, index: LogIndex) {
        self.entries
            .truncate(usize::try_from(index.value()).unwrap_or(usize::MAX));
    }

    /// Index of the last entry, zero when empty
    #[must_use]
    pub fn last_index(&self) -> LogIndex {
        self.entries.last().map_or_else(LogIndex::default, |e| e.index)
    }

    /// Term and index of the last entry
    #[must_use]
    pub fn spearhead(&self) -> TermIndexPair {
        self.entries
            .last()
            .map_or_else(TermIndexPair::default, LogEntry::position)
    }

    /// Entry at `index`
    #[must_use]
    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        let position = usize::try_from(index.value()).ok()?.checked_sub(1)?;
        self.entries.get(position)
    }

    /// Term of the entry at `index`; index zero has the default term
    #[must_use]
    pub fn term_of(&self, index: LogIndex) -> Option<LogTerm> {
        if index == LogIndex::default() {
            return Some(LogTerm::default());
        }
        self.get(index).map(|e| e.term)
    }

    /// All entries from `from` (inclusive) to the end
    #[must_use]
    pub fn slice(&self, from: LogIndex) -> Vec<LogEntry> {
        let start = usize::try_from(from.value().max(1) - 1).unwrap_or(usize::MAX);
        self.entries.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Entries in `(after, up_to]`
    #[must_use]
    pub fn range(&self, after: LogIndex, up_to: LogIndex) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.index > after && e.index <= up_to)
            .cloned()
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replication request from a leader to a follower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesRequest {
    /// Term of the leader
    pub term: LogTerm,
    /// The sending leader
    pub leader: ParticipantId,
    /// Entry directly preceding `entries`
    pub prev_log_entry: TermIndexPair,
    /// Leader's commit index
    pub leader_commit: LogIndex,
    /// Entries to append
    pub entries: Vec<LogEntry>,
}

/// Follower answer to an [`AppendEntriesRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppendEntriesResult {
    /// Entries were appended
    Accepted {
        /// Spearhead after appending
        spearhead: TermIndexPair,
        /// Whether the follower holds a complete snapshot
        snapshot_available: bool,
    },
    /// The request came from a stale leader
    LowerTerm {
        /// The follower's term
        current: LogTerm,
    },
    /// The follower does not have the previous entry
    NoPrevLogMatch {
        /// The follower's spearhead
        spearhead: TermIndexPair,
    },
}
