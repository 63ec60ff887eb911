use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::LogEntry;
use crate::types::{LogIndex, LogTerm};

/// Progress of a participant's state snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotStatus {
    /// No usable snapshot, entries cannot be applied
    #[default]
    Missing,
    /// A snapshot is being fetched from the leader
    Transferring,
    /// The local state is complete
    Available,
}

impl SnapshotStatus {
    /// Whether the snapshot is complete
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// A snapshot served by a leader: the state machine contents at the commit
/// index together with the committed log prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    /// Term of the serving leader
    pub term: LogTerm,
    /// Index the state corresponds to
    pub commit_index: LogIndex,
    /// Serialized state machine
    pub state: Value,
    /// Committed entries up to and including `commit_index`
    pub entries: Vec<LogEntry>,
}
