use serde::{Deserialize, Serialize};

use crate::types::ParticipantId;

/// A condition that keeps a log from converging to its Target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatusReportEntry {
    /// The participant has no snapshot and cannot be phased in yet
    ServerSnapshotMissing {
        /// Participant without snapshot
        participant: ParticipantId,
    },
    /// Removing the participant would leave too few participants with a snapshot
    InsufficientSnapshotCoverage {
        /// Participant that cannot be removed yet
        participant: ParticipantId,
    },
    /// No participant can be elected
    LeaderElectionImpossible,
    /// The Target leader cannot lead this log
    TargetLeaderInvalid {
        /// Requested leader
        participant: ParticipantId,
    },
    /// The Target leader is not caught up yet
    TargetLeaderNotReady {
        /// Requested leader
        participant: ParticipantId,
    },
    /// The Target was rejected
    TargetConfigInvalid {
        /// Validation failure
        reason: String,
    },
}

/// Outstanding conditions of a log, written to `Current/.../supervision/statusReport`
pub type StatusReport = Vec<StatusReportEntry>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_report_format() {
        let report: StatusReport = vec![
            StatusReportEntry::ServerSnapshotMissing {
                participant: "PRMR-4".into(),
            },
            StatusReportEntry::LeaderElectionImpossible,
        ];
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!([
                {"type": "ServerSnapshotMissing", "participant": "PRMR-4"},
                {"type": "LeaderElectionImpossible"}
            ])
        );
    }
}
