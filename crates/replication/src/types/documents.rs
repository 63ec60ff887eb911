//! Target, Plan and Current documents of a replicated log as stored in the agency

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ReplicationResult};
use crate::state::StateImplementation;
use crate::supervision::{ElectionReport, StatusReport};
use crate::types::{LogId, LogIndex, LogTerm, ParticipantId, SnapshotStatus, TermIndexPair};

/// Write concern settings of a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Acknowledgements required before an entry commits
    pub write_concern: usize,
    /// Preferred number of acknowledgements while enough servers are available
    pub soft_write_concern: usize,
    /// Whether followers sync before acknowledging
    #[serde(default)]
    pub wait_for_sync: bool,
}

impl LogConfig {
    /// Config with `soft_write_concern == write_concern`
    #[must_use]
    pub const fn new(write_concern: usize) -> Self {
        Self {
            write_concern,
            soft_write_concern: write_concern,
            wait_for_sync: false,
        }
    }

    /// Set the soft write concern
    #[must_use]
    pub const fn with_soft_write_concern(mut self, soft_write_concern: usize) -> Self {
        self.soft_write_concern = soft_write_concern;
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A log config together with the replication factor it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Number of participants
    pub replication_factor: usize,
    /// Hard acknowledgement threshold
    pub write_concern: usize,
    /// Soft acknowledgement threshold
    pub soft_write_concern: usize,
    /// Whether followers sync before acknowledging
    pub wait_for_sync: bool,
}

impl TargetConfig {
    /// Combine a replication factor with a log config
    #[must_use]
    pub const fn new(replication_factor: usize, config: LogConfig) -> Self {
        Self {
            replication_factor,
            write_concern: config.write_concern,
            soft_write_concern: config.soft_write_concern,
            wait_for_sync: config.wait_for_sync,
        }
    }

    /// Reject structurally impossible configurations
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.replication_factor == 0 {
            return Err(Error::invalid_config("a log needs at least one participant"));
        }
        if self.write_concern == 0 {
            return Err(Error::invalid_config("writeConcern must be at least 1"));
        }
        if self.write_concern > self.replication_factor {
            return Err(Error::invalid_config(format!(
                "writeConcern {} exceeds replicationFactor {}",
                self.write_concern, self.replication_factor
            )));
        }
        if self.soft_write_concern < self.write_concern {
            return Err(Error::invalid_config(format!(
                "softWriteConcern {} is below writeConcern {}",
                self.soft_write_concern, self.write_concern
            )));
        }
        Ok(())
    }
}

/// Per-participant flags used to phase servers in and out of a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantFlags {
    /// Always counted in the write quorum
    pub forced: bool,
    /// Acknowledgements count towards the write concern
    pub allowed_in_quorum: bool,
    /// May be elected leader
    pub allowed_as_leader: bool,
}

impl ParticipantFlags {
    /// Flags of a participant that takes no part in quorums or elections
    #[must_use]
    pub const fn excluded() -> Self {
        Self {
            forced: false,
            allowed_in_quorum: false,
            allowed_as_leader: false,
        }
    }
}

impl Default for ParticipantFlags {
    fn default() -> Self {
        Self {
            forced: false,
            allowed_in_quorum: true,
            allowed_as_leader: true,
        }
    }
}

/// Participants of a log and their flags
pub type ParticipantsFlagsMap = BTreeMap<ParticipantId, ParticipantFlags>;

/// Which state machine runs on top of the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationProperties {
    /// Implementation type
    #[serde(rename = "type")]
    pub kind: StateImplementation,
}

/// Properties of a replicated state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogProperties {
    /// State machine implementation
    pub implementation: ImplementationProperties,
}

/// Desired state of a log, written by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTarget {
    /// Log id
    pub id: LogId,
    /// Desired participants
    pub participants: ParticipantsFlagsMap,
    /// Desired write concern
    pub config: LogConfig,
    /// Explicitly requested leader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<ParticipantId>,
    /// Bumped on every modification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Replicated state properties
    #[serde(default)]
    pub properties: LogProperties,
}

impl LogTarget {
    /// A fresh target with default flags for every participant
    pub fn new(
        id: LogId,
        participants: impl IntoIterator<Item = ParticipantId>,
        config: LogConfig,
        implementation: StateImplementation,
    ) -> Self {
        Self {
            id,
            participants: participants
                .into_iter()
                .map(|pid| (pid, ParticipantFlags::default()))
                .collect(),
            config,
            leader: None,
            version: Some(1),
            properties: LogProperties {
                implementation: ImplementationProperties {
                    kind: implementation,
                },
            },
        }
    }

    /// The target config including the replication factor
    #[must_use]
    pub fn target_config(&self) -> TargetConfig {
        TargetConfig::new(self.participants.len(), self.config)
    }

    /// The target version, zero if never set
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.unwrap_or(0)
    }

    /// Reject targets that can never be realized
    pub fn validate(&self) -> ReplicationResult<()> {
        self.target_config().validate()?;
        if let Some(leader) = &self.leader {
            if !self.participants.contains_key(leader) {
                return Err(Error::invalid_config(format!(
                    "leader {leader} is not a participant"
                )));
            }
        }
        Ok(())
    }
}

/// The agreed participant configuration of a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsConfig {
    /// Bumped whenever participants, flags or config change
    pub generation: u64,
    /// Participants and their flags
    pub participants: ParticipantsFlagsMap,
    /// Write concern settings
    pub config: LogConfig,
    /// Write concern the leader uses for commits
    pub effective_write_concern: usize,
}

/// The term of a plan and its leader, if one was elected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTerm {
    /// Current term
    pub term: LogTerm,
    /// Leader of the term
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<ParticipantId>,
}

/// The plan of a log, written only by supervision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPlan {
    /// Log id
    pub id: LogId,
    /// Participants configuration
    pub participants_config: ParticipantsConfig,
    /// Current term
    pub current_term: PlanTerm,
    /// Who owns the plan
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Replicated state properties copied from the target
    #[serde(default)]
    pub properties: LogProperties,
}

fn default_owner() -> String {
    "target".to_string()
}

impl LogPlan {
    /// Flags of a planned participant
    #[must_use]
    pub fn flags(&self, participant: &ParticipantId) -> Option<&ParticipantFlags> {
        self.participants_config.participants.get(participant)
    }

    /// The planned leader
    #[must_use]
    pub const fn leader(&self) -> Option<&ParticipantId> {
        self.current_term.leader.as_ref()
    }

    /// The planned term
    #[must_use]
    pub const fn term(&self) -> LogTerm {
        self.current_term.term
    }
}

/// What a participant reports about its replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    /// Term the participant is in
    pub term: LogTerm,
    /// Last entry of the local log
    pub spearhead: TermIndexPair,
    /// Local commit index
    pub commit_index: LogIndex,
    /// Snapshot status
    pub snapshot: SnapshotStatus,
    /// Planned flag gated by snapshot availability
    pub allowed_in_quorum: bool,
}

/// What the leader reports about its term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderStatus {
    /// Term of the leader
    pub term: LogTerm,
    /// The leading server
    pub server_id: ParticipantId,
    /// Whether the first entry of the term committed
    pub leadership_established: bool,
    /// Commit index of the leader
    pub commit_index: LogIndex,
    /// Latest participants config generation committed to the log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_participants_config: Option<u64>,
}

/// Supervision feedback stored alongside Current
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrentSupervision {
    /// Last target version the plan converged to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<u64>,
    /// Outstanding conditions blocking convergence
    pub status_report: StatusReport,
    /// Result of the latest election attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub election: Option<ElectionReport>,
}

/// Observed state of a log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogCurrent {
    /// Reports of the individual participants
    pub local_state: BTreeMap<ParticipantId, LocalState>,
    /// Report of the leader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<LeaderStatus>,
    /// Supervision feedback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervision: Option<CurrentSupervision>,
}
