use std::fmt;

use proven_agency::Transaction;
use serde_json::Value;

use super::election::ElectionReport;
use crate::error::ReplicationResult;
use crate::paths;
use crate::types::{GlobalLogId, LogPlan, ParticipantFlags, ParticipantId};

/// The single modification the supervision makes to a log in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do
    NoAction,
    /// The Target is gone: remove Plan and Current
    Cleanup,
    /// Create the first Plan of a log
    CreatePlan {
        /// The new plan
        plan: LogPlan,
    },
    /// Start a new term without leader because the leader failed
    DismissLeader {
        /// The failed leader
        leader: ParticipantId,
        /// Plan with the leaderless term
        plan: LogPlan,
    },
    /// Declare the winner of an election in a new term
    ElectLeader {
        /// Plan with the new leader
        plan: LogPlan,
        /// Election report
        report: ElectionReport,
    },
    /// Record a failed election
    WriteElectionReport {
        /// Election report
        report: ElectionReport,
    },
    /// Phase in a new participant with all flags off
    AddParticipant {
        /// New participant
        participant: ParticipantId,
        /// Plan with the participant
        plan: LogPlan,
    },
    /// Change the planned flags of a participant
    UpdateFlags {
        /// Participant
        participant: ParticipantId,
        /// New flags
        flags: ParticipantFlags,
        /// Plan with the flags
        plan: LogPlan,
    },
    /// Adopt the Target config
    UpdateConfig {
        /// Plan with the config
        plan: LogPlan,
    },
    /// Hand leadership to another participant in a new term
    SwitchLeader {
        /// New leader
        leader: ParticipantId,
        /// Plan with the new leader
        plan: LogPlan,
    },
    /// Drop a phased out participant
    RemoveParticipant {
        /// Removed participant
        participant: ParticipantId,
        /// Plan without the participant
        plan: LogPlan,
    },
    /// The Plan realizes this Target version
    AcknowledgeTargetVersion {
        /// Target version
        version: u64,
    },
}

impl Action {
    /// The plan written by this action, if any
    #[must_use]
    pub const fn plan(&self) -> Option<&LogPlan> {
        match self {
            Self::CreatePlan { plan }
            | Self::DismissLeader { plan, .. }
            | Self::ElectLeader { plan, .. }
            | Self::AddParticipant { plan, .. }
            | Self::UpdateFlags { plan, .. }
            | Self::UpdateConfig { plan }
            | Self::SwitchLeader { plan, .. }
            | Self::RemoveParticipant { plan, .. } => Some(plan),
            Self::NoAction
            | Self::Cleanup
            | Self::WriteElectionReport { .. }
            | Self::AcknowledgeTargetVersion { .. } => None,
        }
    }

    /// Operations implementing this action, conditioned on the plan that was
    /// read (`raw_plan`) still being in place.
    ///
    /// Returns an empty transaction for [`Action::NoAction`].
    pub fn into_transaction(
        self,
        log: &GlobalLogId,
        raw_plan: Option<&Value>,
    ) -> ReplicationResult<Transaction> {
        let plan_path = paths::plan(log);
        let supervision = paths::current_supervision(log);

        let transaction = match self {
            Self::NoAction => Transaction::new(),
            Self::Cleanup => {
                return Ok(Transaction::new()
                    .delete(plan_path)
                    .delete(paths::current(log))
                    .expect_empty(paths::target(log)));
            }
            Self::ElectLeader { plan, report } => Transaction::new()
                .set(plan_path.clone(), serde_json::to_value(&plan)?)
                .set(supervision.join("election"), serde_json::to_value(&report)?),
            Self::WriteElectionReport { report } => Transaction::new()
                .set(supervision.join("election"), serde_json::to_value(&report)?),
            Self::AcknowledgeTargetVersion { version } => {
                Transaction::new().set(supervision.join("targetVersion"), version)
            }
            Self::CreatePlan { plan }
            | Self::DismissLeader { plan, .. }
            | Self::AddParticipant { plan, .. }
            | Self::UpdateFlags { plan, .. }
            | Self::UpdateConfig { plan }
            | Self::SwitchLeader { plan, .. }
            | Self::RemoveParticipant { plan, .. } => {
                Transaction::new().set(plan_path.clone(), serde_json::to_value(&plan)?)
            }
        };

        Ok(transaction.expect_old_or_empty(plan_path, raw_plan.cloned()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "no action"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::CreatePlan { plan } => write!(f, "create plan with term {}", plan.term()),
            Self::DismissLeader { leader, plan } => {
                write!(f, "dismiss leader {leader}, term {}", plan.term())
            }
            Self::ElectLeader { plan, .. } => match plan.leader() {
                Some(leader) => write!(f, "elect {leader} in term {}", plan.term()),
                None => write!(f, "elect in term {}", plan.term()),
            },
            Self::WriteElectionReport { report } => {
                write!(f, "election in term {} failed", report.term)
            }
            Self::AddParticipant { participant, .. } => write!(f, "add participant {participant}"),
            Self::UpdateFlags {
                participant, flags, ..
            } => write!(f, "update flags of {participant} to {flags:?}"),
            Self::UpdateConfig { plan } => write!(
                f,
                "update config to generation {}",
                plan.participants_config.generation
            ),
            Self::SwitchLeader { leader, plan } => {
                write!(f, "switch leader to {leader} in term {}", plan.term())
            }
            Self::RemoveParticipant { participant, .. } => {
                write!(f, "remove participant {participant}")
            }
            Self::AcknowledgeTargetVersion { version } => {
                write!(f, "acknowledge target version {version}")
            }
        }
    }
}
