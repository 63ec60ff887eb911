use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::health::HealthSnapshot;
use crate::quorum::{effective_write_concern, election_quorum};
use crate::types::{LogCurrent, LogPlan, LogTerm, ParticipantId, TermIndexPair};

/// Why a participant could not take part in an election
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ElectionCode {
    /// The server is not healthy
    NotHealthy = 1,
    /// The participant did not report the current term
    TermNotConfirmed = 2,
    /// The participant is not allowed in the quorum
    Excluded = 3,
    /// The participant has no snapshot
    SnapshotMissing = 4,
}

impl From<ElectionCode> for u8 {
    fn from(code: ElectionCode) -> Self {
        code as Self
    }
}

impl TryFrom<u8> for ElectionCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::NotHealthy),
            2 => Ok(Self::TermNotConfirmed),
            3 => Ok(Self::Excluded),
            4 => Ok(Self::SnapshotMissing),
            other => Err(format!("unknown election code {other}")),
        }
    }
}

/// Per participant entry of an [`ElectionReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDetail {
    /// Failure code
    pub code: ElectionCode,
}

/// Outcome of an election attempt, stored in `Current/.../supervision/election`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionReport {
    /// Term the election ran in
    pub term: LogTerm,
    /// Participants needed to declare a leader
    pub participants_required: usize,
    /// Participants that could vote
    pub participants_available: usize,
    /// Participants that could not vote and why
    pub details: BTreeMap<ParticipantId, ElectionDetail>,
}

/// Result of [`run_election`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionOutcome {
    /// The chosen leader, if enough participants are available
    pub leader: Option<ParticipantId>,
    /// The report to store
    pub report: ElectionReport,
}

/// Elect a leader for the term of `plan`.
///
/// A participant votes when it is healthy, allowed in the quorum, reported
/// the plan term and holds a snapshot. Enough voters are needed that every
/// write quorum intersects them; the leader is the voter allowed as leader
/// with the highest spearhead, ties going to the smallest id.
#[must_use]
pub fn run_election(plan: &LogPlan, current: &LogCurrent, health: &HealthSnapshot) -> ElectionOutcome {
    let participants = &plan.participants_config.participants;
    let term = plan.term();

    let quorum_members = participants
        .iter()
        .filter(|(_, flags)| flags.allowed_in_quorum)
        .count();
    let healthy_members = participants
        .iter()
        .filter(|(pid, flags)| flags.allowed_in_quorum && health.is_healthy(pid))
        .count();
    let write_concern = effective_write_concern(&plan.participants_config.config, healthy_members);
    let required = election_quorum(quorum_members, write_concern).max(1);

    let mut details = BTreeMap::new();
    let mut candidates: Vec<(TermIndexPair, &ParticipantId)> = Vec::new();
    let mut available = 0;

    for (pid, flags) in participants {
        let local = current.local_state.get(pid);
        let code = if !health.is_healthy(pid) {
            Some(ElectionCode::NotHealthy)
        } else if !flags.allowed_in_quorum {
            Some(ElectionCode::Excluded)
        } else {
            match local {
                Some(state) if state.term != term => Some(ElectionCode::TermNotConfirmed),
                None => Some(ElectionCode::TermNotConfirmed),
                Some(state) if !state.snapshot.is_available() => Some(ElectionCode::SnapshotMissing),
                Some(_) => None,
            }
        };

        match (code, local) {
            (Some(code), _) => {
                details.insert(pid.clone(), ElectionDetail { code });
            }
            (None, Some(state)) => {
                available += 1;
                if flags.allowed_as_leader {
                    candidates.push((state.spearhead, pid));
                }
            }
            (None, None) => {}
        }
    }

    let leader = if available >= required {
        candidates
            .into_iter()
            .max_by_key(|(spearhead, pid)| (*spearhead, Reverse(*pid)))
            .map(|(_, pid)| pid.clone())
    } else {
        None
    };

    ElectionOutcome {
        leader,
        report: ElectionReport {
            term,
            participants_required: required,
            participants_available: available,
            details,
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{
        LocalState, LogConfig, LogId, LogIndex, ParticipantFlags, ParticipantsConfig, PlanTerm,
        SnapshotStatus,
    };

    fn plan(write_concern: usize, participants: &[(&str, ParticipantFlags)]) -> LogPlan {
        LogPlan {
            id: LogId::new(1),
            participants_config: ParticipantsConfig {
                generation: 1,
                participants: participants
                    .iter()
                    .map(|(pid, flags)| (ParticipantId::new(*pid), *flags))
                    .collect(),
                config: LogConfig::new(write_concern),
                effective_write_concern: write_concern,
            },
            current_term: PlanTerm {
                term: LogTerm::new(2),
                leader: None,
            },
            owner: "target".to_string(),
            properties: Default::default(),
        }
    }

    fn local(term: u64, spearhead: u64) -> LocalState {
        LocalState {
            term: LogTerm::new(term),
            spearhead: TermIndexPair::new(LogTerm::new(1), LogIndex::new(spearhead)),
            commit_index: LogIndex::new(spearhead),
            snapshot: SnapshotStatus::Available,
            allowed_in_quorum: true,
        }
    }

    fn current(states: &[(&str, LocalState)]) -> LogCurrent {
        LogCurrent {
            local_state: states
                .iter()
                .map(|(pid, state)| (ParticipantId::new(*pid), state.clone()))
                .collect(),
            ..LogCurrent::default()
        }
    }

    fn health(healthy: &[&str], failed: &[&str]) -> HealthSnapshot {
        HealthSnapshot::new(
            healthy
                .iter()
                .map(|pid| (ParticipantId::new(*pid), true))
                .chain(failed.iter().map(|pid| (ParticipantId::new(*pid), false))),
        )
    }

    #[test]
    fn test_elects_most_advanced_participant() {
        let flags = ParticipantFlags::default();
        let plan = plan(2, &[("a", flags), ("b", flags), ("c", flags)]);
        let current = current(&[("a", local(2, 5)), ("b", local(2, 7)), ("c", local(2, 7))]);

        let outcome = run_election(&plan, &current, &health(&["a", "b", "c"], &[]));
        assert_eq!(outcome.leader, Some(ParticipantId::new("b")));
        assert_eq!(outcome.report.participants_required, 2);
        assert_eq!(outcome.report.participants_available, 3);
        assert!(outcome.report.details.is_empty());
    }

    #[test]
    fn test_reports_failure_codes() {
        let flags = ParticipantFlags::default();
        let mut missing = local(2, 3);
        missing.snapshot = SnapshotStatus::Missing;
        let plan = plan(
            3,
            &[
                ("a", flags),
                ("b", flags),
                ("c", flags),
                ("d", ParticipantFlags::excluded()),
                ("e", flags),
            ],
        );
        let current = current(&[
            ("b", local(1, 3)),
            ("c", missing),
            ("d", local(2, 3)),
            ("e", local(2, 3)),
        ]);

        let outcome = run_election(&plan, &current, &health(&["b", "c", "d", "e"], &["a"]));
        assert_eq!(
            serde_json::to_value(&outcome.report.details).unwrap(),
            json!({
                "a": {"code": 1},
                "b": {"code": 2},
                "c": {"code": 4},
                "d": {"code": 3}
            })
        );
        // Four quorum members, three of them healthy: any 3-quorum needs 2 voters
        assert_eq!(outcome.report.participants_required, 2);
        assert_eq!(outcome.report.participants_available, 1);
        assert_eq!(outcome.leader, None);
    }

    #[test]
    fn test_declares_leader_without_write_quorum() {
        let flags = ParticipantFlags::default();
        let plan = plan(3, &[("a", flags), ("b", flags), ("c", flags)]);
        let current = current(&[("b", local(2, 4)), ("c", local(2, 4))]);

        let outcome = run_election(&plan, &current, &health(&["b", "c"], &["a"]));
        assert_eq!(outcome.leader, Some(ParticipantId::new("b")));
        assert_eq!(outcome.report.participants_required, 1);
        assert_eq!(
            outcome.report.details.get(&ParticipantId::new("a")),
            Some(&ElectionDetail {
                code: ElectionCode::NotHealthy
            })
        );
    }

    #[test]
    fn test_voter_not_allowed_as_leader() {
        let follower_only = ParticipantFlags {
            allowed_as_leader: false,
            ..ParticipantFlags::default()
        };
        let plan = plan(1, &[("a", follower_only)]);
        let current = current(&[("a", local(2, 1))]);

        let outcome = run_election(&plan, &current, &health(&["a"], &[]));
        assert_eq!(outcome.report.participants_available, 1);
        assert_eq!(outcome.leader, None);
    }
}
