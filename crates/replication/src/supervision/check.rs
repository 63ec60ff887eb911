use std::cmp::Reverse;

use proven_agency::Transaction;

use super::action::Action;
use super::election::run_election;
use super::status::{StatusReport, StatusReportEntry};
use crate::error::ReplicationResult;
use crate::health::HealthSnapshot;
use crate::paths;
use crate::quorum::effective_write_concern;
use crate::types::{
    GlobalLogId, LeaderStatus, LogCurrent, LogPlan, LogTarget, LogTerm, ParticipantFlags,
    ParticipantId, ParticipantsConfig, ParticipantsFlagsMap, PlanTerm,
};
use crate::view::LogView;

/// Everything the supervision looks at when checking one log
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// The log
    pub log: &'a GlobalLogId,
    /// Its Target, Plan and Current
    pub view: &'a LogView,
    /// Server health
    pub health: &'a HealthSnapshot,
}

/// The decision of one supervision round for one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// What to change
    pub action: Action,
    /// Conditions blocking convergence; `None` when no report applies
    pub status_report: Option<StatusReport>,
}

impl CheckResult {
    fn new(action: Action, status_report: StatusReport) -> Self {
        Self {
            action,
            status_report: Some(status_report),
        }
    }

    /// The transaction to write, `None` if nothing changes.
    ///
    /// The status report is only written when it differs from the stored one.
    pub fn into_transaction(
        self,
        log: &GlobalLogId,
        view: &LogView,
    ) -> ReplicationResult<Option<Transaction>> {
        let mut transaction = self.action.into_transaction(log, view.raw_plan.as_ref())?;

        if let Some(report) = self.status_report {
            let stored = view
                .current
                .as_ref()
                .and_then(|current| current.supervision.as_ref())
                .map(|supervision| supervision.status_report.as_slice())
                .unwrap_or_default();
            if stored != report.as_slice() {
                transaction = transaction.set(
                    paths::current_supervision(log).join("statusReport"),
                    serde_json::to_value(&report)?,
                );
            }
        }

        Ok((!transaction.is_empty()).then_some(transaction))
    }
}

/// Decide the next step that brings a log closer to its Target.
///
/// At most one action is taken per round, in priority order: cleanup,
/// plan creation, failover, election, adding participants, flag updates,
/// config updates, leadership transfer, participant removal and finally
/// acknowledging the Target version.
#[must_use]
pub fn check_replicated_log(ctx: &CheckContext<'_>) -> CheckResult {
    let view = ctx.view;

    let Some(target) = &view.target else {
        let action = if view.plan.is_some() || view.current.is_some() {
            Action::Cleanup
        } else {
            Action::NoAction
        };
        return CheckResult {
            action,
            status_report: None,
        };
    };

    let mut report = StatusReport::new();
    if let Err(e) = target.validate() {
        report.push(StatusReportEntry::TargetConfigInvalid {
            reason: e.to_string(),
        });
        return CheckResult::new(Action::NoAction, report);
    }

    let Some(plan) = &view.plan else {
        let plan = initial_plan(target, ctx.health);
        return CheckResult::new(Action::CreatePlan { plan }, report);
    };

    let empty = LogCurrent::default();
    let checker = Checker {
        target,
        plan,
        current: view.current.as_ref().unwrap_or(&empty),
        health: ctx.health,
    };
    let action = checker.check(&mut report);
    CheckResult::new(action, report)
}

/// The first plan: term 1, led by the Target leader or the first healthy
/// participant allowed to lead
fn initial_plan(target: &LogTarget, health: &HealthSnapshot) -> LogPlan {
    let leader = target
        .leader
        .clone()
        .filter(|leader| health.is_healthy(leader))
        .or_else(|| {
            target
                .participants
                .iter()
                .find(|(pid, flags)| flags.allowed_as_leader && health.is_healthy(pid))
                .map(|(pid, _)| pid.clone())
        });

    LogPlan {
        id: target.id,
        participants_config: ParticipantsConfig {
            generation: 1,
            participants: target.participants.clone(),
            config: target.config,
            effective_write_concern: planned_write_concern(target, &target.participants, health),
        },
        current_term: PlanTerm {
            term: LogTerm::new(1),
            leader,
        },
        owner: "target".to_string(),
        properties: target.properties,
    }
}

fn planned_write_concern(
    target: &LogTarget,
    participants: &ParticipantsFlagsMap,
    health: &HealthSnapshot,
) -> usize {
    let available = participants
        .iter()
        .filter(|(pid, flags)| flags.allowed_in_quorum && health.is_healthy(pid))
        .count();
    effective_write_concern(&target.config, available)
}

struct Checker<'a> {
    target: &'a LogTarget,
    plan: &'a LogPlan,
    current: &'a LogCurrent,
    health: &'a HealthSnapshot,
}

impl Checker<'_> {
    fn check(&self, report: &mut StatusReport) -> Action {
        if let Some(action) = self.check_leader(report) {
            return action;
        }
        if let Some(action) = self.check_added_participants() {
            return action;
        }
        if let Some(action) = self.check_flags(report) {
            return action;
        }
        if let Some(action) = self.check_config() {
            return action;
        }
        if let Some(action) = self.check_target_leader(report) {
            return action;
        }
        if let Some(action) = self.check_removed_participants(report) {
            return action;
        }
        self.check_converged()
    }

    fn check_leader(&self, report: &mut StatusReport) -> Option<Action> {
        if let Some(leader) = self.plan.leader() {
            if self.health.is_healthy(leader) {
                return None;
            }
            return Some(Action::DismissLeader {
                leader: leader.clone(),
                plan: self.next_term(None),
            });
        }

        let outcome = run_election(self.plan, self.current, self.health);
        if let Some(leader) = outcome.leader {
            return Some(Action::ElectLeader {
                plan: self.next_term(Some(leader)),
                report: outcome.report,
            });
        }

        report.push(StatusReportEntry::LeaderElectionImpossible);
        let stored = self
            .current
            .supervision
            .as_ref()
            .and_then(|supervision| supervision.election.as_ref());
        if stored == Some(&outcome.report) {
            Some(Action::NoAction)
        } else {
            Some(Action::WriteElectionReport {
                report: outcome.report,
            })
        }
    }

    fn check_added_participants(&self) -> Option<Action> {
        let participant = self
            .target
            .participants
            .keys()
            .find(|pid| self.plan.flags(pid).is_none())?;

        let mut plan = self.next_generation();
        plan.participants_config
            .participants
            .insert(participant.clone(), ParticipantFlags::excluded());
        Some(Action::AddParticipant {
            participant: participant.clone(),
            plan,
        })
    }

    fn check_flags(&self, report: &mut StatusReport) -> Option<Action> {
        for (participant, desired) in &self.target.participants {
            let Some(planned) = self.plan.flags(participant) else {
                continue;
            };
            if planned == desired {
                continue;
            }

            let promotes = (desired.allowed_in_quorum && !planned.allowed_in_quorum)
                || (desired.allowed_as_leader && !planned.allowed_as_leader)
                || (desired.forced && !planned.forced);
            if promotes && !self.is_ready(participant) {
                report.push(StatusReportEntry::ServerSnapshotMissing {
                    participant: participant.clone(),
                });
                continue;
            }

            return Some(self.update_flags(participant, *desired));
        }
        None
    }

    fn check_config(&self) -> Option<Action> {
        let planned = &self.plan.participants_config;
        let write_concern =
            planned_write_concern(self.target, &planned.participants, self.health);
        if planned.config == self.target.config && planned.effective_write_concern == write_concern
        {
            return None;
        }

        let mut plan = self.next_generation();
        plan.participants_config.config = self.target.config;
        plan.participants_config.effective_write_concern = write_concern;
        Some(Action::UpdateConfig { plan })
    }

    fn check_target_leader(&self, report: &mut StatusReport) -> Option<Action> {
        let wanted = self.target.leader.as_ref()?;
        if self.plan.leader() == Some(wanted) {
            return None;
        }

        let allowed_by_target = self
            .target
            .participants
            .get(wanted)
            .is_some_and(|flags| flags.allowed_as_leader);
        if !allowed_by_target {
            report.push(StatusReportEntry::TargetLeaderInvalid {
                participant: wanted.clone(),
            });
            return None;
        }

        let allowed_by_plan = self
            .plan
            .flags(wanted)
            .is_some_and(|flags| flags.allowed_as_leader);
        if allowed_by_plan && self.is_caught_up(wanted) {
            return Some(Action::SwitchLeader {
                leader: wanted.clone(),
                plan: self.next_term(Some(wanted.clone())),
            });
        }

        report.push(StatusReportEntry::TargetLeaderNotReady {
            participant: wanted.clone(),
        });
        None
    }

    fn check_removed_participants(&self, report: &mut StatusReport) -> Option<Action> {
        let generation = self.plan.participants_config.generation;

        for (participant, flags) in &self.plan.participants_config.participants {
            if self.target.participants.contains_key(participant) {
                continue;
            }

            if self.plan.leader() == Some(participant) {
                match self.successor() {
                    Some(leader) => {
                        return Some(Action::SwitchLeader {
                            plan: self.next_term(Some(leader.clone())),
                            leader,
                        });
                    }
                    None => {
                        report.push(StatusReportEntry::InsufficientSnapshotCoverage {
                            participant: participant.clone(),
                        });
                        continue;
                    }
                }
            }

            let covered = self.target.participants.iter().all(|(pid, desired)| {
                self.plan.flags(pid) == Some(desired) && self.is_ready(pid)
            });
            if !covered {
                report.push(StatusReportEntry::InsufficientSnapshotCoverage {
                    participant: participant.clone(),
                });
                continue;
            }

            if *flags != ParticipantFlags::excluded() {
                return Some(self.update_flags(participant, ParticipantFlags::excluded()));
            }

            // Only drop the participant once its demotion is committed
            let committed = self
                .established_leader()
                .and_then(|status| status.committed_participants_config);
            if committed.is_some_and(|committed| committed >= generation) {
                let mut plan = self.next_generation();
                plan.participants_config.participants.remove(participant);
                return Some(Action::RemoveParticipant {
                    participant: participant.clone(),
                    plan,
                });
            }
        }
        None
    }

    fn check_converged(&self) -> Action {
        let planned = &self.plan.participants_config;
        let converged = planned.participants == self.target.participants
            && planned.config == self.target.config
            && self
                .target
                .leader
                .as_ref()
                .is_none_or(|leader| self.plan.leader() == Some(leader))
            && self.established_leader().is_some();
        if !converged {
            return Action::NoAction;
        }

        let Some(version) = self.target.version else {
            return Action::NoAction;
        };
        let acknowledged = self
            .current
            .supervision
            .as_ref()
            .and_then(|supervision| supervision.target_version);
        if acknowledged == Some(version) {
            Action::NoAction
        } else {
            Action::AcknowledgeTargetVersion { version }
        }
    }

    /// Healthy and holding a snapshot
    fn is_ready(&self, participant: &ParticipantId) -> bool {
        self.health.is_healthy(participant)
            && self
                .current
                .local_state
                .get(participant)
                .is_some_and(|state| state.snapshot.is_available())
    }

    /// Ready, on the plan term and holding everything the leader committed
    fn is_caught_up(&self, participant: &ParticipantId) -> bool {
        let Some(leader) = self.established_leader() else {
            return false;
        };
        self.is_ready(participant)
            && self
                .current
                .local_state
                .get(participant)
                .is_some_and(|state| {
                    state.term == self.plan.term() && state.spearhead.index >= leader.commit_index
                })
    }

    fn established_leader(&self) -> Option<&LeaderStatus> {
        self.current.leader.as_ref().filter(|status| {
            status.term == self.plan.term()
                && status.leadership_established
                && Some(&status.server_id) == self.plan.leader()
        })
    }

    /// The best caught up Target participant to take over leadership
    fn successor(&self) -> Option<ParticipantId> {
        self.target
            .participants
            .keys()
            .filter(|pid| {
                self.plan.leader() != Some(*pid)
                    && self
                        .plan
                        .flags(pid)
                        .is_some_and(|flags| flags.allowed_as_leader)
                    && self.is_caught_up(pid)
            })
            .filter_map(|pid| {
                self.current
                    .local_state
                    .get(pid)
                    .map(|state| (state.spearhead, pid))
            })
            .max_by_key(|(spearhead, pid)| (*spearhead, Reverse(*pid)))
            .map(|(_, pid)| pid.clone())
    }

    fn next_term(&self, leader: Option<ParticipantId>) -> LogPlan {
        let mut plan = self.plan.clone();
        plan.current_term = PlanTerm {
            term: self.plan.term().next(),
            leader,
        };
        plan
    }

    fn next_generation(&self) -> LogPlan {
        let mut plan = self.plan.clone();
        plan.participants_config.generation += 1;
        plan
    }

    fn update_flags(&self, participant: &ParticipantId, flags: ParticipantFlags) -> Action {
        let mut plan = self.next_generation();
        plan.participants_config
            .participants
            .insert(participant.clone(), flags);
        Action::UpdateFlags {
            participant: participant.clone(),
            flags,
            plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::state::StateImplementation;
    use crate::supervision::election::ElectionCode;
    use crate::types::{
        CurrentSupervision, LocalState, LogConfig, LogId, LogIndex, SnapshotStatus, TermIndexPair,
    };

    fn log() -> GlobalLogId {
        GlobalLogId::new("db", LogId::new(12))
    }

    fn ids(ids: &[&str]) -> Vec<ParticipantId> {
        ids.iter().copied().map(ParticipantId::new).collect()
    }

    fn target(participants: &[&str], write_concern: usize) -> LogTarget {
        LogTarget::new(
            LogId::new(12),
            ids(participants),
            LogConfig::new(write_concern),
            StateImplementation::BlackHole,
        )
    }

    fn healthy(servers: &[&str]) -> HealthSnapshot {
        HealthSnapshot::new(ids(servers).into_iter().map(|pid| (pid, true)))
    }

    fn local(term: u64, index: u64) -> LocalState {
        LocalState {
            term: LogTerm::new(term),
            spearhead: TermIndexPair::new(LogTerm::new(term), LogIndex::new(index)),
            commit_index: LogIndex::new(index),
            snapshot: SnapshotStatus::Available,
            allowed_in_quorum: true,
        }
    }

    fn established(plan: &LogPlan, commit: u64) -> LeaderStatus {
        LeaderStatus {
            term: plan.term(),
            server_id: plan.leader().cloned().unwrap(),
            leadership_established: true,
            commit_index: LogIndex::new(commit),
            committed_participants_config: Some(plan.participants_config.generation),
        }
    }

    /// A log whose plan realizes `target` and whose participants all report
    fn converged(target: &LogTarget, health: &HealthSnapshot) -> LogView {
        let plan = initial_plan(target, health);
        let current = LogCurrent {
            local_state: target
                .participants
                .keys()
                .map(|pid| (pid.clone(), local(1, 3)))
                .collect(),
            leader: Some(established(&plan, 3)),
            supervision: Some(CurrentSupervision {
                target_version: target.version,
                ..CurrentSupervision::default()
            }),
        };
        view(Some(target.clone()), Some(plan), Some(current))
    }

    fn view(target: Option<LogTarget>, plan: Option<LogPlan>, current: Option<LogCurrent>) -> LogView {
        LogView {
            target,
            raw_plan: plan.as_ref().map(|plan| serde_json::to_value(plan).unwrap()),
            plan,
            current,
        }
    }

    fn check(view: &LogView, health: &HealthSnapshot) -> CheckResult {
        check_replicated_log(&CheckContext {
            log: &log(),
            view,
            health,
        })
    }

    #[test]
    fn test_cleanup_when_target_is_gone() {
        let health = healthy(&["a", "b", "c"]);
        let mut view = converged(&target(&["a", "b", "c"], 2), &health);
        view.target = None;

        let result = check(&view, &health);
        assert_eq!(result.action, Action::Cleanup);

        let transaction = result.into_transaction(&log(), &view).unwrap().unwrap();
        assert_eq!(transaction.operations().len(), 2);
        assert_eq!(transaction.preconditions()[0].0, paths::target(&log()));

        let gone = LogView::default();
        assert_eq!(check(&gone, &health).action, Action::NoAction);
    }

    #[test]
    fn test_invalid_target_is_reported_not_planned() {
        let health = healthy(&["a", "b"]);
        let view = view(Some(target(&["a", "b"], 3)), None, None);

        let result = check(&view, &health);
        assert_eq!(result.action, Action::NoAction);
        assert_matches!(
            result.status_report.as_deref(),
            Some([StatusReportEntry::TargetConfigInvalid { .. }])
        );

        let transaction = result.into_transaction(&log(), &view).unwrap().unwrap();
        assert_eq!(transaction.operations().len(), 1);
    }

    #[test]
    fn test_initial_plan_prefers_healthy_target_leader() {
        let mut target = target(&["a", "b", "c"], 2);
        target.leader = Some("c".into());
        let health = HealthSnapshot::new([
            (ParticipantId::new("a"), false),
            (ParticipantId::new("b"), true),
            (ParticipantId::new("c"), true),
        ]);

        let result = check(&view(Some(target.clone()), None, None), &health);
        let plan = assert_matches!(result.action, Action::CreatePlan { plan } => plan);
        assert_eq!(plan.term(), LogTerm::new(1));
        assert_eq!(plan.leader(), Some(&ParticipantId::new("c")));
        assert_eq!(plan.participants_config.participants, target.participants);
        assert_eq!(plan.participants_config.generation, 1);

        target.leader = None;
        let result = check(&view(Some(target), None, None), &health);
        let plan = assert_matches!(result.action, Action::CreatePlan { plan } => plan);
        assert_eq!(plan.leader(), Some(&ParticipantId::new("b")));
    }

    #[test]
    fn test_converged_log_needs_no_write() {
        let health = healthy(&["a", "b", "c"]);
        let view = converged(&target(&["a", "b", "c"], 2), &health);

        let result = check(&view, &health);
        assert_eq!(result.action, Action::NoAction);
        assert_eq!(result.into_transaction(&log(), &view).unwrap(), None);
    }

    #[test]
    fn test_acknowledges_new_target_version() {
        let health = healthy(&["a", "b", "c"]);
        let mut view = converged(&target(&["a", "b", "c"], 2), &health);
        view.target.as_mut().unwrap().version = Some(5);

        let result = check(&view, &health);
        assert_eq!(result.action, Action::AcknowledgeTargetVersion { version: 5 });
    }

    #[test]
    fn test_failed_leader_is_dismissed_in_new_term() {
        let health = healthy(&["a", "b", "c"]);
        let view = converged(&target(&["a", "b", "c"], 2), &health);
        let leader = view.plan.as_ref().unwrap().leader().cloned().unwrap();

        let health = HealthSnapshot::new(
            ids(&["a", "b", "c"])
                .into_iter()
                .map(|pid| (pid.clone(), pid != leader)),
        );
        let result = check(&view, &health);
        let plan = assert_matches!(result.action, Action::DismissLeader { plan, .. } => plan);
        assert_eq!(plan.term(), LogTerm::new(2));
        assert_eq!(plan.leader(), None);
    }

    #[test]
    fn test_election_after_dismissal() {
        let health = HealthSnapshot::new([
            (ParticipantId::new("a"), false),
            (ParticipantId::new("b"), true),
            (ParticipantId::new("c"), true),
        ]);
        let target = target(&["a", "b", "c"], 2);
        let mut plan = initial_plan(&target, &healthy(&["a", "b", "c"]));
        plan.current_term = PlanTerm {
            term: LogTerm::new(2),
            leader: None,
        };
        let current = LogCurrent {
            local_state: [
                (ParticipantId::new("a"), local(1, 3)),
                (ParticipantId::new("b"), local(2, 3)),
                (ParticipantId::new("c"), local(2, 4)),
            ]
            .into_iter()
            .collect(),
            ..LogCurrent::default()
        };
        let view = view(Some(target), Some(plan), Some(current));

        let result = check(&view, &health);
        let (plan, report) =
            assert_matches!(result.action.clone(), Action::ElectLeader { plan, report } => (plan, report));
        assert_eq!(plan.term(), LogTerm::new(3));
        assert_eq!(plan.leader(), Some(&ParticipantId::new("c")));
        assert_eq!(report.term, LogTerm::new(2));
        assert_eq!(
            report.details.get(&ParticipantId::new("a")).map(|d| d.code),
            Some(ElectionCode::NotHealthy)
        );

        let transaction = result.into_transaction(&log(), &view).unwrap().unwrap();
        assert_eq!(
            transaction.preconditions()[0].0,
            paths::plan(&log()),
        );
    }

    #[test]
    fn test_failed_election_report_written_once() {
        let health = healthy(&["a"]);
        let target = target(&["a", "b", "c"], 3);
        let mut plan = initial_plan(&target, &healthy(&["a", "b", "c"]));
        plan.current_term = PlanTerm {
            term: LogTerm::new(2),
            leader: None,
        };
        let mut view = view(Some(target), Some(plan), Some(LogCurrent::default()));

        let result = check(&view, &health);
        let report = assert_matches!(result.action, Action::WriteElectionReport { report } => report);
        assert_eq!(report.details.len(), 3);
        assert_eq!(
            result.status_report,
            Some(vec![StatusReportEntry::LeaderElectionImpossible])
        );

        view.current = Some(LogCurrent {
            supervision: Some(CurrentSupervision {
                election: Some(report),
                status_report: vec![StatusReportEntry::LeaderElectionImpossible],
                target_version: None,
            }),
            ..LogCurrent::default()
        });
        let result = check(&view, &health);
        assert_eq!(result.action, Action::NoAction);
        assert_eq!(result.into_transaction(&log(), &view).unwrap(), None);
    }

    #[test]
    fn test_replacement_waits_for_snapshot() {
        let health = healthy(&["a", "b", "c"]);
        let mut view = converged(&target(&["a", "b", "c"], 2), &health);
        let leader = view.plan.as_ref().unwrap().leader().cloned().unwrap();
        assert_eq!(leader, ParticipantId::new("a"));

        // Replace b by d while d is down
        let target = view.target.as_mut().unwrap();
        let flags = target.participants.remove(&ParticipantId::new("b")).unwrap();
        target.participants.insert("d".into(), flags);
        target.version = Some(2);
        let health = HealthSnapshot::new([
            (ParticipantId::new("a"), true),
            (ParticipantId::new("b"), true),
            (ParticipantId::new("c"), true),
            (ParticipantId::new("d"), false),
        ]);

        let result = check(&view, &health);
        let plan = assert_matches!(
            result.action,
            Action::AddParticipant { participant, plan } if participant.as_str() == "d" => plan
        );
        assert_eq!(
            plan.flags(&"d".into()),
            Some(&ParticipantFlags::excluded())
        );
        assert_eq!(plan.participants_config.generation, 2);

        view.raw_plan = Some(serde_json::to_value(&plan).unwrap());
        view.plan = Some(plan);
        let result = check(&view, &health);
        assert_eq!(result.action, Action::NoAction);
        assert_eq!(
            result.status_report,
            Some(vec![
                StatusReportEntry::ServerSnapshotMissing {
                    participant: "d".into()
                },
                StatusReportEntry::InsufficientSnapshotCoverage {
                    participant: "b".into()
                },
            ])
        );

        // d comes up and receives its snapshot
        let health = healthy(&["a", "b", "c", "d"]);
        view.current
            .as_mut()
            .unwrap()
            .local_state
            .insert("d".into(), local(1, 3));
        let result = check(&view, &health);
        let plan = assert_matches!(
            result.action,
            Action::UpdateFlags { participant, plan, .. } if participant.as_str() == "d" => plan
        );

        view.raw_plan = Some(serde_json::to_value(&plan).unwrap());
        view.plan = Some(plan);
        let result = check(&view, &health);
        let plan = assert_matches!(
            result.action,
            Action::UpdateFlags { participant, flags, plan } if participant.as_str() == "b" && flags == ParticipantFlags::excluded() => plan
        );

        // b is removed once the leader committed its demotion
        view.current.as_mut().unwrap().leader = Some(established(&plan, 3));
        view.raw_plan = Some(serde_json::to_value(&plan).unwrap());
        view.plan = Some(plan);
        let result = check(&view, &health);
        let plan = assert_matches!(
            result.action,
            Action::RemoveParticipant { participant, plan } if participant.as_str() == "b" => plan
        );
        assert_eq!(plan.participants_config.generation, 5);

        view.current.as_mut().unwrap().leader = Some(established(&plan, 3));
        view.raw_plan = Some(serde_json::to_value(&plan).unwrap());
        view.plan = Some(plan);
        let result = check(&view, &health);
        assert_eq!(result.action, Action::AcknowledgeTargetVersion { version: 2 });
    }

    #[test]
    fn test_target_leader_transfer() {
        let health = healthy(&["a", "b", "c"]);
        let mut view = converged(&target(&["a", "b", "c"], 2), &health);
        view.target.as_mut().unwrap().leader = Some("b".into());

        let result = check(&view, &health);
        let plan = assert_matches!(
            result.action,
            Action::SwitchLeader { leader, plan } if leader.as_str() == "b" => plan
        );
        assert_eq!(plan.term(), LogTerm::new(2));

        // Lagging behind the leader's commit index
        view.current
            .as_mut()
            .unwrap()
            .local_state
            .insert("b".into(), local(1, 1));
        let result = check(&view, &health);
        assert_eq!(result.action, Action::NoAction);
        assert_eq!(
            result.status_report,
            Some(vec![StatusReportEntry::TargetLeaderNotReady {
                participant: "b".into()
            }])
        );
    }

    #[test]
    fn test_status_report_document() {
        let health = healthy(&["a", "b"]);
        let view = view(Some(target(&["a", "b"], 3)), None, None);
        let transaction = check(&view, &health)
            .into_transaction(&log(), &view)
            .unwrap()
            .unwrap();

        assert_eq!(
            transaction.to_envelope()[0]["/Current/ReplicatedLogs/db/12/supervision/statusReport"]
                ["new"][0]["type"],
            json!("TargetConfigInvalid")
        );
    }
}
