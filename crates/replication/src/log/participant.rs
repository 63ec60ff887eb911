use serde_json::Value;
use tracing::{debug, info, warn};

use super::{AppendEntriesRequest, AppendEntriesResult, InMemoryLog, LogLeader, LogPayload};
use crate::error::{Error, ReplicationResult};
use crate::state::{StateImplementation, StateMachine};
use crate::types::{
    GlobalLogId, LeaderStatus, LocalState, LogIndex, LogSnapshot, LogTerm, ParticipantFlags,
    ParticipantId, ParticipantsConfig, SnapshotStatus, TermIndexPair,
};

/// One replica of one replicated log, acting as follower or leader
#[derive(Debug)]
pub struct LogParticipant {
    id: ParticipantId,
    log_id: GlobalLogId,
    term: LogTerm,
    leader: Option<ParticipantId>,
    log: InMemoryLog,
    commit_index: LogIndex,
    applied_index: LogIndex,
    snapshot: SnapshotStatus,
    flags: ParticipantFlags,
    state: Box<dyn StateMachine>,
    role: Option<LogLeader>,
}

impl LogParticipant {
    /// Create an empty replica
    pub fn new(
        id: ParticipantId,
        log_id: GlobalLogId,
        implementation: StateImplementation,
        snapshot: SnapshotStatus,
    ) -> Self {
        Self {
            id,
            log_id,
            term: LogTerm::default(),
            leader: None,
            log: InMemoryLog::new(),
            commit_index: LogIndex::default(),
            applied_index: LogIndex::default(),
            snapshot,
            flags: ParticipantFlags::default(),
            state: implementation.create(),
            role: None,
        }
    }

    /// Id of the hosting server
    #[must_use]
    pub const fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// Id of the log
    #[must_use]
    pub const fn log_id(&self) -> &GlobalLogId {
        &self.log_id
    }

    /// Current term
    #[must_use]
    pub const fn term(&self) -> LogTerm {
        self.term
    }

    /// Known leader of the current term
    #[must_use]
    pub const fn leader(&self) -> Option<&ParticipantId> {
        self.leader.as_ref()
    }

    /// Local commit index
    #[must_use]
    pub const fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    /// Last entry of the local log
    #[must_use]
    pub fn spearhead(&self) -> TermIndexPair {
        self.log.spearhead()
    }

    /// The local log
    #[must_use]
    pub const fn log(&self) -> &InMemoryLog {
        &self.log
    }

    /// Snapshot status
    #[must_use]
    pub const fn snapshot_status(&self) -> SnapshotStatus {
        self.snapshot
    }

    /// Update the snapshot status
    pub fn set_snapshot_status(&mut self, status: SnapshotStatus) {
        self.snapshot = status;
    }

    /// Serialized replicated state
    #[must_use]
    pub fn state(&self) -> Value {
        self.state.snapshot()
    }

    /// Leader role, if leading the current term
    #[must_use]
    pub fn leader_role(&self) -> Option<&LogLeader> {
        self.role.as_ref().filter(|role| role.term() == self.term)
    }

    /// Whether this replica leads the current term with an established leadership
    #[must_use]
    pub fn is_established_leader(&self) -> bool {
        self.leader_role().is_some_and(LogLeader::is_established)
    }

    /// Planned flags of this replica
    pub fn set_flags(&mut self, flags: ParticipantFlags) {
        self.flags = flags;
    }

    /// Adopt a strictly higher term, or learn the leader of the current one.
    ///
    /// Returns whether anything changed.
    pub fn update_term(&mut self, term: LogTerm, leader: Option<ParticipantId>) -> bool {
        if term > self.term {
            info!(
                "{} on {}: term {} -> {term}, leader {:?}",
                self.log_id, self.id, self.term, leader
            );
            self.term = term;
            self.leader = leader;
            self.role = None;
            return true;
        }

        if term == self.term && self.leader.is_none() && leader.is_some() {
            self.leader = leader;
            return true;
        }

        false
    }

    /// Become leader of the current term if planned and not leading yet
    pub fn become_leader(&mut self, config: &ParticipantsConfig) {
        if self.leader.as_ref() != Some(&self.id) || self.leader_role().is_some() {
            return;
        }
        self.role = Some(LogLeader::new(
            self.id.clone(),
            self.term,
            config.clone(),
            &mut self.log,
        ));
    }

    /// Pass a newer participants config to the leader role
    pub fn update_leader_config(&mut self, config: &ParticipantsConfig) {
        if let Some(role) = self.role.as_mut() {
            if role.term() == self.term {
                role.update_config(config, &mut self.log);
            }
        }
    }

    /// Handle a replication request from a leader
    pub fn append_entries(&mut self, request: AppendEntriesRequest) -> AppendEntriesResult {
        if request.term < self.term {
            debug!(
                "{} on {}: rejecting append from {} with stale term {}",
                self.log_id, self.id, request.leader, request.term
            );
            return AppendEntriesResult::LowerTerm { current: self.term };
        }

        if request.term > self.term {
            info!(
                "{} on {}: adopting term {} from {}",
                self.log_id, self.id, request.term, request.leader
            );
            self.term = request.term;
        }
        if self.leader.as_ref() != Some(&request.leader) {
            self.leader = Some(request.leader.clone());
        }
        if request.leader != self.id {
            self.role = None;
        }

        let prev = request.prev_log_entry;
        if self.log.term_of(prev.index) != Some(prev.term) {
            return AppendEntriesResult::NoPrevLogMatch {
                spearhead: self.log.spearhead(),
            };
        }

        // Only a term conflict truncates; a shorter request of the same term
        // leaves the entries it does not carry in place
        let mut last = prev.index;
        for entry in request.entries {
            let index = entry.index;
            let stored = match self.log.term_of(index) {
                Some(term) if term == entry.term => true,
                Some(_) if index <= self.commit_index => {
                    warn!(
                        "{} on {}: conflicting committed entry at {index}",
                        self.log_id, self.id
                    );
                    false
                }
                Some(_) => {
                    self.log.truncate_after(index.prev());
                    self.log.push(entry)
                }
                None => self.log.push(entry),
            };
            if !stored {
                return AppendEntriesResult::NoPrevLogMatch {
                    spearhead: self.log.spearhead(),
                };
            }
            last = index;
        }

        let commit = request.leader_commit.min(last);
        if commit > self.commit_index {
            self.commit_index = commit;
            self.apply_committed();
        }

        AppendEntriesResult::Accepted {
            spearhead: self.log.spearhead(),
            snapshot_available: self.snapshot.is_available(),
        }
    }

    /// Append a client payload on the leader
    pub fn insert(&mut self, payload: Value) -> ReplicationResult<LogIndex> {
        let Some(role) = self.leader_role() else {
            return Err(Error::not_leader(
                format!("{} is not leading {}", self.id, self.log_id),
                self.leader.clone(),
            ));
        };
        if !role.is_established() {
            return Err(Error::invalid_state(format!(
                "leadership of {} in term {} not established yet",
                self.log_id, self.term
            )));
        }
        Ok(self.log.append(self.term, LogPayload::Data(payload)))
    }

    /// Replication requests for every follower, empty unless leading
    #[must_use]
    pub fn prepare_replication(&self) -> Vec<(ParticipantId, AppendEntriesRequest)> {
        self.leader_role()
            .map(|role| role.prepare_requests(&self.log, self.commit_index))
            .unwrap_or_default()
    }

    /// Process follower answers and advance the commit index.
    ///
    /// Returns whether the commit index moved.
    pub fn handle_append_responses(
        &mut self,
        responses: Vec<(ParticipantId, LogIndex, ReplicationResult<AppendEntriesResult>)>,
    ) -> bool {
        let term = self.term;
        let Some(role) = self.role.as_mut().filter(|role| role.term() == term) else {
            return false;
        };

        for (follower, sent_up_to, result) in &responses {
            if let Err(e) = result {
                debug!("{}: append to {follower} failed: {e}", self.log_id);
            }
            if let Some(higher) = role.handle_response(follower, *sent_up_to, result) {
                warn!(
                    "{}: {follower} is in term {higher}, beyond leader term {term}",
                    self.log_id
                );
            }
        }

        let commit = role.compute_commit(&self.log, self.commit_index);
        role.on_commit(commit);
        if commit > self.commit_index {
            self.commit_index = commit;
            self.apply_committed();
            true
        } else {
            false
        }
    }

    /// Build a snapshot for a follower; only an established leader serves them
    pub fn create_snapshot(&self) -> ReplicationResult<LogSnapshot> {
        if !self.is_established_leader() {
            return Err(Error::not_leader(
                format!("{} cannot serve snapshots of {}", self.id, self.log_id),
                self.leader.clone(),
            ));
        }
        Ok(LogSnapshot {
            term: self.term,
            commit_index: self.commit_index,
            state: self.state.snapshot(),
            entries: self.log.range(LogIndex::default(), self.commit_index),
        })
    }

    /// Replace the local log and state with a snapshot
    pub fn install_snapshot(&mut self, snapshot: LogSnapshot) -> ReplicationResult<()> {
        self.state.restore(snapshot.state)?;
        self.log = InMemoryLog::from_entries(snapshot.entries);
        self.commit_index = snapshot.commit_index;
        self.applied_index = snapshot.commit_index;
        self.snapshot = SnapshotStatus::Available;
        if snapshot.term > self.term {
            self.term = snapshot.term;
            self.leader = None;
            self.role = None;
        }
        info!(
            "{} on {}: installed snapshot at {}",
            self.log_id, self.id, self.commit_index
        );
        Ok(())
    }

    /// The state reported into Current
    #[must_use]
    pub fn report(&self) -> LocalState {
        LocalState {
            term: self.term,
            spearhead: self.log.spearhead(),
            commit_index: self.commit_index,
            snapshot: self.snapshot,
            allowed_in_quorum: self.flags.allowed_in_quorum && self.snapshot.is_available(),
        }
    }

    /// The leader status reported into Current, if leading the current term
    #[must_use]
    pub fn leader_status(&self) -> Option<LeaderStatus> {
        self.leader_role()
            .map(|role| role.status(self.commit_index))
    }

    fn apply_committed(&mut self) {
        if !self.snapshot.is_available() {
            return;
        }
        for entry in self.log.range(self.applied_index, self.commit_index) {
            if let LogPayload::Data(payload) = &entry.payload {
                if let Err(e) = self.state.apply(entry.index, payload) {
                    warn!("{}: skipping entry {}: {e}", self.log_id, entry.index);
                }
            }
            self.applied_index = entry.index;
        }
    }
}
