use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{AppendEntriesRequest, AppendEntriesResult, InMemoryLog, LogPayload};
use crate::error::ReplicationResult;
use crate::types::{
    LeaderStatus, LogIndex, LogTerm, ParticipantId, ParticipantsConfig, TermIndexPair,
};

/// What the leader knows about one follower
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerProgress {
    /// Next index to send
    pub next_index: LogIndex,
    /// Highest index known to be replicated
    pub match_index: LogIndex,
    /// Whether the follower reported a complete snapshot
    pub snapshot_available: bool,
    /// Whether the last request got an answer
    pub reachable: bool,
}

impl FollowerProgress {
    const fn new(next_index: LogIndex) -> Self {
        Self {
            next_index,
            match_index: LogIndex::new(0),
            snapshot_available: false,
            reachable: false,
        }
    }
}

/// Leader role of a participant for a single term
#[derive(Debug)]
pub struct LogLeader {
    id: ParticipantId,
    term: LogTerm,
    first_index: LogIndex,
    config: ParticipantsConfig,
    followers: BTreeMap<ParticipantId, FollowerProgress>,
    pending_generations: Vec<(u64, LogIndex)>,
    committed_generation: Option<u64>,
    established: bool,
}

impl LogLeader {
    /// Take over leadership, appending the first entry of the term
    pub fn new(
        id: ParticipantId,
        term: LogTerm,
        config: ParticipantsConfig,
        log: &mut InMemoryLog,
    ) -> Self {
        let first_index = log.append(term, LogPayload::FirstEntryOfTerm);
        let followers = config
            .participants
            .keys()
            .filter(|pid| **pid != id)
            .map(|pid| (pid.clone(), FollowerProgress::new(first_index)))
            .collect();

        info!(
            "{id} leading term {term}, first entry at {first_index}, generation {}",
            config.generation
        );

        Self {
            id,
            term,
            first_index,
            pending_generations: vec![(config.generation, first_index)],
            config,
            followers,
            committed_generation: None,
            established: false,
        }
    }

    /// Term of this leadership
    #[must_use]
    pub const fn term(&self) -> LogTerm {
        self.term
    }

    /// Whether the first entry of the term is committed
    #[must_use]
    pub const fn is_established(&self) -> bool {
        self.established
    }

    /// Participants config the leader replicates with
    #[must_use]
    pub const fn config(&self) -> &ParticipantsConfig {
        &self.config
    }

    /// Latest participants config generation committed to the log
    #[must_use]
    pub const fn committed_generation(&self) -> Option<u64> {
        self.committed_generation
    }

    /// Progress of a follower
    #[must_use]
    pub fn follower(&self, participant: &ParticipantId) -> Option<&FollowerProgress> {
        self.followers.get(participant)
    }

    /// Adopt a newer participants config, recording it in the log
    pub fn update_config(&mut self, config: &ParticipantsConfig, log: &mut InMemoryLog) {
        if config.generation <= self.config.generation {
            return;
        }

        let index = log.append(self.term, LogPayload::ParticipantsConfig(config.generation));
        debug!(
            "{} appended participants config generation {} at {index}",
            self.id, config.generation
        );
        self.pending_generations.push((config.generation, index));

        self.followers
            .retain(|pid, _| config.participants.contains_key(pid));
        for pid in config.participants.keys() {
            if *pid != self.id && !self.followers.contains_key(pid) {
                self.followers
                    .insert(pid.clone(), FollowerProgress::new(self.first_index));
            }
        }
        self.config = config.clone();
    }

    /// Build one request per follower carrying everything from its next index
    #[must_use]
    pub fn prepare_requests(
        &self,
        log: &InMemoryLog,
        commit_index: LogIndex,
    ) -> Vec<(ParticipantId, AppendEntriesRequest)> {
        self.followers
            .iter()
            .map(|(pid, progress)| {
                let next = progress.next_index.min(log.last_index().next());
                let prev_index = next.prev();
                let prev_term = log.term_of(prev_index).unwrap_or_default();
                let request = AppendEntriesRequest {
                    term: self.term,
                    leader: self.id.clone(),
                    prev_log_entry: TermIndexPair::new(prev_term, prev_index),
                    leader_commit: commit_index,
                    entries: log.slice(next),
                };
                (pid.clone(), request)
            })
            .collect()
    }

    /// Record a follower's answer.
    ///
    /// Returns the follower's term if it rejected the request as stale.
    pub fn handle_response(
        &mut self,
        follower: &ParticipantId,
        sent_up_to: LogIndex,
        result: &ReplicationResult<AppendEntriesResult>,
    ) -> Option<LogTerm> {
        let progress = self.followers.get_mut(follower)?;

        match result {
            Ok(AppendEntriesResult::Accepted {
                snapshot_available, ..
            }) => {
                progress.reachable = true;
                progress.match_index = progress.match_index.max(sent_up_to);
                progress.next_index = sent_up_to.next();
                progress.snapshot_available = *snapshot_available;
                None
            }
            Ok(AppendEntriesResult::NoPrevLogMatch { spearhead }) => {
                progress.reachable = true;
                let backoff = progress.next_index.prev().min(spearhead.index.next());
                progress.next_index = backoff.max(LogIndex::new(1));
                debug!(
                    "{follower} missing previous entry, retrying from {}",
                    progress.next_index
                );
                None
            }
            Ok(AppendEntriesResult::LowerTerm { current }) => {
                progress.reachable = true;
                Some(*current)
            }
            Err(_) => {
                progress.reachable = false;
                None
            }
        }
    }

    /// Highest index acknowledged by enough eligible participants.
    ///
    /// Only entries of the leader's own term are committed by counting;
    /// earlier entries commit implicitly with them.
    #[must_use]
    pub fn compute_commit(&self, log: &InMemoryLog, current: LogIndex) -> LogIndex {
        let mut acks = Vec::new();
        let mut forced_floor: Option<LogIndex> = None;

        for (pid, flags) in &self.config.participants {
            let matched = if *pid == self.id {
                Some(log.last_index())
            } else {
                self.followers
                    .get(pid)
                    .filter(|progress| progress.snapshot_available)
                    .map(|progress| progress.match_index)
            };

            if flags.forced {
                let value = matched.unwrap_or_default();
                forced_floor = Some(forced_floor.map_or(value, |floor| floor.min(value)));
            }
            if flags.allowed_in_quorum {
                if let Some(index) = matched {
                    acks.push(index);
                }
            }
        }

        let quorum = self.config.effective_write_concern.max(1);
        if acks.len() < quorum {
            return current;
        }

        acks.sort_unstable_by(|a, b| b.cmp(a));
        let mut candidate = acks[quorum - 1];
        if let Some(floor) = forced_floor {
            candidate = candidate.min(floor);
        }

        if candidate > current && log.term_of(candidate) == Some(self.term) {
            candidate
        } else {
            current
        }
    }

    /// Update derived state after the commit index moved
    pub fn on_commit(&mut self, commit_index: LogIndex) {
        if !self.established && commit_index >= self.first_index {
            self.established = true;
            info!("{} established leadership in term {}", self.id, self.term);
        }

        let committed = self
            .pending_generations
            .iter()
            .filter(|(_, index)| *index <= commit_index)
            .map(|(generation, _)| *generation)
            .max();
        if committed > self.committed_generation {
            self.committed_generation = committed;
        }
        self.pending_generations
            .retain(|(_, index)| *index > commit_index);
    }

    /// The status the leader reports into Current
    #[must_use]
    pub fn status(&self, commit_index: LogIndex) -> LeaderStatus {
        LeaderStatus {
            term: self.term,
            server_id: self.id.clone(),
            leadership_established: self.established,
            commit_index,
            committed_participants_config: self.committed_generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{LogConfig, ParticipantFlags};

    fn config(ids: &[&str], ewc: usize) -> ParticipantsConfig {
        ParticipantsConfig {
            generation: 1,
            participants: ids
                .iter()
                .map(|id| (ParticipantId::new(*id), ParticipantFlags::default()))
                .collect(),
            config: LogConfig::new(ewc),
            effective_write_concern: ewc,
        }
    }

    fn accept(leader: &mut LogLeader, follower: &str, up_to: u64) {
        leader.handle_response(
            &ParticipantId::new(follower),
            LogIndex::new(up_to),
            &Ok(AppendEntriesResult::Accepted {
                spearhead: TermIndexPair::new(LogTerm::new(1), LogIndex::new(up_to)),
                snapshot_available: true,
            }),
        );
    }

    #[test]
    fn test_commit_requires_write_concern() {
        let mut log = InMemoryLog::new();
        let mut leader = LogLeader::new("a".into(), LogTerm::new(1), config(&["a", "b", "c"], 2), &mut log);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(0));

        accept(&mut leader, "b", 1);
        let commit = leader.compute_commit(&log, LogIndex::new(0));
        assert_eq!(commit, LogIndex::new(1));

        leader.on_commit(commit);
        assert!(leader.is_established());
        assert_eq!(leader.committed_generation(), Some(1));
    }

    #[test]
    fn test_forced_follower_holds_back_commit() {
        let mut log = InMemoryLog::new();
        let mut participants = config(&["a", "b", "c"], 2);
        if let Some(flags) = participants.participants.get_mut(&ParticipantId::new("c")) {
            flags.forced = true;
        }
        let mut leader = LogLeader::new("a".into(), LogTerm::new(1), participants, &mut log);
        log.append(LogTerm::new(1), LogPayload::Data(serde_json::json!({"n": 1})));

        // a and b reach the write concern, but c has nothing yet
        accept(&mut leader, "b", 2);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(0));

        // c lags one entry behind
        accept(&mut leader, "c", 1);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(1));

        accept(&mut leader, "c", 2);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(1)), LogIndex::new(2));
    }

    #[test]
    fn test_followers_without_snapshot_do_not_count() {
        let mut log = InMemoryLog::new();
        let mut leader = LogLeader::new("a".into(), LogTerm::new(1), config(&["a", "b"], 2), &mut log);

        leader.handle_response(
            &"b".into(),
            LogIndex::new(1),
            &Ok(AppendEntriesResult::Accepted {
                spearhead: TermIndexPair::new(LogTerm::new(1), LogIndex::new(1)),
                snapshot_available: false,
            }),
        );
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(0));
    }

    #[test]
    fn test_entries_of_older_terms_are_not_counted() {
        let mut log = InMemoryLog::new();
        log.append(LogTerm::new(1), LogPayload::FirstEntryOfTerm);
        let mut leader = LogLeader::new("a".into(), LogTerm::new(2), config(&["a", "b", "c"], 2), &mut log);

        // b only has the old entry
        accept(&mut leader, "b", 1);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(0));

        accept(&mut leader, "b", 2);
        assert_eq!(leader.compute_commit(&log, LogIndex::new(0)), LogIndex::new(2));
    }

    #[test]
    fn test_unreachable_and_lagging_followers() {
        let mut log = InMemoryLog::new();
        log.append(LogTerm::new(1), LogPayload::FirstEntryOfTerm);
        log.append(LogTerm::new(1), LogPayload::FirstEntryOfTerm);
        let mut leader = LogLeader::new("a".into(), LogTerm::new(2), config(&["a", "b", "c"], 2), &mut log);

        let b = ParticipantId::new("b");
        leader.handle_response(&b, LogIndex::new(2), &Err(Error::unavailable("stopped")));
        assert!(!leader.follower(&b).unwrap().reachable);

        leader.handle_response(
            &b,
            LogIndex::new(3),
            &Ok(AppendEntriesResult::NoPrevLogMatch {
                spearhead: TermIndexPair::default(),
            }),
        );
        assert_eq!(leader.follower(&b).unwrap().next_index, LogIndex::new(1));

        let requests = leader.prepare_requests(&log, LogIndex::new(0));
        let (_, request) = requests.iter().find(|(pid, _)| *pid == b).unwrap();
        assert_eq!(request.prev_log_entry, TermIndexPair::default());
        assert_eq!(request.entries.len(), 3);
    }

    #[test]
    fn test_config_update_tracks_generation() {
        let mut log = InMemoryLog::new();
        let mut leader = LogLeader::new("a".into(), LogTerm::new(1), config(&["a", "b"], 1), &mut log);
        leader.on_commit(LogIndex::new(1));

        let mut next = config(&["a", "c"], 1);
        next.generation = 2;
        leader.update_config(&next, &mut log);

        assert!(leader.follower(&"b".into()).is_none());
        assert!(leader.follower(&"c".into()).is_some());
        assert_eq!(leader.committed_generation(), Some(1));

        let commit = leader.compute_commit(&log, LogIndex::new(1));
        assert_eq!(commit, LogIndex::new(2));
        leader.on_commit(commit);
        assert_eq!(leader.committed_generation(), Some(2));
    }
}
