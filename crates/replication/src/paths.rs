//! Agency locations of logs, jobs and health records

use proven_agency::AgencyPath;

use crate::jobs::JobState;
use crate::types::{GlobalLogId, JobId, ParticipantId};

const REPLICATED_LOGS: &str = "ReplicatedLogs";

/// `/Target/ReplicatedLogs`
#[must_use]
pub fn target_root() -> AgencyPath {
    AgencyPath::from_segments(["Target", REPLICATED_LOGS])
}

/// `/Plan/ReplicatedLogs`
#[must_use]
pub fn plan_root() -> AgencyPath {
    AgencyPath::from_segments(["Plan", REPLICATED_LOGS])
}

/// `/Current/ReplicatedLogs`
#[must_use]
pub fn current_root() -> AgencyPath {
    AgencyPath::from_segments(["Current", REPLICATED_LOGS])
}

fn log_path(root: AgencyPath, log: &GlobalLogId) -> AgencyPath {
    root.join(log.database.as_str()).join(log.id.to_string())
}

/// `/Target/ReplicatedLogs/<db>/<id>`
#[must_use]
pub fn target(log: &GlobalLogId) -> AgencyPath {
    log_path(target_root(), log)
}

/// `/Plan/ReplicatedLogs/<db>/<id>`
#[must_use]
pub fn plan(log: &GlobalLogId) -> AgencyPath {
    log_path(plan_root(), log)
}

/// `/Current/ReplicatedLogs/<db>/<id>`
#[must_use]
pub fn current(log: &GlobalLogId) -> AgencyPath {
    log_path(current_root(), log)
}

/// `/Current/ReplicatedLogs/<db>/<id>/localState/<pid>`
#[must_use]
pub fn current_local_state(log: &GlobalLogId, participant: &ParticipantId) -> AgencyPath {
    current(log).join("localState").join(participant.as_str())
}

/// `/Current/ReplicatedLogs/<db>/<id>/leader`
#[must_use]
pub fn current_leader(log: &GlobalLogId) -> AgencyPath {
    current(log).join("leader")
}

/// `/Current/ReplicatedLogs/<db>/<id>/supervision`
#[must_use]
pub fn current_supervision(log: &GlobalLogId) -> AgencyPath {
    current(log).join("supervision")
}

/// `/Target/<ToDo|Pending|Finished|Failed>`
#[must_use]
pub fn jobs(state: JobState) -> AgencyPath {
    AgencyPath::from_segments(["Target", state.as_str()])
}

/// `/Target/<ToDo|Pending|Finished|Failed>/<jobId>`
#[must_use]
pub fn job(state: JobState, id: &JobId) -> AgencyPath {
    jobs(state).join(id.as_str())
}

/// `/Supervision/Health`
#[must_use]
pub fn health_root() -> AgencyPath {
    AgencyPath::from_segments(["Supervision", "Health"])
}

/// `/Supervision/Health/<pid>/Status`
#[must_use]
pub fn health_status(participant: &ParticipantId) -> AgencyPath {
    health_root().join(participant.as_str()).join("Status")
}

/// `/Supervision/Shards`
#[must_use]
pub fn shard_locks() -> AgencyPath {
    AgencyPath::from_segments(["Supervision", "Shards"])
}

/// `/Supervision/Shards/<db>/<id>`
#[must_use]
pub fn shard_lock(log: &GlobalLogId) -> AgencyPath {
    log_path(shard_locks(), log)
}

/// `/Target/ToBeCleanedServers`, servers a cleanOutServer job is draining
#[must_use]
pub fn to_be_cleaned_servers() -> AgencyPath {
    AgencyPath::from_segments(["Target", "ToBeCleanedServers"])
}

/// `/Target/CleanedServers`
#[must_use]
pub fn cleaned_servers() -> AgencyPath {
    AgencyPath::from_segments(["Target", "CleanedServers"])
}

/// `/Supervision/DBServers`
#[must_use]
pub fn server_locks() -> AgencyPath {
    AgencyPath::from_segments(["Supervision", "DBServers"])
}

/// `/Supervision/DBServers/<pid>`
#[must_use]
pub fn server_lock(participant: &ParticipantId) -> AgencyPath {
    server_locks().join(participant.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogId;

    #[test]
    fn test_log_paths() {
        let log = GlobalLogId::new("_system", LogId::new(100));
        assert_eq!(target(&log).to_string(), "/Target/ReplicatedLogs/_system/100");
        assert_eq!(
            current_local_state(&log, &ParticipantId::new("PRMR-1")).to_string(),
            "/Current/ReplicatedLogs/_system/100/localState/PRMR-1"
        );
        assert_eq!(
            job(JobState::Pending, &JobId::new("42")).to_string(),
            "/Target/Pending/42"
        );
        assert_eq!(
            health_status(&ParticipantId::new("PRMR-2")).to_string(),
            "/Supervision/Health/PRMR-2/Status"
        );
    }

    #[test]
    fn test_shard_locks_are_per_database() {
        let system = GlobalLogId::new("_system", LogId::new(7));
        let other = GlobalLogId::new("other", LogId::new(7));
        assert_eq!(shard_lock(&system).to_string(), "/Supervision/Shards/_system/7");
        assert_ne!(shard_lock(&system), shard_lock(&other));
    }
}
