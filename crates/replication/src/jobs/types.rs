use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DatabaseName, GlobalLogId, JobId, LogId, ParticipantFlags, ParticipantId};

/// A supervision job document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Job {
    /// Move one participant of a log to another server
    MoveShard(MoveShardJob),
    /// Move every participant off a server
    CleanOutServer(CleanOutServerJob),
}

impl Job {
    /// Job id
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        match self {
            Self::MoveShard(job) => &job.job_id,
            Self::CleanOutServer(job) => &job.job_id,
        }
    }

    /// Time the job entered Pending
    #[must_use]
    pub const fn time_started(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::MoveShard(job) => job.time_started,
            Self::CleanOutServer(job) => job.time_started,
        }
    }

    /// Why the job ended the way it did
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::MoveShard(job) => job.reason.as_deref(),
            Self::CleanOutServer(job) => job.reason.as_deref(),
        }
    }

    /// The job as stored once it has ended
    #[must_use]
    pub fn finished(mut self, now: DateTime<Utc>, reason: Option<String>) -> Self {
        match &mut self {
            Self::MoveShard(job) => {
                job.time_finished = Some(now);
                job.reason = reason;
            }
            Self::CleanOutServer(job) => {
                job.time_finished = Some(now);
                job.reason = reason;
            }
        }
        self
    }
}

/// Replace `fromServer` by `toServer` in the Target of a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveShardJob {
    /// Job id
    pub job_id: JobId,
    /// Database of the log
    pub database: DatabaseName,
    /// Collection the log belongs to
    pub collection: String,
    /// The log
    pub shard: LogId,
    /// Server to move away from
    pub from_server: ParticipantId,
    /// Server to move to
    pub to_server: ParticipantId,
    /// Whether leadership moves along
    pub is_leader: bool,
    /// Who submitted the job
    pub creator: String,
    /// Submission time
    pub time_created: DateTime<Utc>,
    /// Time the Target was modified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    /// Time the job ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_finished: Option<DateTime<Utc>>,
    /// Failure or abort reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Job that spawned this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job: Option<JobId>,
    /// Target version written when the job started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
    /// Target flags of `fromServer` before the move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_flags: Option<ParticipantFlags>,
    /// Target leader before the move
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_leader: Option<ParticipantId>,
}

impl MoveShardJob {
    /// A new job for `log`
    pub fn new(
        job_id: JobId,
        log: &GlobalLogId,
        from_server: ParticipantId,
        to_server: ParticipantId,
        is_leader: bool,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            database: log.database.clone(),
            collection: log.id.to_string(),
            shard: log.id,
            from_server,
            to_server,
            is_leader,
            creator: creator.into(),
            time_created: Utc::now(),
            time_started: None,
            time_finished: None,
            reason: None,
            parent_job: None,
            expected_version: None,
            from_flags: None,
            previous_leader: None,
        }
    }

    /// The moved log
    #[must_use]
    pub fn log(&self) -> GlobalLogId {
        GlobalLogId::new(self.database.clone(), self.shard)
    }
}

/// Move every log participant off a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanOutServerJob {
    /// Job id
    pub job_id: JobId,
    /// Server to clean out
    pub server: ParticipantId,
    /// Who submitted the job
    pub creator: String,
    /// Submission time
    pub time_created: DateTime<Utc>,
    /// Time the moves were spawned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_started: Option<DateTime<Utc>>,
    /// Time the job ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_finished: Option<DateTime<Utc>>,
    /// Failure or abort reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CleanOutServerJob {
    /// A new job for `server`
    pub fn new(job_id: JobId, server: ParticipantId, creator: impl Into<String>) -> Self {
        Self {
            job_id,
            server,
            creator: creator.into(),
            time_created: Utc::now(),
            time_started: None,
            time_finished: None,
            reason: None,
        }
    }
}
