//! Supervision jobs moving log participants between servers.
//!
//! Jobs live under `/Target/<state>/<jobId>` and move from `ToDo` to `Pending`
//! to `Finished` or `Failed`, every step being one agency transaction.

mod clean_out_server;
mod move_shard;
mod types;

pub use types::{CleanOutServerJob, Job, MoveShardJob};

use std::time::Duration;

use chrono::{DateTime, Utc};
use proven_agency::{AgencyStore, Snapshot, Transaction, WriteResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SupervisionConfig;
use crate::error::{Error, ReplicationResult};
use crate::health::HealthSnapshot;
use crate::paths;
use crate::types::{GlobalLogId, JobId, LogTarget, ParticipantId};

const DEFAULT_CREATOR: &str = "client";

/// Where a job document lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Submitted, not started
    ToDo,
    /// Started, waiting for the supervision to converge
    Pending,
    /// Done
    Finished,
    /// Given up
    Failed,
}

impl JobState {
    /// All states in lifecycle order
    pub const ALL: [Self; 4] = [Self::ToDo, Self::Pending, Self::Finished, Self::Failed];

    /// Agency key of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "ToDo",
            Self::Pending => "Pending",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        }
    }
}

/// Progress of a job as seen by its submitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// In `ToDo` or `Pending`
    Pending,
    /// In `Finished` or `Failed`
    Completed {
        /// Whether the job failed
        failed: bool,
    },
    /// No such job
    NotFound,
}

/// One step of a job: the transaction and what it does
pub(crate) struct JobStep {
    transaction: Transaction,
    message: String,
}

impl JobStep {
    fn new(transaction: Transaction, message: impl Into<String>) -> Self {
        Self {
            transaction,
            message: message.into(),
        }
    }
}

/// What job steps are computed from
pub(crate) struct JobContext<'a> {
    snapshot: &'a Snapshot,
    health: &'a HealthSnapshot,
    now: DateTime<Utc>,
    timeout: Duration,
}

impl JobContext<'_> {
    fn raw_job(&self, state: JobState, id: &JobId) -> Option<&Value> {
        self.snapshot.get(&paths::job(state, id))
    }

    /// Target of a log together with the raw document for preconditions
    fn target(&self, log: &GlobalLogId) -> ReplicationResult<Option<(LogTarget, Value)>> {
        let path = paths::target(log);
        let target: Option<LogTarget> = self.snapshot.decode(&path)?;
        Ok(target.zip(self.snapshot.get(&path).cloned()))
    }

    /// Jobs stored in `state`
    fn jobs(&self, state: JobState) -> Vec<Job> {
        let root = paths::jobs(state);
        self.snapshot
            .children(&root)
            .into_iter()
            .filter_map(|id| match self.snapshot.decode::<Job>(&root.join(&id)) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Ignoring malformed job {id}: {e}");
                    None
                }
            })
            .collect()
    }

    fn elapsed_since(&self, time: Option<DateTime<Utc>>) -> Duration {
        time.and_then(|time| (self.now - time).to_std().ok())
            .unwrap_or_default()
    }
}

/// Move a job to another state, marking it ended if the new state is final
fn transition(
    job: &Job,
    raw: &Value,
    from: JobState,
    to: JobState,
    now: DateTime<Utc>,
    reason: Option<String>,
) -> ReplicationResult<Transaction> {
    let id = job.job_id();
    let stored = match to {
        JobState::Finished | JobState::Failed => job.clone().finished(now, reason),
        JobState::ToDo | JobState::Pending => job.clone(),
    };
    Ok(Transaction::new()
        .delete(paths::job(from, id))
        .set(paths::job(to, id), serde_json::to_value(&stored)?)
        .expect_old(paths::job(from, id), raw.clone()))
}

/// Submits, inspects and aborts jobs
#[derive(Debug, Clone)]
pub struct JobManager<A>
where
    A: AgencyStore,
{
    agency: A,
    creator: String,
}

impl<A> JobManager<A>
where
    A: AgencyStore,
{
    /// Create a manager
    pub fn new(agency: A) -> Self {
        Self {
            agency,
            creator: DEFAULT_CREATOR.to_string(),
        }
    }

    /// Record `creator` on submitted jobs
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Submit a job into `ToDo`
    pub async fn submit(&self, job: Job) -> ReplicationResult<JobId> {
        let id = job.job_id().clone();
        let mut transaction = Transaction::new().set(
            paths::job(JobState::ToDo, &id),
            serde_json::to_value(&job)?,
        );
        for state in JobState::ALL {
            transaction = transaction.expect_empty(paths::job(state, &id));
        }

        match self.agency.transact(transaction).await.map_err(Error::agency)? {
            WriteResult::Applied { .. } => {
                info!("Submitted job {id}");
                Ok(id)
            }
            WriteResult::PreconditionFailed { .. } => {
                Err(Error::conflict(format!("job {id} already exists")))
            }
        }
    }

    /// Submit a moveShard job
    pub async fn create_move_shard(
        &self,
        log: &GlobalLogId,
        from_server: &ParticipantId,
        to_server: &ParticipantId,
        is_leader: bool,
    ) -> ReplicationResult<JobId> {
        self.submit(Job::MoveShard(MoveShardJob::new(
            JobId::generate(),
            log,
            from_server.clone(),
            to_server.clone(),
            is_leader,
            self.creator.clone(),
        )))
        .await
    }

    /// Submit a cleanOutServer job
    pub async fn create_clean_out_server(&self, server: &ParticipantId) -> ReplicationResult<JobId> {
        self.submit(Job::CleanOutServer(CleanOutServerJob::new(
            JobId::generate(),
            server.clone(),
            self.creator.clone(),
        )))
        .await
    }

    /// Read a job and the state it is in
    pub async fn get(&self, id: &JobId) -> ReplicationResult<Option<(JobState, Job)>> {
        let job_paths: Vec<_> = JobState::ALL
            .iter()
            .map(|state| paths::job(*state, id))
            .collect();
        let snapshot = self.agency.read(&job_paths).await.map_err(Error::agency)?;

        for (state, path) in JobState::ALL.into_iter().zip(&job_paths) {
            if let Some(job) = snapshot.decode::<Job>(path)? {
                return Ok(Some((state, job)));
            }
        }
        Ok(None)
    }

    /// Progress of a job
    pub async fn status(&self, id: &JobId) -> ReplicationResult<JobStatus> {
        Ok(match self.get(id).await? {
            None => JobStatus::NotFound,
            Some((JobState::ToDo | JobState::Pending, _)) => JobStatus::Pending,
            Some((JobState::Finished, _)) => JobStatus::Completed { failed: false },
            Some((JobState::Failed, _)) => JobStatus::Completed { failed: true },
        })
    }

    /// Abort a job that has not ended yet.
    ///
    /// A job that has not started is finished without effect; a pending job
    /// fails and its Target modification is undone.
    pub async fn abort(&self, id: &JobId) -> ReplicationResult<()> {
        let snapshot = self
            .agency
            .read(&[
                paths::jobs(JobState::ToDo),
                paths::jobs(JobState::Pending),
                paths::jobs(JobState::Finished),
                paths::jobs(JobState::Failed),
                paths::target_root(),
            ])
            .await
            .map_err(Error::agency)?;
        let health = HealthSnapshot::default();
        let ctx = JobContext {
            snapshot: &snapshot,
            health: &health,
            now: Utc::now(),
            timeout: Duration::MAX,
        };

        let found = JobState::ALL.into_iter().find_map(|state| {
            ctx.raw_job(state, id).map(|raw| (state, raw))
        });
        let Some((state, raw)) = found else {
            return Err(Error::not_found(format!("job {id}")));
        };
        let job: Job = serde_json::from_value(raw.clone())?;

        let step = match (state, &job) {
            (JobState::ToDo, _) => JobStep::new(
                transition(&job, raw, JobState::ToDo, JobState::Finished, ctx.now, Some("aborted".to_string()))?,
                "aborted before start",
            ),
            (JobState::Pending, Job::MoveShard(move_shard)) => move_shard::abort(move_shard, raw, &ctx)?,
            (JobState::Pending, Job::CleanOutServer(clean_out)) => {
                clean_out_server::abort(clean_out, raw, &ctx)?
            }
            (JobState::Finished | JobState::Failed, _) => {
                return Err(Error::invalid_state(format!(
                    "job {id} already ended in {}",
                    state.as_str()
                )));
            }
        };

        match self
            .agency
            .transact(step.transaction)
            .await
            .map_err(Error::agency)?
        {
            WriteResult::Applied { .. } => {
                info!("Job {id}: {}", step.message);
                Ok(())
            }
            WriteResult::PreconditionFailed { path } => Err(Error::conflict(format!(
                "job {id} changed while aborting ({path})"
            ))),
        }
    }
}

/// Advance every `ToDo` and `Pending` job by at most one step.
///
/// Returns the number of applied transitions.
pub(crate) async fn run_jobs<A: AgencyStore>(
    agency: &A,
    health: &HealthSnapshot,
    config: &SupervisionConfig,
) -> ReplicationResult<usize> {
    let snapshot = agency
        .read(&[
            paths::jobs(JobState::ToDo),
            paths::jobs(JobState::Pending),
            paths::jobs(JobState::Failed),
            paths::target_root(),
            paths::plan_root(),
            paths::current_root(),
            paths::shard_locks(),
            paths::server_locks(),
            paths::to_be_cleaned_servers(),
            paths::cleaned_servers(),
        ])
        .await
        .map_err(Error::agency)?;
    let ctx = JobContext {
        snapshot: &snapshot,
        health,
        now: Utc::now(),
        timeout: config.job_timeout,
    };

    let mut applied = 0;
    for state in [JobState::ToDo, JobState::Pending] {
        for job in ctx.jobs(state) {
            let step = match (state, &job) {
                (JobState::ToDo, Job::MoveShard(job)) => move_shard::start(job, &ctx)?,
                (JobState::Pending, Job::MoveShard(job)) => move_shard::check(job, &ctx)?,
                (JobState::ToDo, Job::CleanOutServer(job)) => clean_out_server::start(job, &ctx)?,
                (JobState::Pending, Job::CleanOutServer(job)) => {
                    clean_out_server::check(job, &ctx)?
                }
                (JobState::Finished | JobState::Failed, _) => None,
            };
            let Some(step) = step else { continue };

            let id = job.job_id();
            match agency
                .transact(step.transaction)
                .await
                .map_err(Error::agency)?
            {
                WriteResult::Applied { .. } => {
                    applied += 1;
                    info!("Job {id}: {}", step.message);
                }
                WriteResult::PreconditionFailed { path } => {
                    debug!("Job {id}: {} lost a race on {path}", step.message);
                }
            }
        }
    }

    Ok(applied)
}
