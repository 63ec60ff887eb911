use serde_json::Value;
use tracing::debug;

use super::{Job, JobContext, JobState, JobStep, MoveShardJob, transition};
use crate::error::ReplicationResult;
use crate::health;
use crate::paths;
use crate::state::replace_in_target;
use crate::types::{LogCurrent, LogPlan, LogTarget};

fn fail(
    job: &MoveShardJob,
    raw: &Value,
    from: JobState,
    ctx: &JobContext<'_>,
    reason: &str,
) -> ReplicationResult<Option<JobStep>> {
    let mut transaction = transition(
        &Job::MoveShard(job.clone()),
        raw,
        from,
        JobState::Failed,
        ctx.now,
        Some(reason.to_string()),
    )?;
    if from == JobState::Pending {
        transaction = transaction.delete(paths::shard_lock(&job.log()));
    }
    Ok(Some(JobStep::new(transaction, format!("failed: {reason}"))))
}

/// Swap the servers in the Target and lock the log
pub(super) fn start(job: &MoveShardJob, ctx: &JobContext<'_>) -> ReplicationResult<Option<JobStep>> {
    let Some(raw) = ctx.raw_job(JobState::ToDo, &job.job_id) else {
        return Ok(None);
    };
    let log = job.log();

    let Some((target, raw_target)) = ctx.target(&log)? else {
        return fail(job, raw, JobState::ToDo, ctx, "log does not exist");
    };
    let Some(from_flags) = target.participants.get(&job.from_server).copied() else {
        return fail(job, raw, JobState::ToDo, ctx, "fromServer does not participate");
    };
    if target.participants.contains_key(&job.to_server) {
        return fail(job, raw, JobState::ToDo, ctx, "toServer already participates");
    }
    if !ctx.health.is_healthy(&job.to_server) {
        return fail(job, raw, JobState::ToDo, ctx, "toServer is not healthy");
    }
    if ctx.snapshot.contains(&paths::shard_lock(&log)) {
        debug!("Job {}: {log} is locked", job.job_id);
        return Ok(None);
    }

    let mut moved = target.clone();
    replace_in_target(&mut moved, &job.from_server, &job.to_server, None)?;
    if job.is_leader {
        moved.leader = Some(job.to_server.clone());
    }
    moved.version = Some(target.version() + 1);
    if let Err(e) = moved.validate() {
        return fail(job, raw, JobState::ToDo, ctx, &e.to_string());
    }

    let mut pending = job.clone();
    pending.time_started = Some(ctx.now);
    pending.expected_version = moved.version;
    pending.from_flags = Some(from_flags);
    pending.previous_leader = target.leader.clone();

    let target_path = paths::target(&log);
    let lock = paths::shard_lock(&log);
    let transaction = transition(
        &Job::MoveShard(pending),
        raw,
        JobState::ToDo,
        JobState::Pending,
        ctx.now,
        None,
    )?
    .set(target_path.clone(), serde_json::to_value(&moved)?)
    .set(lock.clone(), job.job_id.as_str())
    .expect_old(target_path, raw_target)
    .expect_empty(lock)
    .expect_old(paths::health_status(&job.to_server), health::good());

    Ok(Some(JobStep::new(
        transaction,
        format!("moving {log} from {} to {}", job.from_server, job.to_server),
    )))
}

/// Finish once the Plan realizes the move, fail when superseded or timed out
pub(super) fn check(job: &MoveShardJob, ctx: &JobContext<'_>) -> ReplicationResult<Option<JobStep>> {
    let Some(raw) = ctx.raw_job(JobState::Pending, &job.job_id) else {
        return Ok(None);
    };
    let log = job.log();

    let Some((target, raw_target)) = ctx.target(&log)? else {
        return fail(job, raw, JobState::Pending, ctx, "log was deleted");
    };
    if !target.participants.contains_key(&job.to_server) {
        return fail(job, raw, JobState::Pending, ctx, "superseded by a Target change");
    }

    let plan: Option<LogPlan> = ctx.snapshot.decode(&paths::plan(&log))?;
    let current: Option<LogCurrent> = ctx.snapshot.decode(&paths::current(&log))?;
    let moved = plan.is_some_and(|plan| {
        plan.flags(&job.to_server)
            .is_some_and(|flags| flags.allowed_in_quorum)
            && plan.flags(&job.from_server).is_none()
    });
    let acknowledged = current
        .and_then(|current| current.supervision)
        .and_then(|supervision| supervision.target_version);
    let converged = matches!(
        (acknowledged, job.expected_version),
        (Some(acknowledged), Some(expected)) if acknowledged >= expected
    );

    if moved && converged {
        let transaction = transition(
            &Job::MoveShard(job.clone()),
            raw,
            JobState::Pending,
            JobState::Finished,
            ctx.now,
            None,
        )?
        .delete(paths::shard_lock(&job.log()));
        return Ok(Some(JobStep::new(transaction, format!("moved {log}"))));
    }

    if ctx.elapsed_since(job.time_started) > ctx.timeout {
        return Ok(Some(undo(job, raw, &target, raw_target, ctx, "timed out")?));
    }

    Ok(None)
}

/// Fail a pending job and undo its Target modification
pub(super) fn abort(job: &MoveShardJob, raw: &Value, ctx: &JobContext<'_>) -> ReplicationResult<JobStep> {
    let log = job.log();
    match ctx.target(&log)? {
        Some((target, raw_target)) => undo(job, raw, &target, raw_target, ctx, "aborted"),
        None => {
            let transaction = transition(
                &Job::MoveShard(job.clone()),
                raw,
                JobState::Pending,
                JobState::Failed,
                ctx.now,
                Some("aborted".to_string()),
            )?
            .delete(paths::shard_lock(&job.log()));
            Ok(JobStep::new(transaction, "aborted"))
        }
    }
}

fn undo(
    job: &MoveShardJob,
    raw: &Value,
    target: &LogTarget,
    raw_target: Value,
    ctx: &JobContext<'_>,
    reason: &str,
) -> ReplicationResult<JobStep> {
    let target_path = paths::target(&job.log());
    let mut transaction = transition(
        &Job::MoveShard(job.clone()),
        raw,
        JobState::Pending,
        JobState::Failed,
        ctx.now,
        Some(reason.to_string()),
    )?
    .delete(paths::shard_lock(&job.log()));

    if let Some(restored) = restored_target(job, target) {
        transaction = transaction
            .set(target_path.clone(), serde_json::to_value(&restored)?)
            .expect_old(target_path, raw_target);
    }

    Ok(JobStep::new(
        transaction,
        format!("{reason}, moving {} back to {}", job.to_server, job.from_server),
    ))
}

/// The Target with the move undone, `None` if it no longer reflects the move
fn restored_target(job: &MoveShardJob, target: &LogTarget) -> Option<LogTarget> {
    if target.participants.contains_key(&job.from_server)
        || !target.participants.contains_key(&job.to_server)
    {
        return None;
    }

    let mut restored = target.clone();
    restored.participants.remove(&job.to_server);
    restored
        .participants
        .insert(job.from_server.clone(), job.from_flags.unwrap_or_default());
    if restored.leader.as_ref() == Some(&job.to_server) {
        restored.leader = job
            .previous_leader
            .clone()
            .filter(|leader| restored.participants.contains_key(leader));
    }
    restored.version = Some(target.version() + 1);
    restored.validate().ok()?;
    Some(restored)
}
