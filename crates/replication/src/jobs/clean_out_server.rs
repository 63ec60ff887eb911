use std::collections::BTreeMap;

use proven_agency::AgencyPath;
use serde_json::Value;
use tracing::debug;

use super::{CleanOutServerJob, Job, JobContext, JobState, JobStep, MoveShardJob, transition};
use crate::error::ReplicationResult;
use crate::paths;
use crate::types::{GlobalLogId, JobId, LogTarget, ParticipantId};
use crate::view::logs_in;

fn targets(ctx: &JobContext<'_>) -> ReplicationResult<Vec<(GlobalLogId, LogTarget)>> {
    let mut targets = Vec::new();
    for log in logs_in(ctx.snapshot, &paths::target_root()) {
        if let Some((target, _)) = ctx.target(&log)? {
            targets.push((log, target));
        }
    }
    targets.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(targets)
}

/// Whether `server` is an element of the server list at `path`
fn listed(ctx: &JobContext<'_>, path: &AgencyPath, server: &ParticipantId) -> bool {
    ctx.snapshot
        .get(path)
        .and_then(Value::as_array)
        .is_some_and(|servers| servers.iter().any(|s| s.as_str() == Some(server.as_str())))
}

/// moveShard jobs spawned by `parent` together with their state
fn children(ctx: &JobContext<'_>, parent: &JobId) -> Vec<(JobState, MoveShardJob)> {
    [JobState::ToDo, JobState::Pending, JobState::Failed]
        .into_iter()
        .flat_map(|state| {
            ctx.jobs(state).into_iter().filter_map(move |job| match job {
                Job::MoveShard(job) if job.parent_job.as_ref() == Some(parent) => Some((state, job)),
                _ => None,
            })
        })
        .collect()
}

fn fail(
    job: &CleanOutServerJob,
    raw: &Value,
    from: JobState,
    ctx: &JobContext<'_>,
    reason: &str,
) -> ReplicationResult<Option<JobStep>> {
    let mut transaction = transition(
        &Job::CleanOutServer(job.clone()),
        raw,
        from,
        JobState::Failed,
        ctx.now,
        Some(reason.to_string()),
    )?;
    if from == JobState::Pending {
        transaction = transaction
            .delete(paths::server_lock(&job.server))
            .erase(paths::to_be_cleaned_servers(), job.server.as_str());
    }
    Ok(Some(JobStep::new(transaction, format!("failed: {reason}"))))
}

/// Lock the server and spawn one moveShard per log it participates in
pub(super) fn start(
    job: &CleanOutServerJob,
    ctx: &JobContext<'_>,
) -> ReplicationResult<Option<JobStep>> {
    let Some(raw) = ctx.raw_job(JobState::ToDo, &job.job_id) else {
        return Ok(None);
    };
    if !ctx.health.is_known(&job.server) {
        return fail(job, raw, JobState::ToDo, ctx, "unknown server");
    }
    if listed(ctx, &paths::cleaned_servers(), &job.server) {
        return fail(job, raw, JobState::ToDo, ctx, "server already cleaned out");
    }
    let lock = paths::server_lock(&job.server);
    if ctx.snapshot.contains(&lock) {
        debug!("Job {}: {} is locked", job.job_id, job.server);
        return Ok(None);
    }

    let targets = targets(ctx)?;
    let mut load: BTreeMap<&ParticipantId, usize> = ctx
        .health
        .healthy()
        .filter(|server| **server != job.server)
        .map(|server| (server, 0))
        .collect();
    for (_, target) in &targets {
        for participant in target.participants.keys() {
            if let Some(count) = load.get_mut(participant) {
                *count += 1;
            }
        }
    }

    let mut moves = Vec::new();
    for (log, target) in targets
        .iter()
        .filter(|(_, target)| target.participants.contains_key(&job.server))
    {
        // Least loaded healthy server not yet hosting the log, ties by id
        let destination = load
            .iter()
            .filter(|(server, _)| !target.participants.contains_key(**server))
            .min_by_key(|(server, count)| (**count, **server))
            .map(|(server, _)| *server);
        let Some(destination) = destination else {
            return fail(
                job,
                raw,
                JobState::ToDo,
                ctx,
                &format!("no server to move {log} to"),
            );
        };
        if let Some(count) = load.get_mut(destination) {
            *count += 1;
        }

        let mut child = MoveShardJob::new(
            JobId::new(format!("{}-{}", job.job_id, moves.len())),
            log,
            job.server.clone(),
            destination.clone(),
            target.leader.as_ref() == Some(&job.server),
            job.creator.clone(),
        );
        child.parent_job = Some(job.job_id.clone());
        moves.push(child);
    }

    let mut pending = job.clone();
    pending.time_started = Some(ctx.now);
    let mut transaction = transition(
        &Job::CleanOutServer(pending),
        raw,
        JobState::ToDo,
        JobState::Pending,
        ctx.now,
        None,
    )?
    .set(lock.clone(), job.job_id.as_str())
    .push(paths::to_be_cleaned_servers(), job.server.as_str())
    .expect_empty(lock);
    for child in &moves {
        let path = paths::job(JobState::ToDo, &child.job_id);
        transaction = transaction
            .set(path.clone(), serde_json::to_value(Job::MoveShard(child.clone()))?)
            .expect_empty(path);
    }

    Ok(Some(JobStep::new(
        transaction,
        format!("cleaning out {} with {} moves", job.server, moves.len()),
    )))
}

/// Finish once no Target references the server and every move ended
pub(super) fn check(
    job: &CleanOutServerJob,
    ctx: &JobContext<'_>,
) -> ReplicationResult<Option<JobStep>> {
    let Some(raw) = ctx.raw_job(JobState::Pending, &job.job_id) else {
        return Ok(None);
    };
    if !listed(ctx, &paths::to_be_cleaned_servers(), &job.server) {
        return fail(job, raw, JobState::Pending, ctx, "server no longer to be cleaned");
    }

    let children = children(ctx, &job.job_id);
    let active = children
        .iter()
        .filter(|(state, _)| matches!(state, JobState::ToDo | JobState::Pending))
        .count();
    if active > 0 {
        return Ok(None);
    }

    let referenced = targets(ctx)?
        .iter()
        .any(|(_, target)| target.participants.contains_key(&job.server));
    if referenced {
        return fail(job, raw, JobState::Pending, ctx, "server still in use after moves ended");
    }

    let transaction = transition(
        &Job::CleanOutServer(job.clone()),
        raw,
        JobState::Pending,
        JobState::Finished,
        ctx.now,
        None,
    )?
    .delete(paths::server_lock(&job.server))
    .erase(paths::to_be_cleaned_servers(), job.server.as_str())
    .push(paths::cleaned_servers(), job.server.as_str())
    .expect_in(paths::to_be_cleaned_servers(), job.server.as_str());
    Ok(Some(JobStep::new(
        transaction,
        format!("cleaned out {}", job.server),
    )))
}

/// Fail the job and abort moves that did not start yet
pub(super) fn abort(
    job: &CleanOutServerJob,
    raw: &Value,
    ctx: &JobContext<'_>,
) -> ReplicationResult<JobStep> {
    let mut transaction = transition(
        &Job::CleanOutServer(job.clone()),
        raw,
        JobState::Pending,
        JobState::Failed,
        ctx.now,
        Some("aborted".to_string()),
    )?
    .delete(paths::server_lock(&job.server))
    .erase(paths::to_be_cleaned_servers(), job.server.as_str());

    for (state, child) in children(ctx, &job.job_id) {
        if state != JobState::ToDo {
            continue;
        }
        let Some(raw_child) = ctx.raw_job(state, &child.job_id) else {
            continue;
        };
        let child_transition = transition(
            &Job::MoveShard(child),
            raw_child,
            JobState::ToDo,
            JobState::Finished,
            ctx.now,
            Some("parent aborted".to_string()),
        )?;
        for (path, operation) in child_transition.operations() {
            transaction = transaction.operation(path.clone(), operation.clone());
        }
        for (path, precondition) in child_transition.preconditions() {
            transaction = transaction.precondition(path.clone(), precondition.clone());
        }
    }

    Ok(JobStep::new(transaction, "aborted"))
}
