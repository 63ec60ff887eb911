//! moveShard and cleanOutServer jobs

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{cluster, create_ready_log, log, pid, pids, run_until};
use proven_agency::AgencyStore;
use proven_replication::jobs::Job;
use proven_replication::types::{JobId, LogConfig};
use proven_replication::{
    ErrorKind, JobState, JobStatus, StateImplementation, convergence, paths,
};

async fn wait_for_job(cluster: &common::TestCluster, id: &JobId) -> JobStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let status = cluster.jobs().status(id).await.unwrap();
        if matches!(status, JobStatus::Completed { .. }) {
            return status;
        }
        assert!(tokio::time::Instant::now() < deadline, "job {id} did not complete");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_shard_replaces_follower() {
    let cluster = cluster(4).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 300, &servers, 2, StateImplementation::BlackHole).await;

    let id = cluster
        .jobs()
        .create_move_shard(&log(300), &pid(2), &pid(4), false)
        .await
        .unwrap();
    assert_eq!(wait_for_job(&cluster, &id).await, JobStatus::Completed { failed: false });

    let view = cluster
        .wait_for_log(&log(300), convergence::target_version_converged)
        .await
        .unwrap();
    let target = view.target.unwrap();
    assert!(target.participants.contains_key(&pid(4)));
    assert!(!target.participants.contains_key(&pid(2)));
    let plan = view.plan.unwrap();
    assert!(plan.flags(&pid(4)).is_some_and(|flags| flags.allowed_in_quorum));
    assert!(plan.flags(&pid(2)).is_none());

    // The shard lock is released
    let snapshot = cluster
        .agency()
        .read(&[paths::shard_lock(&log(300))])
        .await
        .unwrap();
    assert!(!snapshot.contains(&paths::shard_lock(&log(300))));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_shard_moves_leadership() {
    let cluster = cluster(4).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 301, &servers, 2, StateImplementation::BlackHole).await;

    let id = cluster
        .jobs()
        .create_move_shard(&log(301), &pid(1), &pid(4), true)
        .await
        .unwrap();
    assert_eq!(wait_for_job(&cluster, &id).await, JobStatus::Completed { failed: false });

    let view = cluster
        .wait_for_log(&log(301), |view| {
            convergence::target_version_converged(view) && convergence::leader_established(view)
        })
        .await
        .unwrap();
    assert_eq!(view.plan.unwrap().leader(), Some(&pid(4)));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_move_shard_to_unknown_server_fails() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 302, &servers, 2, StateImplementation::BlackHole).await;

    let id = cluster
        .jobs()
        .create_move_shard(&log(302), &pid(2), &pid(9), false)
        .await
        .unwrap();
    assert_eq!(wait_for_job(&cluster, &id).await, JobStatus::Completed { failed: true });

    let target = cluster.client().read_target(&log(302)).await.unwrap().unwrap();
    assert_eq!(target.version, Some(1));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clean_out_server_moves_every_log() {
    let cluster = cluster(4).await;
    cluster.start();

    create_ready_log(&cluster, 310, &pids(1..=3), 2, StateImplementation::BlackHole).await;
    create_ready_log(&cluster, 311, &pids(1..=3), 2, StateImplementation::BlackHole).await;

    let id = cluster.jobs().create_clean_out_server(&pid(3)).await.unwrap();
    assert_eq!(wait_for_job(&cluster, &id).await, JobStatus::Completed { failed: false });

    for log in [log(310), log(311)] {
        let view = cluster
            .wait_for_log(&log, convergence::target_version_converged)
            .await
            .unwrap();
        let plan = view.plan.unwrap();
        assert!(plan.flags(&pid(3)).is_none());
        assert!(plan.flags(&pid(4)).is_some());
    }

    let snapshot = cluster
        .agency()
        .read(&[paths::server_lock(&pid(3))])
        .await
        .unwrap();
    assert!(!snapshot.contains(&paths::server_lock(&pid(3))));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_abort_jobs() {
    let cluster = cluster(4).await;
    let jobs = cluster.jobs();
    cluster
        .client()
        .create(
            &log(320),
            pids(1..=3),
            LogConfig::new(2),
            StateImplementation::BlackHole,
        )
        .await
        .unwrap();
    run_until(&cluster, &log(320), convergence::target_version_converged).await;

    // Not started yet: finished without effect
    let todo = jobs
        .create_move_shard(&log(320), &pid(2), &pid(4), false)
        .await
        .unwrap();
    jobs.abort(&todo).await.unwrap();
    assert_eq!(jobs.status(&todo).await.unwrap(), JobStatus::Completed { failed: false });
    let err = jobs.abort(&todo).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = jobs.abort(&JobId::new("no-such-job")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Started: failed and the Target restored
    let pending = jobs
        .create_move_shard(&log(320), &pid(2), &pid(4), false)
        .await
        .unwrap();
    cluster.supervision().run_once().await.unwrap();
    let (state, _) = jobs.get(&pending).await.unwrap().unwrap();
    assert_eq!(state, JobState::Pending);
    let target = cluster.client().read_target(&log(320)).await.unwrap().unwrap();
    assert!(target.participants.contains_key(&pid(4)));

    jobs.abort(&pending).await.unwrap();
    let (state, job) = jobs.get(&pending).await.unwrap().unwrap();
    assert_eq!(state, JobState::Failed);
    assert_eq!(job.reason(), Some("aborted"));
    assert_matches!(job, Job::MoveShard(_));

    let target = cluster.client().read_target(&log(320)).await.unwrap().unwrap();
    assert!(target.participants.contains_key(&pid(2)));
    assert!(!target.participants.contains_key(&pid(4)));
    let snapshot = cluster
        .agency()
        .read(&[paths::shard_lock(&log(320))])
        .await
        .unwrap();
    assert!(!snapshot.contains(&paths::shard_lock(&log(320))));

    // The supervision converges on the restored Target
    run_until(&cluster, &log(320), |view| {
        convergence::target_version_converged(view)
            && view.plan.as_ref().is_some_and(|plan| plan.flags(&pid(4)).is_none())
    })
    .await;
}
