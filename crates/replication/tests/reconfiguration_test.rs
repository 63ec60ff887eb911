//! Participant replacement, config changes and log deletion

mod common;

use std::time::Duration;

use common::{cluster, create_ready_log, log, pid, pids, run_rounds, run_until};
use proven_agency::AgencyStore;
use proven_replication::supervision::StatusReportEntry;
use proven_replication::types::{LogConfig, LogTerm, ParticipantFlags};
use proven_replication::{LogView, StateImplementation, convergence};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replacement_waits_for_stopped_participant() {
    let cluster = cluster(4).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 200, &servers, 2, StateImplementation::Prototype).await;
    let leader = cluster.server(&pid(1)).unwrap();
    let index = leader
        .insert(&log(200), json!({"insert": {"k": "v"}}))
        .unwrap();
    leader
        .wait_for_commit(&log(200), index, Duration::from_secs(5))
        .await
        .unwrap();

    cluster.stop_server(&pid(4)).await.unwrap();
    let target = cluster
        .client()
        .replace_participant(&log(200), &pid(3), &pid(4))
        .await
        .unwrap();
    assert_eq!(target.version, Some(2));

    let view = cluster
        .wait_for_log(&log(200), |view| {
            let Some(report) = view
                .current
                .as_ref()
                .and_then(|current| current.supervision.as_ref())
                .map(|supervision| &supervision.status_report)
            else {
                return false;
            };
            report.contains(&StatusReportEntry::ServerSnapshotMissing { participant: pid(4) })
                && report.contains(&StatusReportEntry::InsufficientSnapshotCoverage {
                    participant: pid(3),
                })
        })
        .await
        .unwrap();

    let plan = view.plan.unwrap();
    assert_eq!(plan.flags(&pid(4)), Some(&ParticipantFlags::excluded()));
    assert!(plan.flags(&pid(3)).is_some());
    let view = LogView::read(cluster.agency(), &log(200)).await.unwrap();
    assert!(!convergence::target_version_converged(&view));

    cluster.resume_server(&pid(4)).await.unwrap();
    let view = cluster
        .wait_for_log(&log(200), convergence::target_version_converged)
        .await
        .unwrap();

    let plan = view.plan.unwrap();
    assert_eq!(plan.flags(&pid(4)), Some(&ParticipantFlags::default()));
    assert_eq!(plan.flags(&pid(3)), None);
    let supervision = view.current.unwrap().supervision.unwrap();
    assert!(supervision.status_report.is_empty());

    // The new participant caught up through a snapshot
    let replaced = cluster.server(&pid(4)).unwrap();
    replaced
        .wait_for_commit(&log(200), index, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(replaced.replicated_state(&log(200)).unwrap(), json!({"k": "v"}));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leader_transfer_to_target_leader() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 201, &servers, 2, StateImplementation::BlackHole).await;

    cluster.client().set_leader(&log(201), &pid(3)).await.unwrap();
    let view = cluster
        .wait_for_log(&log(201), |view| {
            convergence::target_version_converged(view)
                && convergence::replicated_log_is_ready(view, LogTerm::new(2), &servers, &pid(3))
        })
        .await
        .unwrap();
    assert_eq!(view.plan.unwrap().term(), LogTerm::new(2));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_config_change_bumps_generation() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    let view = create_ready_log(&cluster, 202, &servers, 2, StateImplementation::BlackHole).await;
    let generation = view.plan.unwrap().participants_config.generation;

    cluster
        .client()
        .set_config(&log(202), LogConfig::new(3))
        .await
        .unwrap();
    let view = cluster
        .wait_for_log(&log(202), convergence::target_version_converged)
        .await
        .unwrap();

    let config = view.plan.unwrap().participants_config;
    assert_eq!(config.config.write_concern, 3);
    assert_eq!(config.effective_write_concern, 3);
    assert!(config.generation > generation);

    // A write concern above the replication factor is rejected up front
    let err = cluster
        .client()
        .set_config(&log(202), LogConfig::new(4))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), proven_replication::ErrorKind::InvalidConfig);

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deleted_target_removes_plan_and_current() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 203, &servers, 2, StateImplementation::BlackHole).await;

    cluster.client().delete(&log(203)).await.unwrap();
    cluster
        .wait_for_log(&log(203), convergence::log_is_gone)
        .await
        .unwrap();

    // Servers drop their replicas and never recreate Current
    tokio::time::sleep(Duration::from_millis(200)).await;
    let view = LogView::read(cluster.agency(), &log(203)).await.unwrap();
    assert!(view.is_gone());
    for server in &servers {
        assert!(cluster.server(server).unwrap().local_state(&log(203)).is_none());
    }

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_target_updates_all_apply() {
    let cluster = cluster(4).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 204, &servers, 2, StateImplementation::BlackHole).await;

    let client = cluster.client();
    let id = log(204);
    let added_server = pid(4);
    let (added, config) = tokio::join!(
        client.add_participant(&id, &added_server),
        client.set_config(&id, LogConfig::new(3)),
    );
    added.unwrap();
    config.unwrap();

    let target = client.read_target(&log(204)).await.unwrap().unwrap();
    assert_eq!(target.version, Some(3));
    assert!(target.participants.contains_key(&pid(4)));
    assert_eq!(target.config.write_concern, 3);

    cluster
        .wait_for_log(&log(204), convergence::target_version_converged)
        .await
        .unwrap();

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_converged_supervision_writes_nothing() {
    let cluster = cluster(3).await;

    let servers = pids(1..=3);
    cluster
        .client()
        .create(
            &log(205),
            servers.iter().cloned(),
            LogConfig::new(2),
            StateImplementation::BlackHole,
        )
        .await
        .unwrap();

    run_until(&cluster, &log(205), |view| {
        convergence::target_version_converged(view) && convergence::plan_matches_current(view)
    })
    .await;
    run_rounds(&cluster, 5).await;

    let index = cluster.agency().index().await.unwrap();
    for _ in 0..5 {
        assert_eq!(cluster.supervision().run_once().await.unwrap(), 0);
    }
    run_rounds(&cluster, 5).await;
    assert_eq!(cluster.agency().index().await.unwrap(), index);
}
