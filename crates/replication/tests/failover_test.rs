//! Leader failover driven by the supervision

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{cluster, create_ready_log, log, pid, pids};
use proven_replication::convergence;
use proven_replication::supervision::{ElectionCode, StatusReportEntry};
use proven_replication::types::LogTerm;
use proven_replication::{LogView, StateImplementation};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failover_elects_new_leader_two_terms_later() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    let view = create_ready_log(&cluster, 100, &servers, 2, StateImplementation::Prototype).await;
    assert_eq!(view.plan.as_ref().unwrap().term(), LogTerm::new(1));

    let leader = cluster.server(&pid(1)).unwrap();
    let index = leader
        .insert(&log(100), json!({"insert": {"before": 1}}))
        .unwrap();
    leader
        .wait_for_commit(&log(100), index, Duration::from_secs(5))
        .await
        .unwrap();

    tracing::info!("=== Stopping the leader ===");
    cluster.stop_server(&pid(1)).await.unwrap();

    // One term dismisses the old leader, the next one elects the new one
    let view = cluster
        .wait_for_log(&log(100), |view| {
            convergence::leader_established(view)
                && view.plan.as_ref().is_some_and(|plan| plan.leader() != Some(&pid(1)))
        })
        .await
        .unwrap();
    let plan = view.plan.unwrap();
    assert_eq!(plan.term(), LogTerm::new(3));
    let new_leader = plan.leader().cloned().unwrap();

    // Committed entries survive the failover
    let server = cluster.server(&new_leader).unwrap();
    assert_eq!(
        server.replicated_state(&log(100)).unwrap(),
        json!({"before": 1})
    );
    let index = server
        .insert(&log(100), json!({"insert": {"after": 2}}))
        .unwrap();
    server
        .wait_for_commit(&log(100), index, Duration::from_secs(5))
        .await
        .unwrap();

    tracing::info!("=== Resuming the old leader ===");
    cluster.resume_server(&pid(1)).await.unwrap();
    cluster
        .wait_for_log(&log(100), |view| {
            convergence::replicated_log_is_ready(view, LogTerm::new(3), &servers, &new_leader)
        })
        .await
        .unwrap();

    let old_leader = cluster.server(&pid(1)).unwrap();
    old_leader
        .wait_for_commit(&log(100), index, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        old_leader.replicated_state(&log(100)).unwrap(),
        json!({"before": 1, "after": 2})
    );

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failover_impossible_without_quorum() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 101, &servers, 2, StateImplementation::BlackHole).await;

    // A follower first, so the leader keeps its quorum until it stops too
    cluster.stop_server(&pid(2)).await.unwrap();
    cluster.stop_server(&pid(1)).await.unwrap();

    // Term 2 has no leader and only one of the two required participants
    let mut details = BTreeMap::new();
    details.insert(pid(1), ElectionCode::NotHealthy);
    details.insert(pid(2), ElectionCode::NotHealthy);
    let view = cluster
        .wait_for_log(&log(101), |view| {
            convergence::election_failed(view, LogTerm::new(2), Some(&details))
                && view
                    .current
                    .as_ref()
                    .and_then(|current| current.supervision.as_ref())
                    .and_then(|supervision| supervision.election.as_ref())
                    .is_some_and(|report| report.participants_available == 1)
        })
        .await
        .unwrap();

    let plan = view.plan.as_ref().unwrap();
    assert_eq!(plan.term(), LogTerm::new(2));
    assert_eq!(plan.leader(), None);
    let supervision = view.current.as_ref().unwrap().supervision.as_ref().unwrap();
    assert!(
        supervision
            .status_report
            .contains(&StatusReportEntry::LeaderElectionImpossible)
    );
    let report = supervision.election.as_ref().unwrap();
    assert_eq!(report.participants_required, 2);
    assert_eq!(report.participants_available, 1);

    cluster.resume_server(&pid(2)).await.unwrap();
    let view = cluster
        .wait_for_log(&log(101), convergence::leader_established)
        .await
        .unwrap();
    assert_eq!(view.plan.unwrap().term(), LogTerm::new(3));

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_write_concern_declares_but_cannot_establish() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 102, &servers, 3, StateImplementation::BlackHole).await;

    cluster.stop_server(&pid(1)).await.unwrap();

    let mut details = BTreeMap::new();
    details.insert(pid(1), ElectionCode::NotHealthy);
    let view = cluster
        .wait_for_log(&log(102), |view| {
            convergence::leader_declared(view, LogTerm::new(3))
                && convergence::election_failed(view, LogTerm::new(2), Some(&details))
        })
        .await
        .unwrap();
    let leader = view.plan.unwrap().leader().cloned().unwrap();
    assert_ne!(leader, pid(1));

    // Every commit needs all three servers
    tokio::time::sleep(Duration::from_millis(300)).await;
    let view = LogView::read(cluster.agency(), &log(102)).await.unwrap();
    assert!(!convergence::leader_established(&view));

    cluster.resume_server(&pid(1)).await.unwrap();
    cluster
        .wait_for_log(&log(102), |view| {
            convergence::replicated_log_is_ready(view, LogTerm::new(3), &servers, &leader)
        })
        .await
        .unwrap();

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_terms_never_decrease() {
    let cluster = cluster(3).await;
    cluster.start();

    let servers = pids(1..=3);
    create_ready_log(&cluster, 103, &servers, 2, StateImplementation::BlackHole).await;

    let mut last_term = LogTerm::new(1);
    let mut leader = pid(1);
    for _ in 0..3 {
        cluster.stop_server(&leader).await.unwrap();
        let view = cluster
            .wait_for_log(&log(103), |view| {
                convergence::leader_established(view)
                    && view
                        .plan
                        .as_ref()
                        .is_some_and(|plan| plan.leader() != Some(&leader))
            })
            .await
            .unwrap();
        let plan = view.plan.unwrap();
        assert!(plan.term() > last_term);
        last_term = plan.term();

        cluster.resume_server(&leader).await.unwrap();
        cluster
            .wait_for_log(&log(103), |view| {
                convergence::plan_matches_current(view)
                    && view.plan.as_ref().is_some_and(|plan| plan.term() == last_term)
            })
            .await
            .unwrap();

        for server in &servers {
            let local = cluster.server(server).unwrap().local_state(&log(103)).unwrap();
            assert_eq!(local.term, last_term);
        }
        leader = plan.leader().cloned().unwrap();
    }

    cluster.shutdown().await;
}
