//! Shared helpers for replication integration tests

#![allow(dead_code)]

use std::time::Duration;

use proven_agency_memory::MemoryAgency;
use proven_replication::types::{GlobalLogId, LogConfig, LogId, LogTerm, ParticipantId};
use proven_replication::{
    ClusterBuilder, ConvergenceConfig, LocalCluster, LogView, ParticipantConfig, ReplicationConfig,
    StateImplementation, SupervisionConfig, convergence,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub type TestCluster = LocalCluster<MemoryAgency>;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("proven_replication=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> ReplicationConfig {
    ReplicationConfig {
        supervision: SupervisionConfig {
            tick_interval: Duration::from_millis(20),
            job_timeout: Duration::from_secs(30),
        },
        participant: ParticipantConfig {
            tick_interval: Duration::from_millis(10),
            append_timeout: Duration::from_millis(200),
            snapshot_timeout: Duration::from_secs(2),
        },
        convergence: ConvergenceConfig {
            timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(10),
        },
        ..ReplicationConfig::default()
    }
}

/// A cluster with `servers` servers whose loops are not running yet
pub async fn cluster(servers: usize) -> TestCluster {
    init_logging();
    ClusterBuilder::new()
        .servers(servers)
        .config(test_config())
        .build(MemoryAgency::new())
        .await
        .unwrap()
}

pub fn pid(n: usize) -> ParticipantId {
    ParticipantId::new(format!("PRMR-{n:03}"))
}

pub fn pids(range: impl IntoIterator<Item = usize>) -> Vec<ParticipantId> {
    range.into_iter().map(pid).collect()
}

pub fn log(id: u64) -> GlobalLogId {
    GlobalLogId::new("_system", LogId::new(id))
}

/// Create a log on `participants` and wait until its first leader is established
pub async fn create_ready_log(
    cluster: &TestCluster,
    id: u64,
    participants: &[ParticipantId],
    write_concern: usize,
    implementation: StateImplementation,
) -> LogView {
    let log = log(id);
    cluster
        .client()
        .create(
            &log,
            participants.iter().cloned(),
            LogConfig::new(write_concern),
            implementation,
        )
        .await
        .unwrap();

    let leader = participants[0].clone();
    cluster
        .wait_for_log(&log, |view| {
            convergence::replicated_log_is_ready(view, LogTerm::new(1), participants, &leader)
                && convergence::target_version_converged(view)
        })
        .await
        .unwrap()
}

/// Drive every component by hand for `rounds` rounds
pub async fn run_rounds(cluster: &TestCluster, rounds: usize) {
    for _ in 0..rounds {
        cluster.supervision().run_once().await.unwrap();
        for id in cluster.server_ids() {
            cluster.server(&id).unwrap().tick().await.unwrap();
        }
    }
}

/// Drive every component by hand until `predicate` holds
pub async fn run_until(cluster: &TestCluster, log: &GlobalLogId, predicate: impl Fn(&LogView) -> bool) -> LogView {
    for _ in 0..200 {
        run_rounds(cluster, 1).await;
        let view = LogView::read(cluster.agency(), log).await.unwrap();
        if predicate(&view) {
            return view;
        }
    }
    panic!("{log} did not converge");
}
