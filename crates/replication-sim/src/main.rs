//! Runs failure scenarios against an in-process replicated log cluster.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use proven_agency_memory::MemoryAgency;
use proven_replication::types::{GlobalLogId, LogConfig, LogId, LogTerm, ParticipantId};
use proven_replication::{
    ClusterBuilder, JobStatus, LocalCluster, LogView, ReplicationConfig, StateImplementation,
    convergence,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Replication error
    #[error(transparent)]
    Replication(#[from] proven_replication::Error),

    /// Config file could not be read
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid command line
    #[error("invalid arguments: {0}")]
    Args(String),

    /// A job ended unexpectedly
    #[error("job failed: {0}")]
    Job(String),
}

/// Failure scenario to run
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    /// Stop the leader and wait for a new one
    Failover,
    /// Stop the leader and a follower so that no leader can be elected
    FailoverImpossible,
    /// Replace a follower by a stopped server, then resume it
    Replacement,
    /// Move the leader to a spare server with a moveShard job
    MoveShard,
    /// Move every log off a server with a cleanOutServer job
    CleanOutServer,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario to run
    #[arg(long, value_enum, default_value_t = Scenario::Failover, env = "PROVEN_SIM_SCENARIO")]
    scenario: Scenario,

    /// TOML file with a replication config
    #[arg(long, env = "PROVEN_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Number of servers in the cluster
    #[arg(long, default_value_t = 4, env = "PROVEN_SIM_SERVERS")]
    servers: usize,

    /// Participants per log
    #[arg(long, default_value_t = 3, env = "PROVEN_SIM_REPLICATION_FACTOR")]
    replication_factor: usize,

    /// Write concern of the log
    #[arg(long, default_value_t = 2, env = "PROVEN_SIM_WRITE_CONCERN")]
    write_concern: usize,
}

type Cluster = LocalCluster<MemoryAgency>;

fn load_config(path: Option<&PathBuf>) -> Result<ReplicationConfig, Error> {
    match path {
        Some(path) => Ok(toml::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(ReplicationConfig::default()),
    }
}

fn leader_of(view: &LogView) -> Result<ParticipantId, Error> {
    view.plan
        .as_ref()
        .and_then(|plan| plan.leader().cloned())
        .ok_or_else(|| Error::Args("log has no leader".to_string()))
}

fn describe(view: &LogView) {
    let Some(plan) = &view.plan else {
        info!("no plan");
        return;
    };
    let participants: Vec<_> = plan
        .participants_config
        .participants
        .iter()
        .map(|(id, flags)| format!("{id}{}", if flags.allowed_in_quorum { "" } else { "(excluded)" }))
        .collect();
    info!(
        "term {} leader {:?} generation {} participants [{}]",
        plan.term(),
        plan.leader().map(ParticipantId::as_str),
        plan.participants_config.generation,
        participants.join(", ")
    );
    if let Some(supervision) = view.current.as_ref().and_then(|c| c.supervision.as_ref()) {
        for entry in &supervision.status_report {
            info!("  status: {entry:?}");
        }
        if let Some(election) = &supervision.election {
            info!(
                "  election in term {}: {} of {} required",
                election.term, election.participants_available, election.participants_required
            );
        }
    }
}

async fn wait_for_job(cluster: &Cluster, id: &proven_replication::types::JobId) -> Result<(), Error> {
    let timeout = cluster.config().convergence.timeout;
    let poll = cluster.config().convergence.poll_interval;
    let started = tokio::time::Instant::now();
    loop {
        match cluster.jobs().status(id).await? {
            JobStatus::Completed { failed: false } => return Ok(()),
            JobStatus::Completed { failed: true } => return Err(Error::Job(id.to_string())),
            JobStatus::NotFound => return Err(Error::Job(format!("{id} vanished"))),
            JobStatus::Pending => {}
        }
        if started.elapsed() > timeout {
            return Err(Error::Job(format!("{id} timed out")));
        }
        tokio::time::sleep(poll).await;
    }
}

async fn run(cluster: &Cluster, args: &Args) -> Result<(), Error> {
    let servers = cluster.server_ids();
    if args.replication_factor > servers.len() {
        return Err(Error::Args(format!(
            "replication factor {} exceeds {} servers",
            args.replication_factor,
            servers.len()
        )));
    }
    let participants = servers[..args.replication_factor].to_vec();
    let spare = servers.get(args.replication_factor).cloned();

    let log = GlobalLogId::new("_system", LogId::new(100));
    cluster
        .client()
        .create(
            &log,
            participants.clone(),
            LogConfig::new(args.write_concern),
            StateImplementation::Prototype,
        )
        .await?;
    let view = cluster
        .wait_for_log(&log, |view| {
            convergence::leader_established(view) && convergence::target_version_converged(view)
        })
        .await?;
    describe(&view);

    let leader = leader_of(&view)?;
    let server = cluster.server(&leader)?;
    let index = server.insert(&log, json!({"insert": {"scenario": format!("{:?}", args.scenario)}}))?;
    server
        .wait_for_commit(&log, index, cluster.config().convergence.timeout)
        .await?;
    info!("entry {index} committed on {leader}");

    match args.scenario {
        Scenario::Failover => {
            cluster.stop_server(&leader).await?;
            let view = cluster
                .wait_for_log(&log, |view| {
                    convergence::leader_established(view)
                        && view.plan.as_ref().and_then(|plan| plan.leader()) != Some(&leader)
                })
                .await?;
            describe(&view);
            cluster.resume_server(&leader).await?;
            let view = cluster.wait_for_log(&log, convergence::plan_matches_current).await?;
            describe(&view);
        }
        Scenario::FailoverImpossible => {
            let follower = participants
                .iter()
                .find(|participant| **participant != leader)
                .cloned()
                .ok_or_else(|| Error::Args("log needs a follower".to_string()))?;
            cluster.stop_server(&follower).await?;
            cluster.stop_server(&leader).await?;
            let view = cluster
                .wait_for_log(&log, |view| {
                    convergence::election_failed(view, LogTerm::new(2), None)
                        && !convergence::leader_declared(view, LogTerm::new(2))
                })
                .await?;
            describe(&view);
            cluster.resume_server(&follower).await?;
            let view = cluster.wait_for_log(&log, convergence::leader_established).await?;
            describe(&view);
            cluster.resume_server(&leader).await?;
        }
        Scenario::Replacement => {
            let spare = spare.ok_or_else(|| Error::Args("needs a spare server".to_string()))?;
            let replaced = participants
                .iter()
                .rev()
                .find(|participant| **participant != leader)
                .cloned()
                .ok_or_else(|| Error::Args("log needs a follower".to_string()))?;
            cluster.stop_server(&spare).await?;
            cluster.client().replace_participant(&log, &replaced, &spare).await?;

            tokio::time::sleep(Duration::from_secs(1)).await;
            describe(&LogView::read(cluster.agency(), &log).await?);

            cluster.resume_server(&spare).await?;
            let view = cluster
                .wait_for_log(&log, convergence::target_version_converged)
                .await?;
            describe(&view);
        }
        Scenario::MoveShard => {
            let spare = spare.ok_or_else(|| Error::Args("needs a spare server".to_string()))?;
            let id = cluster
                .jobs()
                .create_move_shard(&log, &leader, &spare, true)
                .await?;
            wait_for_job(cluster, &id).await?;
            let view = cluster
                .wait_for_log(&log, |view| {
                    convergence::leader_established(view)
                        && convergence::target_version_converged(view)
                })
                .await?;
            describe(&view);
        }
        Scenario::CleanOutServer => {
            let id = cluster.jobs().create_clean_out_server(&leader).await?;
            wait_for_job(cluster, &id).await?;
            let view = cluster
                .wait_for_log(&log, |view| {
                    convergence::leader_established(view)
                        && convergence::target_version_converged(view)
                })
                .await?;
            describe(&view);
        }
    }

    for id in &participants {
        if let Some(state) = cluster.server(id)?.replicated_state(&log) {
            info!("{id}: {state}");
        }
    }
    Ok(())
}

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let cluster = ClusterBuilder::new()
        .servers(args.servers)
        .config(config)
        .build(MemoryAgency::new())
        .await?;
    cluster.start();
    info!("running scenario {:?}", args.scenario);

    let result = tokio::select! {
        result = run(&cluster, &args) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal");
            Ok(())
        }
    };

    cluster.shutdown().await;
    match &result {
        Ok(()) => info!("scenario {:?} done", args.scenario),
        Err(e) => warn!("scenario {:?} failed: {e}", args.scenario),
    }
    result
}
