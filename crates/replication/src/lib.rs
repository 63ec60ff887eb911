//! Replicated logs driven by an agency.
//!
//! Clients describe the desired state of a log in its Target. The
//! [`Supervision`] turns the Target into a Plan, one step per round: it creates
//! the first term, elects and replaces leaders, phases participants in and out
//! and acknowledges converged Target versions. Every [`ParticipantServer`]
//! follows the Plan, replicates entries within the planned term and reports
//! its progress into Current, which in turn feeds the next supervision round.
//!
//! Everything talks through an [`AgencyStore`](proven_agency::AgencyStore) with
//! compare-and-swap transactions, so any number of writers may race safely.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cluster;
mod config;
mod error;
mod health;
mod network;
mod server;
mod view;

pub mod convergence;
pub mod jobs;
pub mod log;
pub mod paths;
pub mod quorum;
pub mod state;
pub mod supervision;
pub mod types;

pub use cluster::{ClusterBuilder, LocalCluster};
pub use config::{
    ClientConfig, ConvergenceConfig, ParticipantConfig, ReplicationConfig, SupervisionConfig,
};
pub use error::{Error, ErrorContext, ErrorKind, ReplicationResult};
pub use health::{AgencyHealth, HealthMonitor, HealthSnapshot, set_health};
pub use jobs::{Job, JobManager, JobState, JobStatus};
pub use network::{MemoryNetwork, ParticipantEndpoint, ParticipantNetwork};
pub use server::{ParticipantHost, ParticipantServer};
pub use state::{ReplicatedStateClient, StateImplementation, StateMachine};
pub use supervision::Supervision;
pub use view::{LogView, logs_in};
