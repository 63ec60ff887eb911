//! Replication configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Replication configuration
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Supervision loop configuration
    pub supervision: SupervisionConfig,

    /// Participant server configuration
    pub participant: ParticipantConfig,

    /// Convergence polling configuration
    pub convergence: ConvergenceConfig,

    /// Target update client configuration
    pub client: ClientConfig,
}

/// Supervision loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Interval between reconciliation rounds
    pub tick_interval: Duration,

    /// Pending jobs older than this are aborted
    pub job_timeout: Duration,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            job_timeout: Duration::from_secs(30),
        }
    }
}

/// Participant server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    /// Interval between participant ticks
    pub tick_interval: Duration,

    /// Timeout for a single append entries call
    pub append_timeout: Duration,

    /// Timeout for a snapshot transfer
    pub snapshot_timeout: Duration,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            append_timeout: Duration::from_millis(500),
            snapshot_timeout: Duration::from_secs(5),
        }
    }
}

/// Convergence polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Give up waiting after this long
    pub timeout: Duration,

    /// Interval between predicate evaluations
    pub poll_interval: Duration,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Target update client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Compare-and-swap attempts before giving up
    pub max_cas_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_cas_retries: 16,
        }
    }
}
