//! Server health as seen by the supervision

use std::collections::BTreeMap;

use async_trait::async_trait;
use proven_agency::AgencyStore;
use serde_json::{Value, json};

use crate::error::{Error, ReplicationResult};
use crate::paths;
use crate::types::ParticipantId;

const GOOD: &str = "GOOD";
const FAILED: &str = "FAILED";

/// Health of every known server at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    servers: BTreeMap<ParticipantId, bool>,
}

impl HealthSnapshot {
    /// Build a snapshot from `(server, healthy)` pairs
    pub fn new(servers: impl IntoIterator<Item = (ParticipantId, bool)>) -> Self {
        Self {
            servers: servers.into_iter().collect(),
        }
    }

    /// Whether `participant` is known and healthy
    #[must_use]
    pub fn is_healthy(&self, participant: &ParticipantId) -> bool {
        self.servers.get(participant).copied().unwrap_or(false)
    }

    /// Whether `participant` is known at all
    #[must_use]
    pub fn is_known(&self, participant: &ParticipantId) -> bool {
        self.servers.contains_key(participant)
    }

    /// All known servers
    pub fn servers(&self) -> impl Iterator<Item = &ParticipantId> {
        self.servers.keys()
    }

    /// Healthy servers in id order
    pub fn healthy(&self) -> impl Iterator<Item = &ParticipantId> {
        self.servers
            .iter()
            .filter(|(_, healthy)| **healthy)
            .map(|(id, _)| id)
    }
}

/// Source of server health, standing in for the cluster health checker
#[async_trait]
pub trait HealthMonitor: Send + Sync + 'static {
    /// Health of all known servers
    async fn snapshot(&self) -> ReplicationResult<HealthSnapshot>;

    /// Whether one server is healthy
    async fn is_healthy(&self, participant: &ParticipantId) -> ReplicationResult<bool> {
        Ok(self.snapshot().await?.is_healthy(participant))
    }

    /// All known servers
    async fn servers(&self) -> ReplicationResult<Vec<ParticipantId>> {
        Ok(self.snapshot().await?.servers().cloned().collect())
    }
}

/// Reads health records from `/Supervision/Health/<pid>/Status`
#[derive(Debug, Clone)]
pub struct AgencyHealth<A>
where
    A: AgencyStore,
{
    agency: A,
}

impl<A> AgencyHealth<A>
where
    A: AgencyStore,
{
    /// Create a monitor reading from `agency`
    pub const fn new(agency: A) -> Self {
        Self { agency }
    }
}

#[async_trait]
impl<A> HealthMonitor for AgencyHealth<A>
where
    A: AgencyStore,
{
    async fn snapshot(&self) -> ReplicationResult<HealthSnapshot> {
        let root = paths::health_root();
        let snapshot = self
            .agency
            .read(std::slice::from_ref(&root))
            .await
            .map_err(Error::agency)?;

        Ok(HealthSnapshot::new(snapshot.children(&root).into_iter().map(
            |server| {
                let participant = ParticipantId::new(server);
                let healthy =
                    snapshot.get(&paths::health_status(&participant)) == Some(&json!(GOOD));
                (participant, healthy)
            },
        )))
    }
}

/// Record the health of a server
pub async fn set_health<A: AgencyStore>(
    agency: &A,
    participant: &ParticipantId,
    healthy: bool,
) -> ReplicationResult<()> {
    let status = if healthy { GOOD } else { FAILED };
    agency
        .write(paths::health_status(participant), Value::from(status))
        .await
        .map_err(Error::agency)?;
    Ok(())
}

/// The health record value of a healthy server
#[must_use]
pub fn good() -> Value {
    json!(GOOD)
}
