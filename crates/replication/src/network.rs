//! Transport between participants of a log

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::error::{Error, ReplicationResult};
use crate::log::{AppendEntriesRequest, AppendEntriesResult};
use crate::types::{GlobalLogId, LogSnapshot, ParticipantId};

/// Sends replication traffic to other servers
#[async_trait]
pub trait ParticipantNetwork: Send + Sync + 'static {
    /// Deliver an append entries request to the replica of `log` on `to`
    async fn append_entries(
        &self,
        to: &ParticipantId,
        log: &GlobalLogId,
        request: AppendEntriesRequest,
    ) -> ReplicationResult<AppendEntriesResult>;

    /// Fetch a snapshot of `log` from the leader running on `from`
    async fn request_snapshot(
        &self,
        from: &ParticipantId,
        log: &GlobalLogId,
    ) -> ReplicationResult<LogSnapshot>;
}

/// The receiving side of [`ParticipantNetwork`], implemented by servers
pub trait ParticipantEndpoint: Send + Sync + 'static {
    /// Handle an append entries request
    fn append_entries(
        &self,
        log: &GlobalLogId,
        request: AppendEntriesRequest,
    ) -> ReplicationResult<AppendEntriesResult>;

    /// Serve a snapshot
    fn snapshot(&self, log: &GlobalLogId) -> ReplicationResult<LogSnapshot>;
}

/// Routes calls between endpoints living in the same process
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<DashMap<ParticipantId, Arc<dyn ParticipantEndpoint>>>,
    delays: Arc<DashMap<ParticipantId, Duration>>,
}

impl MemoryNetwork {
    /// Create an empty network
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a server reachable
    pub fn register(&self, id: ParticipantId, endpoint: Arc<dyn ParticipantEndpoint>) {
        self.endpoints.insert(id, endpoint);
    }

    /// Delay every call to a server, e.g. to simulate a stalled follower
    pub fn set_delay(&self, id: ParticipantId, delay: Option<Duration>) {
        match delay {
            Some(delay) => {
                self.delays.insert(id, delay);
            }
            None => {
                self.delays.remove(&id);
            }
        }
    }

    async fn endpoint(&self, id: &ParticipantId) -> ReplicationResult<Arc<dyn ParticipantEndpoint>> {
        let delay = self.delays.get(id).map(|delay| *delay);
        if let Some(delay) = delay {
            trace!("delaying call to {id} by {delay:?}");
            tokio::time::sleep(delay).await;
        }

        self.endpoints
            .get(id)
            .map(|endpoint| endpoint.value().clone())
            .ok_or_else(|| Error::unavailable(format!("{id} is not reachable")))
    }
}

#[async_trait]
impl ParticipantNetwork for MemoryNetwork {
    async fn append_entries(
        &self,
        to: &ParticipantId,
        log: &GlobalLogId,
        request: AppendEntriesRequest,
    ) -> ReplicationResult<AppendEntriesResult> {
        self.endpoint(to).await?.append_entries(log, request)
    }

    async fn request_snapshot(
        &self,
        from: &ParticipantId,
        log: &GlobalLogId,
    ) -> ReplicationResult<LogSnapshot> {
        self.endpoint(from).await?.snapshot(log)
    }
}
