//! An in-process cluster: agency, supervision and a set of servers sharing one
//! memory network.

use std::collections::BTreeMap;
use std::sync::Arc;

use proven_agency::AgencyStore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::config::ReplicationConfig;
use crate::convergence;
use crate::error::{Error, ReplicationResult};
use crate::health::{AgencyHealth, set_health};
use crate::jobs::JobManager;
use crate::network::MemoryNetwork;
use crate::server::ParticipantServer;
use crate::state::ReplicatedStateClient;
use crate::supervision::Supervision;
use crate::types::{GlobalLogId, ParticipantId};
use crate::view::LogView;

const DEFAULT_SERVERS: usize = 3;

/// Builder for [`LocalCluster`]
#[derive(Debug, Clone)]
pub struct ClusterBuilder {
    servers: usize,
    config: ReplicationConfig,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self {
            servers: DEFAULT_SERVERS,
            config: ReplicationConfig::default(),
        }
    }
}

impl ClusterBuilder {
    /// Start from three servers and the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of servers
    #[must_use]
    pub const fn servers(mut self, servers: usize) -> Self {
        self.servers = servers;
        self
    }

    /// Replication configuration shared by all components
    #[must_use]
    pub fn config(mut self, config: ReplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the servers on top of `agency` and mark them healthy.
    ///
    /// Nothing runs until [`LocalCluster::start`].
    pub async fn build<A: AgencyStore>(self, agency: A) -> ReplicationResult<LocalCluster<A>> {
        let network = Arc::new(MemoryNetwork::new());
        let mut servers = BTreeMap::new();

        for n in 1..=self.servers {
            let id = server_id(n);
            let server = Arc::new(ParticipantServer::new(
                id.clone(),
                agency.clone(),
                network.clone(),
                self.config.participant.clone(),
            ));
            network.register(id.clone(), server.endpoint());
            set_health(&agency, &id, true).await?;
            servers.insert(id, server);
        }

        let supervision = Arc::new(Supervision::new(
            agency.clone(),
            Arc::new(AgencyHealth::new(agency.clone())),
            self.config.supervision.clone(),
        ));

        Ok(LocalCluster {
            agency,
            network,
            servers,
            supervision,
            config: self.config,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        })
    }
}

fn server_id(n: usize) -> ParticipantId {
    ParticipantId::new(format!("PRMR-{n:03}"))
}

/// Agency, supervision and servers of a cluster running in one process
pub struct LocalCluster<A>
where
    A: AgencyStore,
{
    agency: A,
    network: Arc<MemoryNetwork>,
    servers: BTreeMap<ParticipantId, Arc<ParticipantServer<A, MemoryNetwork>>>,
    supervision: Arc<Supervision<A, AgencyHealth<A>>>,
    config: ReplicationConfig,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl<A> LocalCluster<A>
where
    A: AgencyStore,
{
    /// Start the supervision and every server loop
    pub fn start(&self) {
        self.supervision
            .clone()
            .start(&self.task_tracker, &self.cancellation_token);
        for server in self.servers.values() {
            server
                .clone()
                .start(&self.task_tracker, &self.cancellation_token);
        }
        info!("cluster started with {} servers", self.servers.len());
    }

    /// Stop every loop and wait for them to finish
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        info!("cluster stopped");
    }

    /// The agency
    pub const fn agency(&self) -> &A {
        &self.agency
    }

    /// The network connecting the servers
    #[must_use]
    pub fn network(&self) -> Arc<MemoryNetwork> {
        self.network.clone()
    }

    /// The configuration
    pub const fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// The supervision
    #[must_use]
    pub fn supervision(&self) -> Arc<Supervision<A, AgencyHealth<A>>> {
        self.supervision.clone()
    }

    /// Ids of all servers, in order
    #[must_use]
    pub fn server_ids(&self) -> Vec<ParticipantId> {
        self.servers.keys().cloned().collect()
    }

    /// A server by id
    pub fn server(
        &self,
        id: &ParticipantId,
    ) -> ReplicationResult<Arc<ParticipantServer<A, MemoryNetwork>>> {
        self.servers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("server {id}")))
    }

    /// A client for replicated state Targets
    #[must_use]
    pub fn client(&self) -> ReplicatedStateClient<A> {
        ReplicatedStateClient::new(self.agency.clone(), self.config.client.clone())
    }

    /// A client for supervision jobs
    #[must_use]
    pub fn jobs(&self) -> JobManager<A> {
        JobManager::new(self.agency.clone())
    }

    /// Pause a server and report it unhealthy
    pub async fn stop_server(&self, id: &ParticipantId) -> ReplicationResult<()> {
        self.server(id)?.stop();
        set_health(&self.agency, id, false).await
    }

    /// Resume a server and report it healthy
    pub async fn resume_server(&self, id: &ParticipantId) -> ReplicationResult<()> {
        self.server(id)?.resume();
        set_health(&self.agency, id, true).await
    }

    /// Wait until `predicate` holds for `log`, see [`convergence::wait_for_log`]
    pub async fn wait_for_log<P>(&self, log: &GlobalLogId, predicate: P) -> ReplicationResult<LogView>
    where
        P: Fn(&LogView) -> bool,
    {
        convergence::wait_for_log(
            &self.agency,
            log,
            &self.config.convergence,
            &self.cancellation_token,
            predicate,
        )
        .await
    }
}
