//! A server hosting replicas of many logs, driven by the Plan

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::Mutex;
use proven_agency::{AgencyStore, Transaction, WriteResult};
use serde_json::Value;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ParticipantConfig;
use crate::error::{Error, ReplicationResult};
use crate::log::{AppendEntriesRequest, AppendEntriesResult, LogParticipant};
use crate::network::{ParticipantEndpoint, ParticipantNetwork};
use crate::paths;
use crate::types::{GlobalLogId, LocalState, LogIndex, ParticipantId, SnapshotStatus};
use crate::view::{LogView, logs_in};

/// The replicas hosted by one server; answers replication traffic
#[derive(Debug)]
pub struct ParticipantHost {
    id: ParticipantId,
    replicas: Mutex<BTreeMap<GlobalLogId, LogParticipant>>,
    stopped: AtomicBool,
}

impl ParticipantHost {
    fn new(id: ParticipantId) -> Self {
        Self {
            id,
            replicas: Mutex::new(BTreeMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    fn check_running(&self) -> ReplicationResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::unavailable(format!("{} is stopped", self.id)));
        }
        Ok(())
    }
}

impl ParticipantEndpoint for ParticipantHost {
    fn append_entries(
        &self,
        log: &GlobalLogId,
        request: AppendEntriesRequest,
    ) -> ReplicationResult<AppendEntriesResult> {
        self.check_running()?;
        let mut replicas = self.replicas.lock();
        let replica = replicas
            .get_mut(log)
            .ok_or_else(|| Error::not_found(format!("{} hosts no replica of {log}", self.id)))?;
        Ok(replica.append_entries(request))
    }

    fn snapshot(&self, log: &GlobalLogId) -> ReplicationResult<crate::types::LogSnapshot> {
        self.check_running()?;
        let replicas = self.replicas.lock();
        replicas
            .get(log)
            .ok_or_else(|| Error::not_found(format!("{} hosts no replica of {log}", self.id)))?
            .create_snapshot()
    }
}

type AppendCall = (
    GlobalLogId,
    ParticipantId,
    LogIndex,
    ReplicationResult<AppendEntriesResult>,
);

/// A database server taking part in replicated logs
pub struct ParticipantServer<A, N>
where
    A: AgencyStore,
    N: ParticipantNetwork,
{
    id: ParticipantId,
    agency: A,
    network: Arc<N>,
    config: ParticipantConfig,
    host: Arc<ParticipantHost>,
}

impl<A, N> ParticipantServer<A, N>
where
    A: AgencyStore,
    N: ParticipantNetwork,
{
    /// Create a server
    pub fn new(id: ParticipantId, agency: A, network: Arc<N>, config: ParticipantConfig) -> Self {
        Self {
            host: Arc::new(ParticipantHost::new(id.clone())),
            id,
            agency,
            network,
            config,
        }
    }

    /// Server id
    #[must_use]
    pub const fn id(&self) -> &ParticipantId {
        &self.id
    }

    /// The endpoint to register with the network
    #[must_use]
    pub fn endpoint(&self) -> Arc<ParticipantHost> {
        self.host.clone()
    }

    /// Pause the server: it neither ticks nor answers requests
    pub fn stop(&self) {
        info!("stopping {}", self.id);
        self.host.stopped.store(true, Ordering::SeqCst);
    }

    /// Resume a stopped server with its replicas intact
    pub fn resume(&self) {
        info!("resuming {}", self.id);
        self.host.stopped.store(false, Ordering::SeqCst);
    }

    /// Whether the server is stopped
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.host.stopped.load(Ordering::SeqCst)
    }

    /// Run [`Self::tick`] periodically until cancelled
    pub fn start(self: Arc<Self>, task_tracker: &TaskTracker, cancellation_token: &CancellationToken) {
        let cancellation_token = cancellation_token.clone();
        task_tracker.spawn(async move {
            let mut tick_interval = interval(self.config.tick_interval);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick_interval.tick() => {
                        if let Err(e) = self.tick().await {
                            warn!("{} tick failed: {}", self.id, e);
                        }
                    }
                    () = cancellation_token.cancelled() => {
                        info!("participant server {} stopped", self.id);
                        break;
                    }
                }
            }
        });
    }

    /// One round: follow the Plan, fetch snapshots, replicate and report
    pub async fn tick(&self) -> ReplicationResult<()> {
        if self.is_stopped() {
            return Ok(());
        }

        let snapshot = self
            .agency
            .read(&[paths::plan_root(), paths::current_root()])
            .await
            .map_err(Error::agency)?;

        let mut views = BTreeMap::new();
        for log in logs_in(&snapshot, &paths::plan_root()) {
            match LogView::from_snapshot(&snapshot, &log) {
                Ok(view) => {
                    views.insert(log, view);
                }
                Err(e) => warn!("{}: ignoring unreadable log {log}: {e}", self.id),
            }
        }

        let transfers = self.follow_plan(&views);
        for (log, leader) in transfers {
            self.transfer_snapshot(&log, &leader).await;
        }

        self.replicate().await;
        self.report(&views).await
    }

    fn follow_plan(&self, views: &BTreeMap<GlobalLogId, LogView>) -> Vec<(GlobalLogId, ParticipantId)> {
        let mut transfers = Vec::new();
        let mut replicas = self.host.replicas.lock();

        replicas.retain(|log, _| {
            let keep = views
                .get(log)
                .and_then(|view| view.plan.as_ref())
                .is_some_and(|plan| plan.flags(&self.id).is_some());
            if !keep {
                info!("{}: dropping replica of {log}", self.id);
            }
            keep
        });

        for (log, view) in views {
            let Some(plan) = &view.plan else { continue };
            let Some(flags) = plan.flags(&self.id) else {
                continue;
            };
            let current_leader = view.current.as_ref().and_then(|c| c.leader.as_ref());

            let replica = replicas.entry(log.clone()).or_insert_with(|| {
                // Only a log without committed entries can start without a snapshot transfer
                let status = if view.committed_index() == LogIndex::default() {
                    SnapshotStatus::Available
                } else {
                    SnapshotStatus::Missing
                };
                info!("{}: creating replica of {log} with snapshot {status:?}", self.id);
                LogParticipant::new(
                    self.id.clone(),
                    log.clone(),
                    plan.properties.implementation.kind,
                    status,
                )
            });

            replica.set_flags(*flags);
            replica.update_term(plan.term(), plan.leader().cloned());
            replica.become_leader(&plan.participants_config);
            replica.update_leader_config(&plan.participants_config);

            if replica.snapshot_status() == SnapshotStatus::Missing {
                let ready_leader = current_leader.filter(|status| {
                    status.leadership_established
                        && status.term == plan.term()
                        && Some(&status.server_id) == plan.leader()
                        && status.server_id != self.id
                });
                if let Some(status) = ready_leader {
                    replica.set_snapshot_status(SnapshotStatus::Transferring);
                    transfers.push((log.clone(), status.server_id.clone()));
                }
            }
        }

        transfers
    }

    async fn transfer_snapshot(&self, log: &GlobalLogId, leader: &ParticipantId) {
        debug!("{}: requesting snapshot of {log} from {leader}", self.id);
        let result = match tokio::time::timeout(
            self.config.snapshot_timeout,
            self.network.request_snapshot(leader, log),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!("snapshot of {log} from {leader}"))),
        };

        let mut replicas = self.host.replicas.lock();
        let Some(replica) = replicas.get_mut(log) else {
            return;
        };
        let installed = result.and_then(|snapshot| replica.install_snapshot(snapshot));
        if let Err(e) = installed {
            warn!("{}: snapshot transfer of {log} failed: {e}", self.id);
            replica.set_snapshot_status(SnapshotStatus::Missing);
        }
    }

    async fn replicate(&self) {
        let requests: Vec<(GlobalLogId, ParticipantId, AppendEntriesRequest)> = {
            let mut replicas = self.host.replicas.lock();
            let mut requests = Vec::new();
            for (log, replica) in replicas.iter_mut() {
                if replica.leader_role().is_none() {
                    continue;
                }
                // Entries acknowledged by the leader alone may already commit
                replica.handle_append_responses(Vec::new());
                requests.extend(
                    replica
                        .prepare_replication()
                        .into_iter()
                        .map(|(to, request)| (log.clone(), to, request)),
                );
            }
            requests
        };

        let mut calls: FuturesUnordered<_> = requests
            .into_iter()
            .map(|(log, to, request)| self.send_append(log, to, request))
            .collect();

        // Each answer is handled on arrival, so a stalled follower only delays itself
        while let Some((log, to, sent_up_to, result)) = calls.next().await {
            let mut replicas = self.host.replicas.lock();
            if let Some(replica) = replicas.get_mut(&log) {
                replica.handle_append_responses(vec![(to, sent_up_to, result)]);
            }
        }
    }

    async fn send_append(
        &self,
        log: GlobalLogId,
        to: ParticipantId,
        request: AppendEntriesRequest,
    ) -> AppendCall {
        let sent_up_to = request
            .entries
            .last()
            .map_or(request.prev_log_entry.index, |entry| entry.index);
        let result = match tokio::time::timeout(
            self.config.append_timeout,
            self.network.append_entries(&to, &log, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!("append to {to} for {log}"))),
        };
        (log, to, sent_up_to, result)
    }

    async fn report(&self, views: &BTreeMap<GlobalLogId, LogView>) -> ReplicationResult<()> {
        let reports: Vec<_> = {
            let replicas = self.host.replicas.lock();
            replicas
                .iter()
                .map(|(log, replica)| (log.clone(), replica.report(), replica.leader_status()))
                .collect()
        };

        for (log, local_state, leader_status) in reports {
            let current = views.get(&log).and_then(|view| view.current.as_ref());
            let reported = current.and_then(|c| c.local_state.get(&self.id));

            let mut transaction = Transaction::new();
            if reported != Some(&local_state) {
                transaction = transaction.set(
                    paths::current_local_state(&log, &self.id),
                    serde_json::to_value(&local_state)?,
                );
            }
            if let Some(status) = leader_status {
                if current.and_then(|c| c.leader.as_ref()) != Some(&status) {
                    transaction =
                        transaction.set(paths::current_leader(&log), serde_json::to_value(&status)?);
                }
            }

            self.write_current(&log, transaction).await?;
        }

        // Withdraw reports of replicas that left the plan
        for (log, view) in views {
            let planned = view
                .plan
                .as_ref()
                .is_some_and(|plan| plan.flags(&self.id).is_some());
            let reported = view
                .current
                .as_ref()
                .is_some_and(|c| c.local_state.contains_key(&self.id));
            if !planned && reported {
                let transaction =
                    Transaction::new().delete(paths::current_local_state(log, &self.id));
                self.write_current(log, transaction).await?;
            }
        }

        Ok(())
    }

    async fn write_current(&self, log: &GlobalLogId, transaction: Transaction) -> ReplicationResult<()> {
        if transaction.is_empty() {
            return Ok(());
        }

        // Never resurrect Current of a log whose plan is gone
        let transaction = transaction.expect_present(paths::plan(log));
        match self.agency.transact(transaction).await.map_err(Error::agency)? {
            WriteResult::Applied { .. } => {}
            WriteResult::PreconditionFailed { path } => {
                debug!("{}: report for {log} skipped, {path} changed", self.id);
            }
        }
        Ok(())
    }

    /// Append a client entry on the leader of `log`
    pub fn insert(&self, log: &GlobalLogId, payload: Value) -> ReplicationResult<LogIndex> {
        self.host.check_running()?;
        let mut replicas = self.host.replicas.lock();
        replicas
            .get_mut(log)
            .ok_or_else(|| Error::not_found(format!("{} hosts no replica of {log}", self.id)))?
            .insert(payload)
    }

    /// Wait until the local commit index of `log` reaches `index`
    pub async fn wait_for_commit(
        &self,
        log: &GlobalLogId,
        index: LogIndex,
        timeout: Duration,
    ) -> ReplicationResult<()> {
        let poll = async {
            loop {
                if self.commit_index(log).is_some_and(|commit| commit >= index) {
                    return;
                }
                tokio::time::sleep(self.config.tick_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::timeout(format!("{log} did not commit {index} on {}", self.id)))
    }

    /// Local commit index of `log`
    #[must_use]
    pub fn commit_index(&self, log: &GlobalLogId) -> Option<LogIndex> {
        self.host
            .replicas
            .lock()
            .get(log)
            .map(LogParticipant::commit_index)
    }

    /// Local state of the replica of `log`
    #[must_use]
    pub fn local_state(&self, log: &GlobalLogId) -> Option<LocalState> {
        self.host
            .replicas
            .lock()
            .get(log)
            .map(LogParticipant::report)
    }

    /// Serialized replicated state of `log`
    #[must_use]
    pub fn replicated_state(&self, log: &GlobalLogId) -> Option<Value> {
        self.host
            .replicas
            .lock()
            .get(log)
            .map(LogParticipant::state)
    }
}
