use std::collections::BTreeSet;
use std::sync::Arc;

use proven_agency::{AgencyStore, WriteResult};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::action::Action;
use super::check::{CheckContext, check_replicated_log};
use crate::config::SupervisionConfig;
use crate::error::{Error, ReplicationResult};
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::jobs;
use crate::paths;
use crate::view::{LogView, logs_in};

/// The supervision control loop
pub struct Supervision<A, H>
where
    A: AgencyStore,
    H: HealthMonitor,
{
    agency: A,
    health: Arc<H>,
    config: SupervisionConfig,
}

impl<A, H> Supervision<A, H>
where
    A: AgencyStore,
    H: HealthMonitor,
{
    /// Create a supervision
    pub const fn new(agency: A, health: Arc<H>, config: SupervisionConfig) -> Self {
        Self {
            agency,
            health,
            config,
        }
    }

    /// Run [`Self::run_once`] periodically until cancelled
    pub fn start(self: Arc<Self>, task_tracker: &TaskTracker, cancellation_token: &CancellationToken) {
        let cancellation_token = cancellation_token.clone();
        task_tracker.spawn(async move {
            let mut tick_interval = interval(self.config.tick_interval);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick_interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!("Supervision round failed: {}", e);
                        }
                    }
                    () = cancellation_token.cancelled() => {
                        info!("Supervision stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Reconcile every log and advance every job once.
    ///
    /// Returns the number of applied agency writes.
    pub async fn run_once(&self) -> ReplicationResult<usize> {
        let health = self.health.snapshot().await?;
        let mut applied = self.check_logs(&health).await?;
        applied += jobs::run_jobs(&self.agency, &health, &self.config).await?;
        Ok(applied)
    }

    async fn check_logs(&self, health: &HealthSnapshot) -> ReplicationResult<usize> {
        let roots = [paths::target_root(), paths::plan_root(), paths::current_root()];
        let snapshot = self.agency.read(&roots).await.map_err(Error::agency)?;

        let logs: BTreeSet<_> = roots
            .iter()
            .flat_map(|root| logs_in(&snapshot, root))
            .collect();

        let mut applied = 0;
        for log in logs {
            let view = match LogView::from_snapshot(&snapshot, &log) {
                Ok(view) => view,
                Err(e) => {
                    warn!("Skipping unreadable log {log}: {e}");
                    continue;
                }
            };

            let result = check_replicated_log(&CheckContext {
                log: &log,
                view: &view,
                health,
            });
            let action = result.action.clone();
            let Some(transaction) = result.into_transaction(&log, &view)? else {
                continue;
            };

            match self
                .agency
                .transact(transaction)
                .await
                .map_err(Error::agency)?
            {
                WriteResult::Applied { .. } => {
                    applied += 1;
                    if action == Action::NoAction {
                        debug!("{log}: updated status report");
                    } else {
                        info!("{log}: {action}");
                    }
                }
                WriteResult::PreconditionFailed { path } => {
                    debug!("{log}: {action} lost a race on {path}, retrying next round");
                }
            }
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use proven_agency_memory::MemoryAgency;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::ClientConfig;
    use crate::health::{AgencyHealth, set_health};
    use crate::state::{ReplicatedStateClient, StateImplementation};
    use crate::types::{GlobalLogId, LogConfig, LogId, ParticipantId};

    #[tokio::test]
    #[traced_test]
    async fn test_run_once_creates_plan() {
        let agency = MemoryAgency::new();
        let servers = ["a", "b", "c"].map(ParticipantId::new);
        for server in &servers {
            set_health(&agency, server, true).await.unwrap();
        }
        let log = GlobalLogId::new("db", LogId::new(1));
        ReplicatedStateClient::new(agency.clone(), ClientConfig::default())
            .create(
                &log,
                servers.clone(),
                LogConfig::new(2),
                StateImplementation::BlackHole,
            )
            .await
            .unwrap();

        let supervision = Supervision::new(
            agency.clone(),
            Arc::new(AgencyHealth::new(agency.clone())),
            SupervisionConfig::default(),
        );
        assert_eq!(supervision.run_once().await.unwrap(), 1);
        assert!(logs_contain("create plan with term 1"));

        let plan = LogView::read(&agency, &log).await.unwrap().plan.unwrap();
        assert_eq!(plan.leader(), Some(&servers[0]));
        assert_eq!(plan.participants_config.generation, 1);
    }
}
