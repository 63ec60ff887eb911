//! Typed reads of the Target, Plan and Current documents of a log

use proven_agency::{AgencyPath, AgencyStore, Snapshot};
use serde_json::Value;

use crate::error::{Error, ReplicationResult};
use crate::paths;
use crate::types::{DatabaseName, GlobalLogId, LogCurrent, LogId, LogIndex, LogPlan, LogTarget};

/// Everything the agency knows about one log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogView {
    /// Desired state
    pub target: Option<LogTarget>,
    /// Agreed state
    pub plan: Option<LogPlan>,
    /// The plan exactly as read, used as compare-and-swap base
    pub raw_plan: Option<Value>,
    /// Observed state
    pub current: Option<LogCurrent>,
}

impl LogView {
    /// Extract the documents of `log` from a snapshot
    pub fn from_snapshot(snapshot: &Snapshot, log: &GlobalLogId) -> ReplicationResult<Self> {
        let plan_path = paths::plan(log);
        Ok(Self {
            target: snapshot.decode(&paths::target(log))?,
            plan: snapshot.decode(&plan_path)?,
            raw_plan: snapshot.get(&plan_path).cloned(),
            current: snapshot.decode(&paths::current(log))?,
        })
    }

    /// Read the documents of `log`
    pub async fn read<A: AgencyStore>(agency: &A, log: &GlobalLogId) -> ReplicationResult<Self> {
        let snapshot = agency
            .read(&[paths::target(log), paths::plan(log), paths::current(log)])
            .await
            .map_err(Error::agency)?;
        Self::from_snapshot(&snapshot, log)
    }

    /// Whether no document of the log is left
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        self.target.is_none() && self.plan.is_none() && self.current.is_none()
    }

    /// Highest commit index any participant or leader reported into Current
    #[must_use]
    pub fn committed_index(&self) -> LogIndex {
        let Some(current) = &self.current else {
            return LogIndex::default();
        };
        current
            .local_state
            .values()
            .map(|state| state.commit_index)
            .chain(current.leader.iter().map(|leader| leader.commit_index))
            .max()
            .unwrap_or_default()
    }
}

/// Logs stored below `root`, e.g. [`paths::plan_root`]
#[must_use]
pub fn logs_in(snapshot: &Snapshot, root: &AgencyPath) -> Vec<GlobalLogId> {
    snapshot
        .children(root)
        .into_iter()
        .flat_map(|database| {
            snapshot
                .children(&root.join(&database))
                .into_iter()
                .filter_map(|key| LogId::parse(&key))
                .map(move |id| GlobalLogId::new(DatabaseName::new(database.clone()), id))
                .collect::<Vec<_>>()
        })
        .collect()
}
