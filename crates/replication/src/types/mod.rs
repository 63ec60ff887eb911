//! Identifiers and agency documents

mod documents;
mod ids;
mod snapshot;

pub use documents::{
    CurrentSupervision, ImplementationProperties, LeaderStatus, LocalState, LogConfig, LogCurrent,
    LogPlan, LogProperties, LogTarget, ParticipantFlags, ParticipantsConfig,
    ParticipantsFlagsMap, PlanTerm, TargetConfig,
};
pub use ids::{
    DatabaseName, GlobalLogId, JobId, LogId, LogIndex, LogTerm, ParticipantId, TermIndexPair,
};
pub use snapshot::{LogSnapshot, SnapshotStatus};
