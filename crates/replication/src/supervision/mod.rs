//! Supervision: drives the Plan of every replicated log towards its Target

mod action;
mod check;
mod election;
mod service;
mod status;

pub use action::Action;
pub use check::{CheckContext, CheckResult, check_replicated_log};
pub use election::{ElectionCode, ElectionDetail, ElectionOutcome, ElectionReport, run_election};
pub use service::Supervision;
pub use status::{StatusReport, StatusReportEntry};
