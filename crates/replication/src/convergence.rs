//! Waiting for the agency to reach a state.
//!
//! Administrative changes are asynchronous: callers write an intent into
//! Target and then wait until Plan and Current reflect it. [`wait_for`] polls
//! an arbitrary async predicate; the functions below it are the predicates
//! over a [`LogView`] that tooling and tests wait on.

use std::collections::BTreeMap;
use std::future::Future;

use parking_lot::Mutex;
use proven_agency::AgencyStore;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ConvergenceConfig;
use crate::error::{Error, ReplicationResult};
use crate::supervision::ElectionCode;
use crate::types::{GlobalLogId, LogTerm, ParticipantId};
use crate::view::LogView;

/// Poll `predicate` until it holds.
///
/// Fails with [`ErrorKind::Timeout`](crate::ErrorKind::Timeout) after
/// `config.timeout` and with [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled)
/// when `cancel` fires. Errors of the predicate are returned as they are.
pub async fn wait_for<F, Fut>(
    config: &ConvergenceConfig,
    cancel: &CancellationToken,
    mut predicate: F,
) -> ReplicationResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReplicationResult<bool>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut interval = interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(Error::cancelled("stopped waiting for convergence"));
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(Error::timeout(format!(
                    "condition not reached within {:?}",
                    config.timeout
                )));
            }
            _ = interval.tick() => {
                if predicate().await? {
                    return Ok(());
                }
            }
        }
    }
}

/// Wait until `predicate` holds for the agency documents of `log`
pub async fn wait_for_log<A, P>(
    agency: &A,
    log: &GlobalLogId,
    config: &ConvergenceConfig,
    cancel: &CancellationToken,
    predicate: P,
) -> ReplicationResult<LogView>
where
    A: AgencyStore,
    P: Fn(&LogView) -> bool,
{
    let last = Mutex::new(LogView::default());
    let (seen, predicate) = (&last, &predicate);
    let result = wait_for(config, cancel, move || async move {
        let view = LogView::read(agency, log).await?;
        let done = predicate(&view);
        *seen.lock() = view;
        Ok(done)
    })
    .await;

    let last = last.into_inner();
    if let Err(e) = &result {
        debug!("Gave up waiting on {log}: {e}; last seen {last:?}");
    }
    result.map(|()| last)
}

/// Every listed server runs `term` and follows `leader`, which established
/// its leadership.
#[must_use]
pub fn replicated_log_is_ready(
    view: &LogView,
    term: LogTerm,
    servers: &[ParticipantId],
    leader: &ParticipantId,
) -> bool {
    let (Some(plan), Some(current)) = (&view.plan, &view.current) else {
        return false;
    };
    if plan.term() < term || plan.leader() != Some(leader) {
        return false;
    }
    let Some(status) = &current.leader else {
        return false;
    };
    if status.term != plan.term() || status.server_id != *leader || !status.leadership_established
    {
        return false;
    }
    servers.iter().all(|server| {
        current
            .local_state
            .get(server)
            .is_some_and(|state| state.term >= plan.term())
    })
}

/// Plan names a leader for a term of at least `term`
#[must_use]
pub fn leader_declared(view: &LogView, term: LogTerm) -> bool {
    view.plan
        .as_ref()
        .is_some_and(|plan| plan.term() >= term && plan.leader().is_some())
}

/// The planned leader reports its leadership as established
#[must_use]
pub fn leader_established(view: &LogView) -> bool {
    let (Some(plan), Some(current)) = (&view.plan, &view.current) else {
        return false;
    };
    current.leader.as_ref().is_some_and(|status| {
        status.leadership_established
            && status.term == plan.term()
            && plan.leader() == Some(&status.server_id)
    })
}

/// The supervision reported an impossible election in `term`.
///
/// With `details`, every listed participant must carry the given code.
#[must_use]
pub fn election_failed(
    view: &LogView,
    term: LogTerm,
    details: Option<&BTreeMap<ParticipantId, ElectionCode>>,
) -> bool {
    let Some(report) = view
        .current
        .as_ref()
        .and_then(|current| current.supervision.as_ref())
        .and_then(|supervision| supervision.election.as_ref())
    else {
        return false;
    };
    if report.term != term {
        return false;
    }
    details.is_none_or(|expected| {
        expected.iter().all(|(participant, code)| {
            report
                .details
                .get(participant)
                .is_some_and(|detail| detail.code == *code)
        })
    })
}

/// The supervision acknowledged the current Target version
#[must_use]
pub fn target_version_converged(view: &LogView) -> bool {
    let Some(version) = view.target.as_ref().and_then(|target| target.version) else {
        return false;
    };
    view.current
        .as_ref()
        .and_then(|current| current.supervision.as_ref())
        .and_then(|supervision| supervision.target_version)
        .is_some_and(|acknowledged| acknowledged >= version)
}

/// Every planned participant reports the planned term and the planned leader
/// established its leadership.
#[must_use]
pub fn plan_matches_current(view: &LogView) -> bool {
    let (Some(plan), Some(current)) = (&view.plan, &view.current) else {
        return false;
    };
    leader_established(view)
        && plan
            .participants_config
            .participants
            .keys()
            .all(|participant| {
                current
                    .local_state
                    .get(participant)
                    .is_some_and(|state| state.term == plan.term())
            })
}

/// Target, Plan and Current of the log are all gone
#[must_use]
pub const fn log_is_gone(view: &LogView) -> bool {
    view.is_gone()
}
