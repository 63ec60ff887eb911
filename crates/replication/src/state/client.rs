use std::collections::BTreeSet;

use proven_agency::{AgencyStore, Transaction, WriteResult};
use serde_json::Value;
use tracing::{debug, info};

use super::StateImplementation;
use crate::config::ClientConfig;
use crate::error::{Error, ReplicationResult};
use crate::paths;
use crate::types::{GlobalLogId, LogConfig, LogTarget, ParticipantFlags, ParticipantId};

/// Manages the Target documents of replicated states.
///
/// Every modification is a compare-and-swap on the Target `version`; the
/// supervision converges Plan and Current afterwards.
#[derive(Debug, Clone)]
pub struct ReplicatedStateClient<A>
where
    A: AgencyStore,
{
    agency: A,
    config: ClientConfig,
}

impl<A> ReplicatedStateClient<A>
where
    A: AgencyStore,
{
    /// Create a client
    pub const fn new(agency: A, config: ClientConfig) -> Self {
        Self { agency, config }
    }

    /// Create the Target of a new replicated state
    pub async fn create(
        &self,
        log: &GlobalLogId,
        participants: impl IntoIterator<Item = ParticipantId>,
        config: LogConfig,
        implementation: StateImplementation,
    ) -> ReplicationResult<LogTarget> {
        let target = LogTarget::new(log.id, participants, config, implementation);
        target.validate()?;

        let path = paths::target(log);
        let transaction = Transaction::new()
            .set(path.clone(), serde_json::to_value(&target)?)
            .expect_empty(path);

        match self.agency.transact(transaction).await.map_err(Error::agency)? {
            WriteResult::Applied { .. } => {
                info!("created replicated state {log}");
                Ok(target)
            }
            WriteResult::PreconditionFailed { .. } => {
                Err(Error::conflict(format!("replicated state {log} already exists")))
            }
        }
    }

    /// Read the Target of a replicated state
    pub async fn read_target(&self, log: &GlobalLogId) -> ReplicationResult<Option<LogTarget>> {
        let path = paths::target(log);
        let snapshot = self
            .agency
            .read(std::slice::from_ref(&path))
            .await
            .map_err(Error::agency)?;
        Ok(snapshot.decode(&path)?)
    }

    /// Apply `mutator` to `base` and write the result if the stored version is
    /// still the one of `base`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    pub async fn try_update_target<F>(
        &self,
        log: &GlobalLogId,
        base: &LogTarget,
        mutator: F,
    ) -> ReplicationResult<bool>
    where
        F: FnOnce(&mut LogTarget) -> ReplicationResult<()>,
    {
        let mut target = base.clone();
        mutator(&mut target)?;
        target.version = Some(base.version() + 1);
        target.validate()?;

        let path = paths::target(log);
        let transaction = Transaction::new()
            .set(path.clone(), serde_json::to_value(&target)?)
            .expect_present(path.clone())
            .expect_old_or_empty(path.join("version"), base.version.map(Value::from));

        let result = self.agency.transact(transaction).await.map_err(Error::agency)?;
        if !result.is_applied() {
            debug!("target of {log} changed concurrently, version {}", base.version());
        }
        Ok(result.is_applied())
    }

    /// Read-modify-write the Target, retrying on concurrent modifications.
    ///
    /// Returns the written Target.
    pub async fn update_target<F>(&self, log: &GlobalLogId, mut mutator: F) -> ReplicationResult<LogTarget>
    where
        F: FnMut(&mut LogTarget) -> ReplicationResult<()>,
    {
        for _ in 0..self.config.max_cas_retries {
            let base = self
                .read_target(log)
                .await?
                .ok_or_else(|| Error::not_found(format!("replicated state {log}")))?;

            let mut written = None;
            let applied = self
                .try_update_target(log, &base, |target| {
                    mutator(target)?;
                    written = Some(target.clone());
                    Ok(())
                })
                .await?;

            if applied {
                if let Some(mut target) = written {
                    target.version = Some(base.version() + 1);
                    return Ok(target);
                }
            }
        }

        Err(Error::conflict(format!(
            "target of {log} kept changing, gave up after {} attempts",
            self.config.max_cas_retries
        )))
    }

    /// Add a participant with default flags
    pub async fn add_participant(
        &self,
        log: &GlobalLogId,
        participant: &ParticipantId,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            if target.participants.contains_key(participant) {
                return Err(Error::invalid_config(format!(
                    "{participant} already participates in {log}"
                )));
            }
            target
                .participants
                .insert(participant.clone(), ParticipantFlags::default());
            Ok(())
        })
        .await
    }

    /// Remove a participant, unsetting the leader if it was the leader
    pub async fn remove_participant(
        &self,
        log: &GlobalLogId,
        participant: &ParticipantId,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            if target.participants.remove(participant).is_none() {
                return Err(Error::not_found(format!(
                    "{participant} does not participate in {log}"
                )));
            }
            if target.leader.as_ref() == Some(participant) {
                target.leader = None;
            }
            Ok(())
        })
        .await
    }

    /// Swap one participant for another, keeping its flags and leadership
    pub async fn replace_participant(
        &self,
        log: &GlobalLogId,
        old: &ParticipantId,
        new: &ParticipantId,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            replace_in_target(target, old, new, None)
        })
        .await
    }

    /// Replace the whole participant set; kept participants keep their flags
    pub async fn replace_participants(
        &self,
        log: &GlobalLogId,
        participants: &BTreeSet<ParticipantId>,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            target.participants = participants
                .iter()
                .map(|pid| {
                    let flags = target.participants.get(pid).copied().unwrap_or_default();
                    (pid.clone(), flags)
                })
                .collect();
            if target
                .leader
                .as_ref()
                .is_some_and(|leader| !participants.contains(leader))
            {
                target.leader = None;
            }
            Ok(())
        })
        .await
    }

    /// Request a specific leader
    pub async fn set_leader(
        &self,
        log: &GlobalLogId,
        leader: &ParticipantId,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            if !target.participants.contains_key(leader) {
                return Err(Error::invalid_config(format!(
                    "{leader} does not participate in {log}"
                )));
            }
            target.leader = Some(leader.clone());
            Ok(())
        })
        .await
    }

    /// Let the supervision pick the leader
    pub async fn unset_leader(&self, log: &GlobalLogId) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            target.leader = None;
            Ok(())
        })
        .await
    }

    /// Change the write concern settings
    pub async fn set_config(
        &self,
        log: &GlobalLogId,
        config: LogConfig,
    ) -> ReplicationResult<LogTarget> {
        self.update_target(log, |target| {
            target.config = config;
            Ok(())
        })
        .await
    }

    /// Bump the version without any other change
    pub async fn bump_version(&self, log: &GlobalLogId) -> ReplicationResult<LogTarget> {
        self.update_target(log, |_| Ok(())).await
    }

    /// Delete the Target; Plan and Current are removed by the supervision
    pub async fn delete(&self, log: &GlobalLogId) -> ReplicationResult<()> {
        let path = paths::target(log);
        let transaction = Transaction::new()
            .delete(path.clone())
            .expect_present(path);

        match self.agency.transact(transaction).await.map_err(Error::agency)? {
            WriteResult::Applied { .. } => {
                info!("deleted replicated state {log}");
                Ok(())
            }
            WriteResult::PreconditionFailed { .. } => {
                Err(Error::not_found(format!("replicated state {log}")))
            }
        }
    }
}

/// Swap `old` for `new` in `target`, carrying over flags and leadership.
///
/// `flags` overrides the flags given to `new`.
pub(crate) fn replace_in_target(
    target: &mut LogTarget,
    old: &ParticipantId,
    new: &ParticipantId,
    flags: Option<ParticipantFlags>,
) -> ReplicationResult<()> {
    if target.participants.contains_key(new) {
        return Err(Error::invalid_config(format!(
            "{new} already participates in log {}",
            target.id
        )));
    }
    let old_flags = target.participants.remove(old).ok_or_else(|| {
        Error::not_found(format!("{old} does not participate in log {}", target.id))
    })?;
    target
        .participants
        .insert(new.clone(), flags.unwrap_or(old_flags));
    if target.leader.as_ref() == Some(old) {
        target.leader = Some(new.clone());
    }
    Ok(())
}
