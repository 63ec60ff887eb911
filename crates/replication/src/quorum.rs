//! Quorum arithmetic

use crate::types::LogConfig;

/// How much of a log keeps working with a number of failed participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// A leader can be elected and entries commit
    FullyAvailable,
    /// A leader can be declared but cannot establish its term
    LeaderOnly,
    /// No leader can be declared
    Unavailable,
}

/// The write concern a leader uses when `available` participants are usable.
///
/// Never below the hard write concern; grows up to the soft write concern
/// while enough participants are available.
#[must_use]
pub fn effective_write_concern(config: &LogConfig, available: usize) -> usize {
    config
        .write_concern
        .max(config.soft_write_concern.min(available))
}

/// Participants required to declare a leader: every quorum of size
/// `write_concern` must intersect the electing set.
#[must_use]
pub const fn election_quorum(replication_factor: usize, write_concern: usize) -> usize {
    (replication_factor + 1).saturating_sub(write_concern)
}

/// Availability of a log with `failed` unavailable participants
#[must_use]
pub const fn availability(
    replication_factor: usize,
    write_concern: usize,
    failed: usize,
) -> Availability {
    let alive = replication_factor.saturating_sub(failed);
    if write_concern <= alive {
        Availability::FullyAvailable
    } else if election_quorum(replication_factor, write_concern) <= alive {
        Availability::LeaderOnly
    } else {
        Availability::Unavailable
    }
}
