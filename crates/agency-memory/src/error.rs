use proven_agency::AgencyStoreError;
use thiserror::Error;

/// Errors returned by the in-memory agency.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The request was rejected by the tree evaluator.
    #[error(transparent)]
    Agency(#[from] proven_agency::Error),

    /// The change notifier was dropped.
    #[error("agency change notifier closed")]
    Closed,
}

impl AgencyStoreError for Error {}
