use thiserror::Error;

use crate::AgencyPath;

/// Errors produced while evaluating agency requests.
///
/// A failed precondition is not an error: it is reported through
/// [`crate::WriteResult::PreconditionFailed`].
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The path cannot be used with the requested operation
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Offending path
        path: AgencyPath,
        /// Why the path was rejected
        reason: String,
    },

    /// The transaction is malformed
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A document could not be decoded into the requested type
    #[error("cannot decode document at {path}: {reason}")]
    Decode {
        /// Path of the document
        path: AgencyPath,
        /// Decoder message
        reason: String,
    },

    /// Backend specific failure
    #[error("agency backend error: {0}")]
    Backend(String),
}

/// Result type for agency operations
pub type AgencyResult<T> = Result<T, Error>;
