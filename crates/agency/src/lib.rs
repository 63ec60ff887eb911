//! Abstract interface for a hierarchical, transactional configuration store.
//!
//! The agency holds a JSON document tree. Writes are grouped into
//! [`Transaction`]s that are applied atomically when all of their
//! [`Precondition`]s hold, and every applied transaction advances a
//! monotonic store index.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod path;
mod snapshot;
mod transaction;
pub mod tree;

pub use error::{AgencyResult, Error};
pub use path::AgencyPath;
pub use snapshot::Snapshot;
pub use transaction::{Operation, Precondition, Transaction, WriteResult};

use std::error::Error as StdError;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Marker trait for `AgencyStore` errors
pub trait AgencyStoreError: Debug + StdError + Send + Sync + 'static {}

/// A store holding the agency document tree.
#[async_trait]
pub trait AgencyStore
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for store operations.
    type Error: AgencyStoreError;

    /// Reads several subtrees at a single consistent index.
    async fn read(&self, paths: &[AgencyPath]) -> Result<Snapshot, Self::Error>;

    /// Applies a transaction atomically.
    ///
    /// Returns [`WriteResult::PreconditionFailed`] without modifying the tree
    /// if any precondition does not hold.
    async fn transact(&self, transaction: Transaction) -> Result<WriteResult, Self::Error>;

    /// Unconditionally sets a single value.
    async fn write(&self, path: AgencyPath, value: Value) -> Result<WriteResult, Self::Error> {
        self.transact(Transaction::new().set(path, value)).await
    }

    /// The current store index.
    async fn index(&self) -> Result<u64, Self::Error>;

    /// Waits until the store index moves past `after` or the timeout elapses.
    ///
    /// Returns the index observed when waking up.
    async fn wait_for_change(&self, after: u64, timeout: Duration) -> Result<u64, Self::Error>;
}

/// An agency store that can be confined to a subtree.
pub trait ScopedAgencyStore: AgencyStore {
    /// The scoped store type.
    type Scoped: AgencyStore<Error = Self::Error>;

    /// Creates a store whose paths are relative to `prefix`.
    fn scope(&self, prefix: impl Into<AgencyPath>) -> Self::Scoped;
}
