//! In-memory (single node) implementation of the agency for tests and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proven_agency::{
    AgencyPath, AgencyStore, ScopedAgencyStore, Snapshot, Transaction, WriteResult, tree,
};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, watch};
use tracing::{debug, trace};

#[derive(Debug)]
struct State {
    root: Value,
    index: u64,
}

/// In-memory agency.
///
/// Clones and scopes share one document tree; every applied transaction is
/// evaluated under a single write lock and bumps the shared index.
#[derive(Clone, Debug)]
pub struct MemoryAgency {
    state: Arc<RwLock<State>>,
    changes: Arc<watch::Sender<u64>>,
    prefix: AgencyPath,
}

impl MemoryAgency {
    /// Creates a new, empty agency.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(State {
                root: Value::Object(Map::new()),
                index: 0,
            })),
            changes: Arc::new(changes),
            prefix: AgencyPath::root(),
        }
    }

    /// A copy of the whole tree visible to this scope.
    pub async fn dump(&self) -> Value {
        let state = self.state.read().await;
        tree::get(&state.root, &self.prefix)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn absolute(&self, path: &AgencyPath) -> AgencyPath {
        self.prefix.concat(path)
    }

    fn relative(&self, path: &AgencyPath) -> AgencyPath {
        path.strip_prefix(&self.prefix)
            .unwrap_or_else(|| path.clone())
    }
}

impl Default for MemoryAgency {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgencyStore for MemoryAgency {
    type Error = Error;

    async fn read(&self, paths: &[AgencyPath]) -> Result<Snapshot, Self::Error> {
        let state = self.state.read().await;
        let empty = Value::Object(Map::new());
        let scoped_root = tree::get(&state.root, &self.prefix).unwrap_or(&empty);

        Ok(Snapshot::capture(scoped_root, paths, state.index))
    }

    async fn transact(&self, transaction: Transaction) -> Result<WriteResult, Self::Error> {
        let transaction = transaction.map_paths(|path| self.absolute(path));

        let mut state = self.state.write().await;
        match tree::execute(&mut state.root, &transaction)? {
            Some(failed) => {
                trace!("precondition failed at {failed}: {transaction}");
                Ok(WriteResult::PreconditionFailed {
                    path: self.relative(&failed),
                })
            }
            None => {
                state.index += 1;
                let index = state.index;
                drop(state);

                debug!(index, "applied agency transaction {transaction}");
                self.changes.send_replace(index);

                Ok(WriteResult::Applied { index })
            }
        }
    }

    async fn index(&self) -> Result<u64, Self::Error> {
        Ok(self.state.read().await.index)
    }

    async fn wait_for_change(&self, after: u64, timeout: Duration) -> Result<u64, Self::Error> {
        let mut receiver = self.changes.subscribe();

        let waited = tokio::time::timeout(timeout, receiver.wait_for(|index| *index > after))
            .await
            .map(|result| result.map(|index| *index));

        match waited {
            Ok(Ok(index)) => Ok(index),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => Ok(*receiver.borrow()),
        }
    }
}

impl ScopedAgencyStore for MemoryAgency {
    type Scoped = Self;

    fn scope(&self, prefix: impl Into<AgencyPath>) -> Self::Scoped {
        Self {
            state: self.state.clone(),
            changes: self.changes.clone(),
            prefix: self.prefix.concat(&prefix.into()),
        }
    }
}
