//! Replicated state machines on top of replicated logs and the client used to
//! manage their targets

mod black_hole;
mod client;
mod prototype;

pub use black_hole::BlackHoleState;
pub use client::ReplicatedStateClient;
pub(crate) use client::replace_in_target;
pub use prototype::PrototypeState;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReplicationResult;
use crate::types::LogIndex;

/// Known replicated state implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateImplementation {
    /// Discards every entry
    #[default]
    BlackHole,
    /// A simple key/value map
    Prototype,
}

impl StateImplementation {
    /// Create an empty state machine of this kind
    #[must_use]
    pub fn create(self) -> Box<dyn StateMachine> {
        match self {
            Self::BlackHole => Box::new(BlackHoleState::default()),
            Self::Prototype => Box::new(PrototypeState::default()),
        }
    }
}

/// A deterministic state machine fed with committed log entries in index order
pub trait StateMachine: Debug + Send {
    /// Apply the payload of a committed entry
    fn apply(&mut self, index: LogIndex, payload: &Value) -> ReplicationResult<()>;

    /// Serialize the whole state
    fn snapshot(&self) -> Value;

    /// Replace the state with a snapshot
    fn restore(&mut self, snapshot: Value) -> ReplicationResult<()>;
}
