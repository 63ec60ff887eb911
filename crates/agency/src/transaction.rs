//! Write operations, preconditions and transactions

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::AgencyPath;

/// A single mutation of the document tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    /// Replace the value at the path, creating parents as needed
    Set {
        /// New value
        new: Value,
    },
    /// Remove the value at the path
    Delete,
    /// Add `step` to a numeric value (missing counts as zero)
    Increment {
        /// Amount to add
        step: i64,
    },
    /// Append to an array (a non-array value is replaced)
    Push {
        /// Element to append
        new: Value,
    },
    /// Remove all array elements equal to `val`
    Erase {
        /// Element to remove
        val: Value,
    },
}

/// A condition that must hold before a transaction is applied
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Precondition {
    /// Value at path equals the given document
    Old(Value),
    /// `true`: the path must be absent, `false`: it must be present
    OldEmpty(bool),
    /// Whether the value at the path is an array
    IsArray(bool),
    /// The array at the path contains the given element
    In(Value),
}

/// Outcome of a write or transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteResult {
    /// All operations were applied at the given store index
    Applied {
        /// Store index after applying
        index: u64,
    },
    /// A precondition did not hold; nothing was written
    PreconditionFailed {
        /// The first precondition that failed
        path: AgencyPath,
    },
}

impl WriteResult {
    /// Whether the transaction was applied
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// An atomic group of operations guarded by preconditions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    operations: Vec<(AgencyPath, Operation)>,
    preconditions: Vec<(AgencyPath, Precondition)>,
}

impl Transaction {
    /// Create an empty transaction
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary operation
    #[must_use]
    pub fn operation(mut self, path: impl Into<AgencyPath>, operation: Operation) -> Self {
        self.operations.push((path.into(), operation));
        self
    }

    /// Add an arbitrary precondition
    #[must_use]
    pub fn precondition(mut self, path: impl Into<AgencyPath>, precondition: Precondition) -> Self {
        self.preconditions.push((path.into(), precondition));
        self
    }

    /// Set a value
    #[must_use]
    pub fn set(self, path: impl Into<AgencyPath>, value: impl Into<Value>) -> Self {
        self.operation(path, Operation::Set { new: value.into() })
    }

    /// Delete a value
    #[must_use]
    pub fn delete(self, path: impl Into<AgencyPath>) -> Self {
        self.operation(path, Operation::Delete)
    }

    /// Push onto an array
    #[must_use]
    pub fn push(self, path: impl Into<AgencyPath>, value: impl Into<Value>) -> Self {
        self.operation(path, Operation::Push { new: value.into() })
    }

    /// Erase matching elements from an array
    #[must_use]
    pub fn erase(self, path: impl Into<AgencyPath>, value: impl Into<Value>) -> Self {
        self.operation(path, Operation::Erase { val: value.into() })
    }

    /// Require the value at `path` to equal `value`
    #[must_use]
    pub fn expect_old(self, path: impl Into<AgencyPath>, value: impl Into<Value>) -> Self {
        self.precondition(path, Precondition::Old(value.into()))
    }

    /// Require `path` to be absent
    #[must_use]
    pub fn expect_empty(self, path: impl Into<AgencyPath>) -> Self {
        self.precondition(path, Precondition::OldEmpty(true))
    }

    /// Require `path` to be present
    #[must_use]
    pub fn expect_present(self, path: impl Into<AgencyPath>) -> Self {
        self.precondition(path, Precondition::OldEmpty(false))
    }

    /// Require the array at `path` to contain `value`
    #[must_use]
    pub fn expect_in(self, path: impl Into<AgencyPath>, value: impl Into<Value>) -> Self {
        self.precondition(path, Precondition::In(value.into()))
    }

    /// Require the value at `path` to equal `value`, or to be absent if `None`
    #[must_use]
    pub fn expect_old_or_empty(self, path: impl Into<AgencyPath>, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.expect_old(path, value),
            None => self.expect_empty(path),
        }
    }

    /// Operations in application order
    #[must_use]
    pub fn operations(&self) -> &[(AgencyPath, Operation)] {
        &self.operations
    }

    /// Preconditions in evaluation order
    #[must_use]
    pub fn preconditions(&self) -> &[(AgencyPath, Precondition)] {
        &self.preconditions
    }

    /// Whether the transaction has no operations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Rewrite every path, e.g. to place the transaction under a prefix
    #[must_use]
    pub fn map_paths(self, f: impl Fn(&AgencyPath) -> AgencyPath) -> Self {
        Self {
            operations: self
                .operations
                .into_iter()
                .map(|(path, op)| (f(&path), op))
                .collect(),
            preconditions: self
                .preconditions
                .into_iter()
                .map(|(path, pre)| (f(&path), pre))
                .collect(),
        }
    }

    /// The `[writes, preconditions]` envelope used by agency write requests
    #[must_use]
    pub fn to_envelope(&self) -> Value {
        let mut writes = Map::new();
        for (path, op) in &self.operations {
            writes.insert(
                path.to_string(),
                serde_json::to_value(op).unwrap_or(Value::Null),
            );
        }
        let mut preconditions = Map::new();
        for (path, pre) in &self.preconditions {
            preconditions.insert(
                path.to_string(),
                serde_json::to_value(pre).unwrap_or(Value::Null),
            );
        }
        json!([writes, preconditions])
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_envelope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_format() {
        let tx = Transaction::new()
            .set("/Target/ToDo/1", json!({"type": "moveShard"}))
            .delete("/Target/Pending/1")
            .expect_empty("/Supervision/Shards/s1");

        assert_eq!(
            tx.to_envelope(),
            json!([
                {
                    "/Target/ToDo/1": {"op": "set", "new": {"type": "moveShard"}},
                    "/Target/Pending/1": {"op": "delete"}
                },
                {"/Supervision/Shards/s1": {"oldEmpty": true}}
            ])
        );
    }

    #[test]
    fn test_map_paths_prefixes_everything() {
        let tx = Transaction::new()
            .push("/Target/CleanedServers", "PRMR-001")
            .expect_present("/Plan")
            .map_paths(|p| AgencyPath::parse("/arango").concat(p));

        assert_eq!(tx.operations()[0].0.to_string(), "/arango/Target/CleanedServers");
        assert_eq!(tx.preconditions()[0].0.to_string(), "/arango/Plan");
    }
}
