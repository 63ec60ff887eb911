use serde_json::{Value, json};

use super::StateMachine;
use crate::error::{Error, ReplicationResult};
use crate::types::LogIndex;

/// Accepts and forgets every entry, only counting them
#[derive(Debug, Default)]
pub struct BlackHoleState {
    applied: u64,
}

impl BlackHoleState {
    /// Number of applied entries
    #[must_use]
    pub const fn applied(&self) -> u64 {
        self.applied
    }
}

impl StateMachine for BlackHoleState {
    fn apply(&mut self, _index: LogIndex, _payload: &Value) -> ReplicationResult<()> {
        self.applied += 1;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({ "applied": self.applied })
    }

    fn restore(&mut self, snapshot: Value) -> ReplicationResult<()> {
        self.applied = snapshot
            .get("applied")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::invalid_state("black-hole snapshot without counter"))?;
        Ok(())
    }
}
