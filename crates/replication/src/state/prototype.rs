use std::collections::BTreeMap;

use serde_json::Value;

use super::StateMachine;
use crate::error::{Error, ReplicationResult};
use crate::types::LogIndex;

/// A key/value map driven by `{"insert": {k: v}}` and `{"remove": [k]}` entries
#[derive(Debug, Default)]
pub struct PrototypeState {
    entries: BTreeMap<String, Value>,
}

impl PrototypeState {
    /// Value stored under a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

impl StateMachine for PrototypeState {
    fn apply(&mut self, index: LogIndex, payload: &Value) -> ReplicationResult<()> {
        if let Some(insert) = payload.get("insert") {
            let map = insert.as_object().ok_or_else(|| {
                Error::invalid_state(format!("entry {index}: insert expects an object"))
            })?;
            for (key, value) in map {
                self.entries.insert(key.clone(), value.clone());
            }
            return Ok(());
        }

        if let Some(remove) = payload.get("remove") {
            let keys = remove.as_array().ok_or_else(|| {
                Error::invalid_state(format!("entry {index}: remove expects an array"))
            })?;
            for key in keys.iter().filter_map(Value::as_str) {
                self.entries.remove(key);
            }
            return Ok(());
        }

        Err(Error::invalid_state(format!(
            "entry {index}: unknown prototype operation"
        )))
    }

    fn snapshot(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    fn restore(&mut self, snapshot: Value) -> ReplicationResult<()> {
        let Value::Object(map) = snapshot else {
            return Err(Error::invalid_state("prototype snapshot must be an object"));
        };
        self.entries = map.into_iter().collect();
        Ok(())
    }
}
