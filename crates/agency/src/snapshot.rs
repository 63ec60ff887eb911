use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{AgencyPath, AgencyResult, Error, tree};

/// A consistent read of one or more subtrees at a single store index.
///
/// The snapshot holds a partial tree rooted at `/`: only the requested
/// subtrees are present, every other branch is absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    root: Value,
    index: u64,
}

impl Snapshot {
    /// Build a snapshot from a partial tree
    #[must_use]
    pub const fn new(root: Value, index: u64) -> Self {
        Self { root, index }
    }

    /// Copy the requested subtrees out of a full tree
    #[must_use]
    pub fn capture(full: &Value, paths: &[AgencyPath], index: u64) -> Self {
        let mut root = Value::Object(Map::new());
        for path in paths {
            if let Some(value) = tree::get(full, path) {
                // Only a scalar set on the root can fail
                let _ = tree::apply(
                    &mut root,
                    path,
                    &crate::Operation::Set { new: value.clone() },
                );
            }
        }
        Self { root, index }
    }

    /// Store index at which the snapshot was taken
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// The partial tree
    #[must_use]
    pub const fn root(&self) -> &Value {
        &self.root
    }

    /// Raw value at a path
    #[must_use]
    pub fn get(&self, path: &AgencyPath) -> Option<&Value> {
        tree::get(&self.root, path)
    }

    /// Whether a value exists at a path
    #[must_use]
    pub fn contains(&self, path: &AgencyPath) -> bool {
        self.get(path).is_some()
    }

    /// Decode the value at a path, `Ok(None)` if absent
    pub fn decode<T: DeserializeOwned>(&self, path: &AgencyPath) -> AgencyResult<Option<T>> {
        self.get(path)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| Error::Decode {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Child keys of the object at a path, sorted
    #[must_use]
    pub fn children(&self, path: &AgencyPath) -> Vec<String> {
        let mut keys: Vec<String> = self
            .get(path)
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_capture_only_requested_subtrees() {
        let full = json!({
            "Target": {"ReplicatedLogs": {"db": {"1": {"id": 1}}}},
            "Plan": {"ReplicatedLogs": {"db": {"1": {"id": 1, "currentTerm": {"term": 2}}}}},
            "Current": {"other": true}
        });

        let snapshot = Snapshot::capture(
            &full,
            &[
                AgencyPath::parse("/Plan/ReplicatedLogs/db/1"),
                AgencyPath::parse("/Target/ReplicatedLogs/db/2"),
            ],
            7,
        );

        assert_eq!(snapshot.index(), 7);
        assert!(snapshot.contains(&"/Plan/ReplicatedLogs/db/1/currentTerm".into()));
        assert!(!snapshot.contains(&"/Target".into()));
        assert!(!snapshot.contains(&"/Current".into()));
    }

    #[test]
    fn test_decode_and_children() {
        let snapshot = Snapshot::new(json!({"a": {"z": 1, "b": 2}, "n": 5}), 1);
        assert_eq!(snapshot.children(&"/a".into()), vec!["b", "z"]);
        assert_eq!(snapshot.decode::<u64>(&"/n".into()).unwrap(), Some(5));
        assert_eq!(snapshot.decode::<u64>(&"/missing".into()).unwrap(), None);
        assert!(snapshot.decode::<String>(&"/n".into()).is_err());
    }
}
