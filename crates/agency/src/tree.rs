//! Pure document tree evaluation shared by all agency backends

use serde_json::{Map, Value};

use crate::{AgencyPath, AgencyResult, Error, Operation, Precondition, Transaction};

/// Look up the value at `path`
#[must_use]
pub fn get<'a>(root: &'a Value, path: &AgencyPath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn get_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    match segments.split_first() {
        None => Some(root),
        Some((head, rest)) => get_mut(root.as_object_mut()?.get_mut(head)?, rest),
    }
}

fn ensure<'a>(node: &'a mut Value, segments: &[String]) -> &'a mut Value {
    match segments.split_first() {
        None => node,
        Some((head, rest)) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => ensure(map.entry(head.clone()).or_insert(Value::Null), rest),
                other => other,
            }
        }
    }
}

/// Evaluate a precondition against the tree
#[must_use]
pub fn check(root: &Value, path: &AgencyPath, precondition: &Precondition) -> bool {
    let current = get(root, path);
    match precondition {
        Precondition::Old(expected) => current == Some(expected),
        Precondition::OldEmpty(empty) => current.is_none() == *empty,
        Precondition::IsArray(is_array) => current.is_some_and(Value::is_array) == *is_array,
        Precondition::In(element) => current
            .and_then(Value::as_array)
            .is_some_and(|items| items.contains(element)),
    }
}

fn validate(path: &AgencyPath, operation: &Operation) -> AgencyResult<()> {
    if !path.is_root() {
        return Ok(());
    }
    match operation {
        Operation::Set { new } if new.is_object() => Ok(()),
        Operation::Delete => Ok(()),
        _ => Err(Error::InvalidPath {
            path: path.clone(),
            reason: "only object sets and deletes may target the root".to_string(),
        }),
    }
}

/// Apply a single operation
pub fn apply(root: &mut Value, path: &AgencyPath, operation: &Operation) -> AgencyResult<()> {
    validate(path, operation)?;

    match operation {
        Operation::Set { new } => {
            *ensure(root, path.segments()) = new.clone();
        }
        Operation::Delete => match path.parent() {
            None => *root = Value::Object(Map::new()),
            Some(parent) => {
                if let Some(Value::Object(map)) = get_mut(root, parent.segments()) {
                    if let Some(key) = path.last() {
                        map.remove(key);
                    }
                }
            }
        },
        Operation::Increment { step } => {
            let node = ensure(root, path.segments());
            let current = node.as_i64().unwrap_or(0);
            *node = Value::from(current.saturating_add(*step));
        }
        Operation::Push { new } => {
            let node = ensure(root, path.segments());
            match node {
                Value::Array(items) => items.push(new.clone()),
                _ => *node = Value::Array(vec![new.clone()]),
            }
        }
        Operation::Erase { val } => {
            if let Some(Value::Array(items)) = get_mut(root, path.segments()) {
                items.retain(|item| item != val);
            }
        }
    }

    Ok(())
}

/// Execute a transaction atomically.
///
/// Returns `Ok(None)` when applied and `Ok(Some(path))` with the first failing
/// precondition otherwise. The tree is untouched unless every precondition holds.
pub fn execute(root: &mut Value, transaction: &Transaction) -> AgencyResult<Option<AgencyPath>> {
    if transaction.is_empty() {
        return Err(Error::InvalidTransaction(
            "transaction has no operations".to_string(),
        ));
    }

    for (path, operation) in transaction.operations() {
        validate(path, operation)?;
    }

    for (path, precondition) in transaction.preconditions() {
        if !check(root, path, precondition) {
            return Ok(Some(path.clone()));
        }
    }

    for (path, operation) in transaction.operations() {
        apply(root, path, operation)?;
    }

    Ok(None)
}
