//! Hierarchical agency paths

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A path into the agency document tree, e.g. `/Target/ToDo/1`.
///
/// Empty segments are dropped while parsing, so `"/a//b/"` and `"a/b"` name the
/// same node. The empty path is the root of the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgencyPath(Vec<String>);

impl AgencyPath {
    /// The root of the document tree
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a slash separated path
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect(),
        )
    }

    /// Build a path from individual segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = Self::root();
        for segment in segments {
            path = path.join(segment);
        }
        path
    }

    /// Append a segment (which may itself contain slashes)
    #[must_use]
    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.0.clone();
        segments.extend(
            segment
                .as_ref()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
        );
        Self(segments)
    }

    /// Append every segment of another path
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// The segments of this path
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The last segment, `None` for the root
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// The parent path, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Whether this is the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is an ancestor of (or equal to) this path
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The remainder of this path below `prefix`
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|rest| Self(rest.to_vec()))
    }
}

impl fmt::Display for AgencyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for AgencyPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for AgencyPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for AgencyPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&Self> for AgencyPath {
    fn from(path: &Self) -> Self {
        path.clone()
    }
}

impl Serialize for AgencyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AgencyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_redundant_slashes() {
        assert_eq!(AgencyPath::parse("/a//b/"), AgencyPath::parse("a/b"));
        assert_eq!(AgencyPath::parse("/a/b").segments(), ["a", "b"]);
        assert!(AgencyPath::parse("///").is_root());
    }

    #[test]
    fn test_display_and_parent() {
        let path = AgencyPath::root().join("Target").join("ToDo/1");
        assert_eq!(path.to_string(), "/Target/ToDo/1");
        assert_eq!(path.parent().unwrap().to_string(), "/Target/ToDo");
        assert_eq!(AgencyPath::root().to_string(), "/");
        assert_eq!(AgencyPath::root().parent(), None);
    }

    #[test]
    fn test_starts_with() {
        let path = AgencyPath::parse("/Plan/ReplicatedLogs/db/12");
        assert!(path.starts_with(&AgencyPath::parse("/Plan")));
        assert!(path.starts_with(&path));
        assert!(!path.starts_with(&AgencyPath::parse("/Current")));
        assert_eq!(
            path.strip_prefix(&AgencyPath::parse("/Plan/ReplicatedLogs")),
            Some(AgencyPath::parse("db/12"))
        );
        assert_eq!(path.strip_prefix(&AgencyPath::parse("/Target")), None);
    }
}
