//! Insertion-ordered log storage.
//!
//! [`LogBundle`] maps a label to captured output lines. It is used both for
//! the per-test failure output of a single run and for the bundle a runner
//! hands back to its caller, where `"passed tests"` must come first.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Label under which the names of all passed tests are recorded.
pub const PASSED_TESTS: &str = "passed tests";

/// An insertion-ordered mapping from label to lines.
///
/// Entries are never removed. Inserting an existing label replaces its lines
/// but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBundle {
    entries: Vec<(String, Vec<String>)>,
}

impl LogBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `lines` under `label`.
    pub fn insert(&mut self, label: impl Into<String>, lines: Vec<String>) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, existing)) => *existing = lines,
            None => self.entries.push((label, lines)),
        }
    }

    /// Copies every entry of `other` into this bundle, in order.
    pub fn merge(&mut self, other: &LogBundle) {
        for (label, lines) in other.iter() {
            self.insert(label, lines.to_vec());
        }
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, lines)| lines.as_slice())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(label, lines)| (label.as_str(), lines.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Serialized as a JSON object whose keys keep insertion order.
impl Serialize for LogBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, lines) in &self.entries {
            map.serialize_entry(label, lines)?;
        }
        map.end()
    }
}
