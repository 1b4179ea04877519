//! # Tag Set
//!
//! Ordered label inventory mapping tag names to output-layer indices.

use std::collections::HashMap;
use std::fmt;

use crate::error::{RensaError, Result};

/// Label inventory. Index order is insertion order and defines the
/// output-layer row for each tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from names, ignoring duplicates.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// Add a tag if unseen and return its index.
    pub fn insert(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    /// Get the tag index for a name.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Like [`TagSet::index`] but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index(name)
            .ok_or_else(|| RensaError::InvalidSequence(format!("unknown tag {name:?}")))
    }

    /// Get tag name from index.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// Total number of distinct tags.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}
