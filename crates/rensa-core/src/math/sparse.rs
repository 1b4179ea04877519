//! Sparse token feature vectors.

use std::collections::BTreeMap;

/// One populated entry of a [`SparseVector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub key: usize,
    pub value: f32,
}

/// Mapping from a bounded index range to a weight, iterated by populated
/// entry only. Entry order is stable, so a placeholder can be addressed by
/// its slot index and rewritten later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    dimension: usize,
    entries: Vec<SparseEntry>,
}

impl SparseVector {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Build from `(key, value)` pairs. Keys are sorted; a repeated key keeps
    /// the last value.
    pub fn from_pairs(dimension: usize, pairs: impl IntoIterator<Item = (usize, f32)>) -> Self {
        let map: BTreeMap<usize, f32> = pairs.into_iter().collect();
        Self::from_map(dimension, &map)
    }

    pub fn from_map(dimension: usize, map: &BTreeMap<usize, f32>) -> Self {
        let entries = map
            .iter()
            .map(|(&key, &value)| SparseEntry { key, value })
            .collect();
        Self { dimension, entries }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn set_dimension(&mut self, dimension: usize) {
        self.dimension = dimension;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SparseEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &SparseEntry> {
        self.entries.iter()
    }

    /// Overwrite the entry stored in `slot` with a new key and value.
    pub fn change_entry(&mut self, slot: usize, key: usize, value: f32) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.key = key;
            entry.value = value;
        }
    }

    /// Largest populated key plus one, or zero when empty.
    pub fn key_bound(&self) -> usize {
        self.entries.iter().map(|e| e.key + 1).max().unwrap_or(0)
    }
}
