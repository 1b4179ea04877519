//! # Sequence Input
//!
//! One [`State`] per token, produced by a featurizer and consumed by the
//! networks.

use crate::math::SparseVector;

/// Placeholder for a label-dependent sparse feature that is resolved while
/// decoding (the label predicted `offset` steps earlier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFeature {
    /// Position relative to the current token; always negative.
    pub offset: i32,
    /// Index of the placeholder entry inside the state's sparse vector.
    pub slot: usize,
    /// First sparse dimension of this feature's tag block.
    pub start: usize,
}

/// One token's input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub sparse: SparseVector,
    pub dense: Vec<f32>,
    /// Gold tag index, read only outside of test mode.
    pub label: usize,
    pub runtime_features: Vec<RuntimeFeature>,
}

impl State {
    pub fn new(sparse: SparseVector, dense: Vec<f32>, label: usize) -> Self {
        Self {
            sparse,
            dense,
            label,
            runtime_features: Vec::new(),
        }
    }

    pub fn add_runtime_placeholder(&mut self, offset: i32, slot: usize, start: usize) {
        self.runtime_features.push(RuntimeFeature {
            offset,
            slot,
            start,
        });
    }

    /// Point runtime feature `index` at `label`.
    pub fn set_runtime_feature(&mut self, index: usize, label: usize) {
        if let Some(rf) = self.runtime_features.get(index).copied() {
            self.sparse.change_entry(rf.slot, rf.start + label, 1.0);
        }
    }
}

/// Ordered states for one sentence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub states: Vec<State>,
}

impl Sequence {
    pub fn new(states: Vec<State>) -> Self {
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.states.iter().map(|s| s.label).collect()
    }
}

impl From<Vec<State>> for Sequence {
    fn from(states: Vec<State>) -> Self {
        Self::new(states)
    }
}
