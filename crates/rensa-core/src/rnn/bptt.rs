//! # Truncated BPTT State
//!
//! The last `bptt + bptt_block` timesteps of a directional engine, kept in a
//! circular buffer addressed by age (0 = most recent), and the gradient
//! accumulators filled during a sweep.

use crate::math::{Matrix, SparseVector};
use crate::types::Neuron;

/// Circular history of sparse inputs, dense features and hidden activations.
#[derive(Debug, Clone)]
pub struct BpttHistory {
    capacity: usize,
    /// Slot holding age 0.
    head: usize,
    len: usize,
    inputs: Vec<SparseVector>,
    dense: Matrix,
    hidden: Vec<Vec<Neuron>>,
}

impl BpttHistory {
    pub fn new(capacity: usize, hidden_size: usize, dense_size: usize) -> Self {
        Self {
            capacity,
            head: 0,
            len: 0,
            inputs: vec![SparseVector::default(); capacity],
            dense: Matrix::zeros(capacity, dense_size),
            hidden: vec![Neuron::layer(hidden_size); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget every recorded step. Buffers are reused, not reallocated.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Record a new most-recent step; the oldest step falls out once full.
    pub fn push(&mut self, input: &SparseVector, dense: &[f32], hidden: &[Neuron]) {
        if self.capacity == 0 {
            return;
        }
        self.head = (self.head + self.capacity - 1) % self.capacity;
        let slot = self.head;

        self.inputs[slot].clone_from(input);
        let row = self.dense.row_mut(slot);
        let n = row.len().min(dense.len());
        row[..n].copy_from_slice(&dense[..n]);
        self.hidden[slot].copy_from_slice(hidden);

        self.len = (self.len + 1).min(self.capacity);
    }

    fn slot(&self, age: usize) -> Option<usize> {
        (age < self.len).then(|| (self.head + age) % self.capacity)
    }

    pub fn input(&self, age: usize) -> Option<&SparseVector> {
        self.slot(age).map(|s| &self.inputs[s])
    }

    pub fn dense(&self, age: usize) -> Option<&[f32]> {
        self.slot(age).map(|s| self.dense.row(s))
    }

    pub fn hidden(&self, age: usize) -> Option<&[Neuron]> {
        self.slot(age).map(|s| self.hidden[s].as_slice())
    }

    /// Activation of `unit` at `age`, zero for steps not recorded.
    pub fn hidden_output(&self, age: usize, unit: usize) -> f32 {
        self.hidden(age).map_or(0.0, |h| h[unit].cell_output)
    }

    /// Error of `unit` at `age`, zero for steps not recorded.
    pub fn hidden_error(&self, age: usize, unit: usize) -> f32 {
        self.hidden(age).map_or(0.0, |h| h[unit].er)
    }
}

/// Gradient sums collected over one BPTT sweep, one row per hidden unit.
#[derive(Debug, Clone)]
pub struct GradientAccumulators {
    pub input: Matrix,
    pub dense: Matrix,
    pub recurrent: Matrix,
}

impl GradientAccumulators {
    pub fn new(input_size: usize, hidden_size: usize, dense_size: usize) -> Self {
        Self {
            input: Matrix::zeros(hidden_size, input_size),
            dense: Matrix::zeros(hidden_size, dense_size),
            recurrent: Matrix::zeros(hidden_size, hidden_size),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input.is_zero() && self.dense.is_zero() && self.recurrent.is_zero()
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.dense.clear();
        self.recurrent.clear();
    }
}
