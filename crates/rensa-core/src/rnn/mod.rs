//! # Recurrent Taggers
//!
//! Two network layouts share one sequence-level contract:
//!
//! | Network | Layout | Stepwise access |
//! |---------|--------|-----------------|
//! | [`SimpleRnn`] | one sigmoid recurrent layer, one traversal order | yes ([`StepwiseEngine`]) |
//! | [`BiRnn`] | two [`SimpleRnn`]s run in opposite orders, hidden states summed | no |
//!
//! Both produce per-token raw output scores ([`SequenceProcessor::predict_sentence`])
//! or, with the CRF layer enabled, a Viterbi label path
//! ([`SequenceProcessor::predict_sentence_crf`]). In [`RunningMode::Train`]
//! both calls also update the weights before returning.
//!
//! ```
//! use rensa_core::math::SparseVector;
//! use rensa_core::rnn::{IoDims, SequenceProcessor, SimpleRnn};
//! use rensa_core::types::{RunningMode, Sequence, State};
//! use rensa_core::RnnConfig;
//!
//! let config = RnnConfig::new().with_hidden_size(4);
//! let mut rnn = SimpleRnn::new(&config, IoDims::new(3, 0, 2)).unwrap();
//!
//! let mut seq = Sequence::new(vec![
//!     State::new(SparseVector::from_pairs(3, [(0, 1.0)]), vec![], 0),
//!     State::new(SparseVector::from_pairs(3, [(2, 1.0)]), vec![], 1),
//! ]);
//! let scores = rnn.predict_sentence(&mut seq, RunningMode::Test).unwrap();
//! assert_eq!((scores.rows(), scores.cols()), (2, 2));
//! ```

pub mod birnn;
pub mod bptt;
pub mod network;
pub mod persist;
pub mod simple;

use std::path::Path;

use crate::error::{RensaError, Result};
use crate::math::{softmax, Matrix};
use crate::types::{Neuron, RunningMode, Sequence, State};

pub use birnn::{BiRnn, Decoded};
pub use network::Network;
pub use persist::ModelHeader;
pub use simple::SimpleRnn;

/// Sizes supplied by the featurizer and the tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoDims {
    /// Sparse feature space size (`L0`).
    pub input: usize,
    /// Dense feature vector length.
    pub dense: usize,
    /// Number of labels (`L2`).
    pub output: usize,
}

impl IoDims {
    pub fn new(input: usize, dense: usize, output: usize) -> Self {
        Self {
            input,
            dense,
            output,
        }
    }
}

/// All layer sizes of a network, as persisted in the model header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSizes {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
    pub dense: usize,
}

impl LayerSizes {
    pub fn io(&self) -> IoDims {
        IoDims::new(self.input, self.dense, self.output)
    }
}

/// Sequence-level operations offered by every network layout.
pub trait SequenceProcessor {
    /// Decode `seq` and return raw (pre-softmax) output scores, one row per
    /// token. Gold labels are scored outside of test mode and the weights
    /// are updated in train mode.
    fn predict_sentence(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Matrix>;

    /// Decode `seq` through the CRF layer and return the best label path.
    fn predict_sentence_crf(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Vec<usize>>;

    /// Whether the CRF output layer is in use.
    fn is_crf(&self) -> bool;

    fn sizes(&self) -> LayerSizes;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);

    /// Sum of `log10 p(gold)` over every scored token since the last reset.
    fn log_prob(&self) -> f64;

    fn reset_log_prob(&mut self);

    fn save(&self, path: &Path) -> Result<()>;

    /// Best label per token, through the CRF layer when enabled and by
    /// arg-max over raw scores otherwise.
    fn tag(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Vec<usize>> {
        if self.is_crf() {
            self.predict_sentence_crf(seq, mode)
        } else {
            let scores = self.predict_sentence(seq, mode)?;
            Ok(scores.iter_rows().map(argmax).collect())
        }
    }
}

/// Single-timestep forward and backward operations. Only a directional
/// engine exposes these; a composer has no single-step meaning.
pub trait StepwiseEngine {
    /// Clear transient state before a new sequence. With `update_net` the
    /// dropout masks are redrawn and the BPTT history is cleared.
    fn net_reset(&mut self, update_net: bool);

    /// Forward one token. Writes the pre-softmax outputs into `raw` when given.
    fn compute_net(&mut self, state: &State, raw: Option<&mut [f32]>, is_train: bool) -> Result<()>;

    /// Output-layer error and hidden→output update for the current token.
    /// `output_error` replaces the softmax cross-entropy error when given.
    fn learn_net(&mut self, state: &State, output_error: Option<&[f32]>) -> Result<()>;

    /// Record the current token in the BPTT history and run a sweep when
    /// `step` closes a block or is the last of `num_states`.
    fn learn_back_time(&mut self, state: &State, num_states: usize, step: usize);

    fn hidden_layer(&self) -> &[Neuron];

    fn output_layer(&self) -> &[Neuron];
}

/// Index of the largest value, lowest index on ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Softmax cross-entropy error for one token: `-p(c)` everywhere plus one at the gold label.
pub(crate) fn indicator_minus(probabilities: &[f32], label: usize, error: &mut [f32]) {
    for (e, &p) in error.iter_mut().zip(probabilities) {
        *e = -p;
    }
    error[label] += 1.0;
}

/// [`indicator_minus`] for every token of a sequence. `probabilities` holds
/// either softmax outputs or CRF marginals, one row per token.
pub(crate) fn output_errors(probabilities: &Matrix, labels: &[usize]) -> Result<Matrix> {
    let mut errors = Matrix::zeros(probabilities.rows(), probabilities.cols());
    for (t, &label) in labels.iter().enumerate() {
        check_label(label, probabilities.cols())?;
        indicator_minus(probabilities.row(t), label, errors.row_mut(t));
    }
    Ok(errors)
}

pub(crate) fn check_label(label: usize, num_tags: usize) -> Result<()> {
    if label >= num_tags {
        return Err(RensaError::InvalidSequence(format!(
            "gold label {label} out of range for {num_tags} tags"
        )));
    }
    Ok(())
}

/// Softmax over a layer's activations, in place.
pub(crate) fn softmax_layer(layer: &mut [Neuron]) {
    let mut values: Vec<f32> = layer.iter().map(|n| n.cell_output).collect();
    softmax(&mut values);
    for (n, v) in layer.iter_mut().zip(values) {
        n.cell_output = v;
    }
}
