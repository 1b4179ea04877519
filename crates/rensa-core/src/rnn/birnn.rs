//! # Bidirectional Composer
//!
//! Two [`SimpleRnn`] engines read the sentence in opposite directions. Their
//! hidden activations are summed per token and projected through one shared
//! hidden→output matrix:
//!
//! ```text
//! merged(t) = forward_hidden(t) + backward_hidden(t)
//! raw(t)    = W_ho · merged(t)
//! ```
//!
//! The two directions are independent until the merge, so decoding and
//! learning run them concurrently with `rayon::join`.

use std::path::Path;

use oorandom::Rand64;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::RnnConfig;
use crate::crf::CrfLayer;
use crate::error::{RensaError, Result};
use crate::math::{random_matrix, softmax, Matrix};
use crate::rnn::persist::{suffixed, ModelHeader};
use crate::rnn::simple::expect_shape;
use crate::rnn::{
    check_label, output_errors, IoDims, LayerSizes, SequenceProcessor, SimpleRnn, StepwiseEngine,
};
use crate::types::{ModelDirection, ModelType, RunningMode, Sequence, Traversal};

/// Intermediate results of one bidirectional decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// `[T, L1]` sum of both directions' hidden activations.
    pub merged_hidden: Matrix,
    /// `[T, L2]` pre-softmax scores.
    pub raw: Matrix,
    /// `[T, L2]` softmax of `raw`.
    pub output: Matrix,
}

/// Bidirectional recurrent tagger.
pub struct BiRnn {
    config: RnnConfig,
    sizes: LayerSizes,
    forward: SimpleRnn,
    backward: SimpleRnn,
    /// Canonical `[L2, L1]` output weights. Engines only ever hold copies.
    hidden_to_output: Matrix,
    crf: CrfLayer,
    log_prob: f64,
}

fn engine_config(config: &RnnConfig, traversal: Traversal, seed: u64) -> RnnConfig {
    config
        .clone()
        .with_traversal(traversal)
        .with_seed(seed)
        .with_crf(false)
        .with_bidirectional(false)
}

impl BiRnn {
    pub fn new(config: &RnnConfig, io: IoDims) -> Result<Self> {
        config.validate()?;
        info!(seed = config.seed, "initializing bidirectional RNN");

        let forward = SimpleRnn::new(
            &engine_config(config, Traversal::LeftToRight, config.seed),
            io,
        )?;
        let backward = SimpleRnn::new(
            &engine_config(config, Traversal::RightToLeft, config.seed.wrapping_add(1)),
            io,
        )?;
        let sizes = forward.sizes();

        let mut rng = Rand64::new(u128::from(config.seed.wrapping_add(2)));
        let hidden_to_output = random_matrix(sizes.output, sizes.hidden, &mut rng);

        Ok(Self {
            config: config.clone().with_bidirectional(true),
            sizes,
            forward,
            backward,
            hidden_to_output,
            crf: CrfLayer::new(sizes.output),
            log_prob: 0.0,
        })
    }

    /// Compose two existing engines. The forward engine's output weights and
    /// CRF transitions become the shared ones.
    pub fn from_engines(config: &RnnConfig, mut forward: SimpleRnn, mut backward: SimpleRnn) -> Result<Self> {
        let sizes = forward.sizes();
        if backward.sizes() != sizes {
            return Err(RensaError::DimensionMismatch(format!(
                "forward engine sizes {:?} differ from backward engine sizes {:?}",
                sizes,
                backward.sizes()
            )));
        }
        let crf_enabled = config.crf || forward.is_crf();
        let hidden_to_output = forward.hidden_to_output().clone();
        let crf = forward.crf_layer().clone();
        forward.set_crf_enabled(false);
        backward.set_crf_enabled(false);

        let mut config = config.clone().with_bidirectional(true).with_crf(crf_enabled);
        config.hidden_size = sizes.hidden;
        forward.set_learning_rate(config.learning_rate);
        backward.set_learning_rate(config.learning_rate);

        Ok(Self {
            config,
            sizes,
            forward,
            backward,
            hidden_to_output,
            crf,
            log_prob: 0.0,
        })
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    pub fn forward_engine(&self) -> &SimpleRnn {
        &self.forward
    }

    pub fn backward_engine(&self) -> &SimpleRnn {
        &self.backward
    }

    pub fn hidden_to_output(&self) -> &Matrix {
        &self.hidden_to_output
    }

    pub fn crf_layer(&self) -> &CrfLayer {
        &self.crf
    }

    /// Run both directions over `seq` and merge them. Weights are untouched.
    pub fn decode(&mut self, seq: &Sequence, is_train: bool) -> Result<Decoded> {
        let (forward, backward) = (&mut self.forward, &mut self.backward);
        forward.net_reset(false);
        backward.net_reset(false);

        let (fwd, bwd) = rayon::join(
            || forward.hidden_states(seq, Traversal::LeftToRight, is_train),
            || backward.hidden_states(seq, Traversal::RightToLeft, is_train),
        );
        let (fwd, bwd) = (fwd?, bwd?);

        let merged_hidden = Matrix::from_fn(fwd.rows(), fwd.cols(), |t, k| fwd.get(t, k) + bwd.get(t, k));

        let mut raw = Matrix::zeros(seq.len(), self.sizes.output);
        let w = &self.hidden_to_output;
        let merged = &merged_hidden;
        raw.par_rows_mut().enumerate().for_each(|(t, row)| {
            let h = merged.row(t);
            for (c, r) in row.iter_mut().enumerate() {
                *r = w.row(c).iter().zip(h).map(|(w, h)| w * h).sum();
            }
        });

        let mut output = raw.clone();
        output.par_rows_mut().for_each(softmax);

        Ok(Decoded {
            merged_hidden,
            raw,
            output,
        })
    }

    /// Update the shared output weights and both engines from per-token
    /// output errors. The three updates are independent and run concurrently.
    pub fn learn_two_rnn(&mut self, seq: &Sequence, decoded: &Decoded, errors: &Matrix) -> Result<()> {
        if errors.rows() != seq.len() || errors.cols() != self.sizes.output {
            return Err(RensaError::DimensionMismatch(format!(
                "output errors are {}x{}, expected {}x{}",
                errors.rows(),
                errors.cols(),
                seq.len(),
                self.sizes.output
            )));
        }

        self.forward.net_reset(true);
        self.backward.net_reset(true);
        self.forward.set_output_weights(self.hidden_to_output.clone())?;
        self.backward.set_output_weights(self.hidden_to_output.clone())?;

        let lr = self.config.learning_rate;
        let (shared, forward, backward) = (&mut self.hidden_to_output, &mut self.forward, &mut self.backward);
        let merged = &decoded.merged_hidden;

        let ((), (fwd, bwd)) = rayon::join(
            || {
                shared.par_rows_mut().enumerate().for_each(|(c, row)| {
                    for t in 0..merged.rows() {
                        let er = errors.get(t, c);
                        for (w, h) in row.iter_mut().zip(merged.row(t)) {
                            *w += lr * h * er;
                        }
                    }
                })
            },
            || {
                rayon::join(
                    || forward.learn_sequence(seq, errors, Traversal::LeftToRight),
                    || backward.learn_sequence(seq, errors, Traversal::RightToLeft),
                )
            },
        );
        fwd?;
        bwd?;
        Ok(())
    }

    fn score_gold(&mut self, probabilities: &Matrix, seq: &Sequence) -> Result<()> {
        for (t, state) in seq.states.iter().enumerate() {
            check_label(state.label, self.sizes.output)?;
            self.log_prob += f64::from(probabilities.get(t, state.label)).log10();
        }
        Ok(())
    }

    /// Load the three files written by [`SequenceProcessor::save`].
    pub fn load(path: &Path, config: &RnnConfig) -> Result<Self> {
        info!(path = %path.display(), "loading bidirectional RNN model");
        let meta = ModelHeader::peek(path)?;
        if meta.model_type != ModelType::Simple {
            return Err(RensaError::ModelTypeMismatch {
                expected: ModelType::Simple.to_string(),
                found: meta.model_type.to_string(),
            });
        }
        if meta.direction != ModelDirection::Bidirectional {
            return Err(RensaError::UnsupportedOperation(format!(
                "{} is a {} model, not a bidirectional one",
                path.display(),
                meta.direction
            )));
        }

        let forward = SimpleRnn::load(
            &suffixed(path, ".forward"),
            &engine_config(config, Traversal::LeftToRight, config.seed),
        )?;
        let backward = SimpleRnn::load(
            &suffixed(path, ".backward"),
            &engine_config(config, Traversal::RightToLeft, config.seed.wrapping_add(1)),
        )?;
        for (name, engine) in [("forward", &forward), ("backward", &backward)] {
            if engine.sizes() != meta.sizes {
                return Err(RensaError::DimensionMismatch(format!(
                    "{name} engine sizes {:?} differ from model sizes {:?}",
                    engine.sizes(),
                    meta.sizes
                )));
            }
        }

        let hidden_to_output = forward.hidden_to_output().clone();
        expect_shape(&hidden_to_output, meta.sizes.output, meta.sizes.hidden, "hidden2output")?;
        let crf = if meta.crf {
            forward.crf_layer().clone()
        } else {
            CrfLayer::new(meta.sizes.output)
        };
        let mut config = config.clone().with_bidirectional(true).with_crf(meta.crf);
        config.hidden_size = meta.sizes.hidden;

        debug!(crf = meta.crf, "bidirectional model loaded");
        let mut forward = forward;
        let mut backward = backward;
        forward.set_crf_enabled(false);
        backward.set_crf_enabled(false);
        Ok(Self {
            config,
            sizes: meta.sizes,
            forward,
            backward,
            hidden_to_output,
            crf,
            log_prob: 0.0,
        })
    }
}

impl SequenceProcessor for BiRnn {
    fn predict_sentence(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Matrix> {
        let decoded = self.decode(seq, mode.is_train())?;
        if mode.scores_gold() {
            self.score_gold(&decoded.output, seq)?;
        }
        if mode.is_train() && !seq.is_empty() {
            let errors = output_errors(&decoded.output, &seq.labels())?;
            self.learn_two_rnn(seq, &decoded, &errors)?;
        }
        Ok(decoded.raw)
    }

    fn predict_sentence_crf(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Vec<usize>> {
        if seq.is_empty() {
            return Ok(Vec::new());
        }
        let decoded = self.decode(seq, mode.is_train())?;

        let marginals = self.crf.forward_backward(&decoded.raw)?.clone();
        if mode.scores_gold() {
            self.score_gold(&marginals, seq)?;
        }

        let best = self.crf.viterbi(&decoded.raw)?;

        if mode.is_train() {
            let labels = seq.labels();
            self.crf
                .update_bigram_transition(&labels, self.config.learning_rate)?;
            let errors = output_errors(&marginals, &labels)?;
            self.learn_two_rnn(seq, &decoded, &errors)?;
        }

        Ok(best)
    }

    fn is_crf(&self) -> bool {
        self.config.crf
    }

    fn sizes(&self) -> LayerSizes {
        self.sizes
    }

    fn learning_rate(&self) -> f32 {
        self.config.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.config.learning_rate = learning_rate;
        self.forward.set_learning_rate(learning_rate);
        self.backward.set_learning_rate(learning_rate);
    }

    fn log_prob(&self) -> f64 {
        self.log_prob
    }

    fn reset_log_prob(&mut self) {
        self.log_prob = 0.0;
    }

    fn save(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "saving bidirectional RNN model");
        let crf = self.config.crf;
        self.forward
            .save_with(&suffixed(path, ".forward"), &self.hidden_to_output, &self.crf, crf)?;
        self.backward
            .save_with(&suffixed(path, ".backward"), &self.hidden_to_output, &self.crf, crf)?;

        let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);
        ModelHeader {
            model_type: ModelType::Simple,
            direction: ModelDirection::Bidirectional,
            crf,
            sizes: self.sizes,
        }
        .write_to(&mut w)?;
        std::io::Write::flush(&mut w)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SparseVector;
    use crate::types::State;

    fn sequence() -> Sequence {
        let tokens: [(&[(usize, f32)], usize); 4] = [
            (&[(0, 1.0)], 0),
            (&[(1, 1.0), (5, 1.0)], 1),
            (&[(2, 1.0)], 0),
            (&[(3, 1.0), (4, 0.5)], 1),
        ];
        Sequence::new(
            tokens
                .iter()
                .map(|(pairs, label)| State::new(SparseVector::from_pairs(6, pairs.iter().copied()), vec![], *label))
                .collect(),
        )
    }

    fn birnn(config: RnnConfig) -> BiRnn {
        BiRnn::new(&config.with_hidden_size(4), IoDims::new(6, 0, 2)).unwrap()
    }

    #[test]
    fn merged_hidden_is_sum_of_directions() {
        let mut net = birnn(RnnConfig::new());
        let seq = sequence();
        let decoded = net.decode(&seq, false).unwrap();

        let mut fwd = net.forward.clone();
        let mut bwd = net.backward.clone();
        fwd.net_reset(false);
        bwd.net_reset(false);
        let f = fwd.hidden_states(&seq, Traversal::LeftToRight, false).unwrap();
        let b = bwd.hidden_states(&seq, Traversal::RightToLeft, false).unwrap();

        for t in 0..seq.len() {
            for k in 0..4 {
                let a = decoded.merged_hidden.get(t, k);
                assert!((a - (b.get(t, k) + f.get(t, k))).abs() < 1e-6);
            }
            let sum: f32 = decoded.output.row(t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn decode_is_idempotent() {
        let mut net = birnn(RnnConfig::new());
        let seq = sequence();
        let a = net.decode(&seq, false).unwrap();
        let b = net.decode(&seq, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn training_updates_shared_weights_only_through_composer() {
        let mut net = birnn(RnnConfig::new());
        let mut seq = sequence();
        let before = net.hidden_to_output().clone();
        let fwd_before = net.forward_engine().hidden_to_hidden().clone();

        net.predict_sentence(&mut seq, RunningMode::Train).unwrap();

        assert_ne!(&before, net.hidden_to_output());
        assert_ne!(&fwd_before, net.forward_engine().hidden_to_hidden());
        assert!(net.forward_engine().gradients().is_zero());
        assert!(net.backward_engine().gradients().is_zero());
        assert!(net.log_prob() < 0.0);
    }

    #[test]
    fn validation_leaves_weights_alone() {
        let mut net = birnn(RnnConfig::new());
        let mut seq = sequence();
        let before = net.hidden_to_output().clone();
        net.predict_sentence(&mut seq, RunningMode::Validate).unwrap();
        assert_eq!(&before, net.hidden_to_output());
        assert!(net.log_prob() < 0.0);
    }

    #[test]
    fn crf_training_returns_full_path() {
        let mut net = birnn(RnnConfig::new().with_crf(true));
        let mut seq = sequence();
        let path = net.predict_sentence_crf(&mut seq, RunningMode::Train).unwrap();
        assert_eq!(path.len(), 4);
        assert!(!net.crf_layer().transitions().is_zero());
        assert!(path.iter().all(|&l| l < 2));
    }

    #[test]
    fn mismatched_engines_are_rejected() {
        let config = RnnConfig::new().with_hidden_size(4);
        let a = SimpleRnn::new(&config, IoDims::new(6, 0, 2)).unwrap();
        let b = SimpleRnn::new(&config, IoDims::new(7, 0, 2)).unwrap();
        assert!(matches!(
            BiRnn::from_engines(&config, a, b),
            Err(RensaError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn bad_error_matrix_is_rejected() {
        let mut net = birnn(RnnConfig::new());
        let seq = sequence();
        let decoded = net.decode(&seq, false).unwrap();
        let errors = Matrix::zeros(2, 2);
        assert!(net.learn_two_rnn(&seq, &decoded, &errors).is_err());
    }
}
