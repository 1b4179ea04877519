//! # Directional Recurrent Engine
//!
//! A single sigmoid recurrent layer walked in one traversal order, trained
//! with truncated backpropagation through time.
//!
//! ```text
//! hidden(t) = sigmoid(W_hh · hidden(t-1) + W_ih · sparse(t) + W_fh · dense(t))
//! output(t) = softmax(W_ho · hidden(t))
//! ```
//!
//! Errors from the output layer are recorded per step and swept back through
//! `W_hh` every `bptt_block` steps (and at the end of the sequence), reaching
//! at most `bptt + bptt_block` steps into the past.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use oorandom::Rand64;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::RnnConfig;
use crate::crf::CrfLayer;
use crate::error::{RensaError, Result};
use crate::math::{random_matrix, sigmoid, Matrix};
use crate::rnn::bptt::{BpttHistory, GradientAccumulators};
use crate::rnn::persist::ModelHeader;
use crate::rnn::{
    argmax, check_label, output_errors, softmax_layer, IoDims, LayerSizes, SequenceProcessor,
    StepwiseEngine,
};
use crate::types::{ModelDirection, ModelType, Neuron, RunningMode, Sequence, State, Traversal};

/// The four weight matrices of a directional engine.
struct Weights {
    input_to_hidden: Matrix,
    hidden_to_hidden: Matrix,
    feature_to_hidden: Matrix,
    hidden_to_output: Matrix,
}

/// Single-direction recurrent network.
#[derive(Clone)]
pub struct SimpleRnn {
    config: RnnConfig,
    sizes: LayerSizes,
    /// `[L1, L0]`
    input_to_hidden: Matrix,
    /// `[L1, L1]`, row = receiving unit
    hidden_to_hidden: Matrix,
    /// `[L1, dense]`
    feature_to_hidden: Matrix,
    /// `[L2, L1]`
    hidden_to_output: Matrix,
    crf: CrfLayer,
    hidden: Vec<Neuron>,
    last_hidden: Vec<Neuron>,
    output: Vec<Neuron>,
    /// Dense features of the token being processed.
    features: Vec<f32>,
    history: BpttHistory,
    grads: GradientAccumulators,
    rng: Rand64,
    log_prob: f64,
}

impl SimpleRnn {
    /// Create an engine with freshly initialised weights.
    pub fn new(config: &RnnConfig, io: IoDims) -> Result<Self> {
        config.validate()?;
        let sizes = LayerSizes {
            input: io.input,
            hidden: config.hidden_size,
            output: io.output,
            dense: io.dense,
        };
        let mut rng = Rand64::new(u128::from(config.seed));

        info!(
            l0 = sizes.input,
            l1 = sizes.hidden,
            l2 = sizes.output,
            dense = sizes.dense,
            seed = config.seed,
            "initializing simple RNN weights"
        );
        let weights = Weights {
            input_to_hidden: random_matrix(sizes.hidden, sizes.input, &mut rng),
            feature_to_hidden: random_matrix(sizes.hidden, sizes.dense, &mut rng),
            hidden_to_output: random_matrix(sizes.output, sizes.hidden, &mut rng),
            hidden_to_hidden: random_matrix(sizes.hidden, sizes.hidden, &mut rng),
        };
        debug!(
            bptt = config.bptt,
            bptt_block = config.bptt_block,
            "BPTT window {}",
            config.bptt_window()
        );

        Ok(Self::assemble(
            config.clone(),
            sizes,
            weights,
            CrfLayer::new(sizes.output),
            rng,
        ))
    }

    fn assemble(
        config: RnnConfig,
        sizes: LayerSizes,
        weights: Weights,
        crf: CrfLayer,
        rng: Rand64,
    ) -> Self {
        Self {
            history: BpttHistory::new(config.bptt_window(), sizes.hidden, sizes.dense),
            grads: GradientAccumulators::new(sizes.input, sizes.hidden, sizes.dense),
            config,
            sizes,
            input_to_hidden: weights.input_to_hidden,
            hidden_to_hidden: weights.hidden_to_hidden,
            feature_to_hidden: weights.feature_to_hidden,
            hidden_to_output: weights.hidden_to_output,
            crf,
            hidden: Neuron::layer(sizes.hidden),
            last_hidden: Neuron::layer(sizes.hidden),
            output: Neuron::layer(sizes.output),
            features: vec![0.0; sizes.dense],
            rng,
            log_prob: 0.0,
        }
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    pub fn traversal(&self) -> Traversal {
        self.config.traversal
    }

    pub fn input_to_hidden(&self) -> &Matrix {
        &self.input_to_hidden
    }

    pub fn hidden_to_hidden(&self) -> &Matrix {
        &self.hidden_to_hidden
    }

    pub fn feature_to_hidden(&self) -> &Matrix {
        &self.feature_to_hidden
    }

    pub fn hidden_to_output(&self) -> &Matrix {
        &self.hidden_to_output
    }

    pub fn crf_layer(&self) -> &CrfLayer {
        &self.crf
    }

    pub fn gradients(&self) -> &GradientAccumulators {
        &self.grads
    }

    pub fn history(&self) -> &BpttHistory {
        &self.history
    }

    /// Replace the hidden→output weights with a working copy handed over by
    /// an owner of the canonical matrix.
    pub fn set_output_weights(&mut self, weights: Matrix) -> Result<()> {
        expect_shape(&weights, self.sizes.output, self.sizes.hidden, "hidden2output")?;
        self.hidden_to_output = weights;
        Ok(())
    }

    pub(crate) fn set_crf_enabled(&mut self, enabled: bool) {
        self.config.crf = enabled;
    }

    fn set_input_layer(&mut self, state: &State) -> Result<()> {
        if state.dense.len() != self.sizes.dense {
            return Err(RensaError::DimensionMismatch(format!(
                "dense feature length {} does not match model size {}",
                state.dense.len(),
                self.sizes.dense
            )));
        }
        if state.sparse.key_bound() > self.sizes.input {
            return Err(RensaError::DimensionMismatch(format!(
                "sparse feature index {} outside input layer of size {}",
                state.sparse.key_bound() - 1,
                self.sizes.input
            )));
        }
        self.features.copy_from_slice(&state.dense);
        Ok(())
    }

    fn score_gold(&mut self, probability: f32) {
        self.log_prob += f64::from(probability).log10();
    }

    /// Forward every token in `traversal` order, returning each token's
    /// hidden activations at its sentence position. The caller resets the
    /// engine beforehand.
    pub fn hidden_states(&mut self, seq: &Sequence, traversal: Traversal, is_train: bool) -> Result<Matrix> {
        let mut states = Matrix::zeros(seq.len(), self.sizes.hidden);
        for t in traversal.order(seq.len()) {
            self.compute_net(&seq.states[t], None, is_train)?;
            for (dst, n) in states.row_mut(t).iter_mut().zip(&self.hidden) {
                *dst = n.cell_output;
            }
        }
        Ok(states)
    }

    /// Re-run `seq` in `traversal` order, injecting the externally computed
    /// `errors` (one row per token) at the output layer and learning from them.
    pub fn learn_sequence(&mut self, seq: &Sequence, errors: &Matrix, traversal: Traversal) -> Result<()> {
        let n = seq.len();
        for (step, t) in traversal.order(n).enumerate() {
            let state = &seq.states[t];
            self.compute_net(state, None, true)?;
            self.learn_net(state, Some(errors.row(t)))?;
            self.learn_back_time(state, n, step);
        }
        Ok(())
    }

    /// Forward pass over the whole sequence, filling runtime features from
    /// the labels predicted so far. Scores the softmax output at the gold
    /// label when `score` is set and learns per step when `learn` is set.
    fn run_forward(&mut self, seq: &mut Sequence, is_train: bool, score: bool, learn: bool) -> Result<Matrix> {
        if self.config.traversal == Traversal::RightToLeft
            && seq.states.iter().any(|s| !s.runtime_features.is_empty())
        {
            return Err(RensaError::UnsupportedOperation(
                "runtime label features need left-to-right traversal".to_string(),
            ));
        }
        let n = seq.len();
        let mut raw = Matrix::zeros(n, self.sizes.output);
        let mut predicted: Vec<Option<usize>> = vec![None; n];

        for (step, t) in self.config.traversal.order(n).enumerate() {
            fill_runtime_features(&mut seq.states[t], t, &predicted);
            let state = &seq.states[t];
            self.compute_net(state, Some(raw.row_mut(t)), is_train)?;

            let probs: Vec<f32> = self.output.iter().map(|o| o.cell_output).collect();
            predicted[t] = Some(argmax(&probs));

            if score {
                check_label(state.label, self.sizes.output)?;
                self.score_gold(probs[state.label]);
            }
            if learn {
                self.learn_net(state, None)?;
                self.learn_back_time(state, n, step);
            }
        }
        Ok(raw)
    }

    fn learn_bptt(&mut self) {
        let window = self.config.bptt_window();
        let steps = window.saturating_sub(2);
        let cutoff = self.config.gradient_cutoff;
        let lr = self.config.learning_rate;

        for step in 0..steps {
            let Some(sparse) = self.history.input(step) else {
                break;
            };

            // compute hidden layer gradient
            self.hidden
                .par_iter_mut()
                .for_each(|n| n.er *= n.cell_output * (1.0 - n.cell_output));
            let hidden = &self.hidden;

            // dense weight gradient fea -> hidden
            if let Some(fea) = self.history.dense(step).filter(|f| !f.is_empty()) {
                self.grads
                    .dense
                    .par_rows_mut()
                    .zip(hidden.par_iter())
                    .for_each(|(row, n)| {
                        for (g, f) in row.iter_mut().zip(fea) {
                            *g += n.er * f;
                        }
                    });
            }

            // sparse weight gradient input -> hidden
            self.grads
                .input
                .par_rows_mut()
                .zip(hidden.par_iter())
                .for_each(|(row, n)| {
                    for e in sparse.iter() {
                        row[e.key] += n.er * e.value;
                    }
                });

            // recurrent weight gradient
            let last = &self.last_hidden;
            self.grads
                .recurrent
                .par_rows_mut()
                .zip(hidden.par_iter())
                .for_each(|(row, n)| {
                    for (g, p) in row.iter_mut().zip(last) {
                        *g += n.er * p.cell_output;
                    }
                });

            // propagate errors hidden(t) -> hidden(t-1)
            let w_hh = &self.hidden_to_hidden;
            self.last_hidden.par_iter_mut().enumerate().for_each(|(i, p)| {
                let er: f32 = hidden
                    .iter()
                    .enumerate()
                    .map(|(a, n)| n.er * w_hh.get(a, i))
                    .sum();
                p.er = er.clamp(-cutoff, cutoff);
            });

            // add the output error recorded one step further back
            let history = &self.history;
            for (a, n) in self.hidden.iter_mut().enumerate() {
                n.er = self.last_hidden[a].er + history.hidden_error(step + 1, a);
            }

            if step + 3 < window {
                for a in 0..self.sizes.hidden {
                    self.hidden[a].cell_output = history.hidden_output(step + 1, a);
                    self.last_hidden[a].cell_output = history.hidden_output(step + 2, a);
                }
            }
        }

        // restore hidden layer after bptt
        for a in 0..self.sizes.hidden {
            self.hidden[a].cell_output = self.history.hidden_output(0, a);
        }

        self.hidden_to_hidden
            .par_rows_mut()
            .zip(self.grads.recurrent.par_rows_mut())
            .for_each(|(w, g)| apply_and_clear(w, g, lr));

        self.feature_to_hidden
            .par_rows_mut()
            .zip(self.grads.dense.par_rows_mut())
            .for_each(|(w, g)| apply_and_clear(w, g, lr));

        // only the columns touched inside the window carry gradient
        let history = &self.history;
        self.input_to_hidden
            .par_rows_mut()
            .zip(self.grads.input.par_rows_mut())
            .for_each(|(w, g)| {
                for step in 0..steps {
                    let Some(sparse) = history.input(step) else {
                        break;
                    };
                    for e in sparse.iter() {
                        w[e.key] += lr * g[e.key];
                        g[e.key] = 0.0;
                    }
                }
            });
    }

    /// Persist this engine with an explicit output matrix and CRF layer, as
    /// used by a composer that owns the canonical copies.
    pub(crate) fn save_with(
        &self,
        path: &Path,
        hidden_to_output: &Matrix,
        crf: &CrfLayer,
        crf_enabled: bool,
    ) -> Result<()> {
        info!(path = %path.display(), "saving simple RNN model");
        let mut w = BufWriter::new(File::create(path)?);

        ModelHeader {
            model_type: ModelType::Simple,
            direction: ModelDirection::Forward,
            crf: crf_enabled,
            sizes: self.sizes,
        }
        .write_to(&mut w)?;

        debug!("saving input2hidden weights");
        self.input_to_hidden.write_to(&mut w)?;
        debug!("saving bptt hidden weights");
        self.hidden_to_hidden.write_to(&mut w)?;
        debug!("saving feature2hidden weights");
        self.feature_to_hidden.write_to(&mut w)?;
        debug!("saving hidden2output weights");
        hidden_to_output.write_to(&mut w)?;

        if crf_enabled {
            debug!("saving CRF tag transition weights");
            crf.transitions().write_to(&mut w)?;
        }

        w.flush()?;
        Ok(())
    }

    /// Load an engine saved by [`SequenceProcessor::save`]. Layer sizes and
    /// the CRF flag come from the file; `config` supplies the training
    /// hyper-parameters.
    pub fn load(path: &Path, config: &RnnConfig) -> Result<Self> {
        info!(path = %path.display(), "loading simple RNN model");
        let mut r = BufReader::new(File::open(path)?);

        let header = ModelHeader::read_from(&mut r)?;
        if header.model_type != ModelType::Simple {
            return Err(RensaError::ModelTypeMismatch {
                expected: ModelType::Simple.to_string(),
                found: header.model_type.to_string(),
            });
        }
        if header.direction != ModelDirection::Forward {
            return Err(RensaError::UnsupportedOperation(format!(
                "{} holds a {} model header, not a single-direction engine",
                path.display(),
                header.direction
            )));
        }
        let sizes = header.sizes;

        debug!("loading input2hidden weights");
        let input_to_hidden = Matrix::read_shaped(&mut r, sizes.hidden, sizes.input, "input2hidden")?;
        debug!("loading bptt hidden weights");
        let hidden_to_hidden = Matrix::read_shaped(&mut r, sizes.hidden, sizes.hidden, "bptt hidden")?;
        debug!("loading feature2hidden weights");
        let feature_to_hidden = Matrix::read_shaped(&mut r, sizes.hidden, sizes.dense, "feature2hidden")?;
        debug!("loading hidden2output weights");
        let hidden_to_output = Matrix::read_shaped(&mut r, sizes.output, sizes.hidden, "hidden2output")?;

        let crf = if header.crf {
            debug!("loading CRF tag transition weights");
            let transitions = Matrix::read_shaped(&mut r, sizes.output, sizes.output, "CRF transition")?;
            CrfLayer::with_transitions(transitions)
        } else {
            CrfLayer::new(sizes.output)
        };

        let mut config = config.clone();
        config.hidden_size = sizes.hidden;
        config.crf = header.crf;
        config.validate()?;
        let rng = Rand64::new(u128::from(config.seed));

        let weights = Weights {
            input_to_hidden,
            hidden_to_hidden,
            feature_to_hidden,
            hidden_to_output,
        };
        Ok(Self::assemble(config, sizes, weights, crf, rng))
    }
}

impl StepwiseEngine for SimpleRnn {
    fn net_reset(&mut self, update_net: bool) {
        for n in self.hidden.iter_mut() {
            n.cell_output = 0.1;
            n.er = 0.0;
            n.mask = false;
        }

        if update_net {
            // Train mode
            let dropout = f64::from(self.config.dropout);
            for n in self.hidden.iter_mut() {
                if self.rng.rand_float() < dropout {
                    n.mask = true;
                }
            }
            self.history.clear();
        }

        self.last_hidden.copy_from_slice(&self.hidden);
    }

    fn compute_net(&mut self, state: &State, raw: Option<&mut [f32]>, is_train: bool) -> Result<()> {
        self.set_input_layer(state)?;

        // keep last hidden layer and erase activations
        std::mem::swap(&mut self.hidden, &mut self.last_hidden);

        let last = &self.last_hidden;
        let w_hh = &self.hidden_to_hidden;
        let w_ih = &self.input_to_hidden;
        let w_fh = &self.feature_to_hidden;
        let features = &self.features;
        let sparse = &state.sparse;
        let keep = 1.0 - self.config.dropout;

        self.hidden.par_iter_mut().enumerate().for_each(|(b, neuron)| {
            // hidden(t-1) -> hidden(t)
            let mut sum: f32 = last
                .iter()
                .zip(w_hh.row(b))
                .map(|(p, w)| p.cell_output * w)
                .sum();

            // inputs(t) -> hidden(t)
            let row = w_ih.row(b);
            for e in sparse.iter() {
                sum += e.value * row[e.key];
            }

            // fea(t) -> hidden(t)
            sum += features
                .iter()
                .zip(w_fh.row(b))
                .map(|(f, w)| f * w)
                .sum::<f32>();

            neuron.er = 0.0;
            neuron.mask = last[b].mask;
            neuron.cell_output = if neuron.mask {
                0.0
            } else if is_train {
                sigmoid(sum)
            } else {
                sigmoid(sum * keep)
            };
        });

        let hidden = &self.hidden;
        let w_ho = &self.hidden_to_output;
        self.output.par_iter_mut().enumerate().for_each(|(c, o)| {
            o.cell_output = hidden
                .iter()
                .zip(w_ho.row(c))
                .map(|(h, w)| h.cell_output * w)
                .sum();
            o.er = 0.0;
        });

        if let Some(raw) = raw {
            for (dst, o) in raw.iter_mut().zip(&self.output) {
                *dst = o.cell_output;
            }
        }

        softmax_layer(&mut self.output);
        Ok(())
    }

    fn learn_net(&mut self, state: &State, output_error: Option<&[f32]>) -> Result<()> {
        match output_error {
            Some(errors) => {
                if errors.len() != self.sizes.output {
                    return Err(RensaError::DimensionMismatch(format!(
                        "{} output errors for {} output units",
                        errors.len(),
                        self.sizes.output
                    )));
                }
                for (o, &e) in self.output.iter_mut().zip(errors) {
                    o.er = e;
                }
            }
            None => {
                check_label(state.label, self.sizes.output)?;
                for o in self.output.iter_mut() {
                    o.er = -o.cell_output;
                }
                let gold = &mut self.output[state.label];
                gold.er = 1.0 - gold.cell_output;
            }
        }

        // error output -> hidden
        let cutoff = self.config.gradient_cutoff;
        let output = &self.output;
        let w_ho = &self.hidden_to_output;
        self.hidden.par_iter_mut().enumerate().for_each(|(a, n)| {
            let er: f32 = output
                .iter()
                .enumerate()
                .map(|(c, o)| o.er * w_ho.get(c, a))
                .sum();
            // dropped-out units pass no error
            n.er = if n.mask { 0.0 } else { er.clamp(-cutoff, cutoff) };
        });

        // update hidden -> output weights
        let lr = self.config.learning_rate;
        let hidden = &self.hidden;
        self.hidden_to_output
            .par_rows_mut()
            .zip(self.output.par_iter())
            .for_each(|(row, o)| {
                for (w, h) in row.iter_mut().zip(hidden) {
                    *w += lr * o.er * h.cell_output;
                }
            });
        Ok(())
    }

    fn learn_back_time(&mut self, state: &State, num_states: usize, step: usize) {
        self.history.push(&state.sparse, &self.features, &self.hidden);

        // time to learn bptt
        if step % self.config.bptt_block == 0 || step + 1 == num_states {
            self.learn_bptt();
        }
    }

    fn hidden_layer(&self) -> &[Neuron] {
        &self.hidden
    }

    fn output_layer(&self) -> &[Neuron] {
        &self.output
    }
}

impl SequenceProcessor for SimpleRnn {
    fn predict_sentence(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Matrix> {
        self.net_reset(mode.is_train());
        self.run_forward(seq, mode.is_train(), mode.scores_gold(), mode.is_train())
    }

    fn predict_sentence_crf(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Vec<usize>> {
        if seq.is_empty() {
            return Ok(Vec::new());
        }
        self.net_reset(false);
        let raw = self.run_forward(seq, mode.is_train(), false, false)?;

        let marginals = self.crf.forward_backward(&raw)?.clone();
        if mode.scores_gold() {
            for (t, state) in seq.states.iter().enumerate() {
                check_label(state.label, self.sizes.output)?;
                self.score_gold(marginals.get(t, state.label));
            }
        }

        let best = self.crf.viterbi(&raw)?;

        if mode.is_train() {
            let labels = seq.labels();
            self.crf
                .update_bigram_transition(&labels, self.config.learning_rate)?;

            let errors = output_errors(&marginals, &labels)?;
            self.net_reset(true);
            self.learn_sequence(seq, &errors, self.config.traversal)?;
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
    }

    fn log_prob(&self) -> f64 {
        self.log_prob
    }

    fn reset_log_prob(&mut self) {
        self.log_prob = 0.0;
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.save_with(path, &self.hidden_to_output, &self.crf, self.config.crf)
    }
}

/// Point every runtime feature of `state` whose target position has already
/// been predicted at that prediction. Offsets are negative, so this only
/// ever fills during left-to-right traversal.
fn fill_runtime_features(state: &mut State, position: usize, predicted: &[Option<usize>]) {
    for i in 0..state.runtime_features.len() {
        let target = position as i64 + i64::from(state.runtime_features[i].offset);
        let label = usize::try_from(target)
            .ok()
            .and_then(|p| predicted.get(p).copied().flatten());
        if let Some(label) = label {
            state.set_runtime_feature(i, label);
        }
    }
}

fn apply_and_clear(weights: &mut [f32], grads: &mut [f32], lr: f32) {
    for (w, g) in weights.iter_mut().zip(grads.iter_mut()) {
        *w += lr * *g;
        *g = 0.0;
    }
}

pub(crate) fn expect_shape(m: &Matrix, rows: usize, cols: usize, what: &str) -> Result<()> {
    if m.rows() != rows || m.cols() != cols {
        return Err(RensaError::DimensionMismatch(format!(
            "{what} weights are {}x{}, expected {rows}x{cols}",
            m.rows(),
            m.cols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::SparseVector;

    fn state(pairs: &[(usize, f32)], label: usize) -> State {
        State::new(SparseVector::from_pairs(6, pairs.iter().copied()), vec![], label)
    }

    fn sequence() -> Sequence {
        Sequence::new(vec![
            state(&[(0, 1.0)], 0),
            state(&[(1, 1.0), (4, 0.5)], 1),
            state(&[(2, 1.0)], 2),
            state(&[(0, 1.0), (3, 1.0)], 1),
        ])
    }

    fn engine(config: RnnConfig) -> SimpleRnn {
        SimpleRnn::new(&config.with_hidden_size(5), IoDims::new(6, 0, 3)).unwrap()
    }

    #[test]
    fn outputs_are_distributions() {
        let mut rnn = engine(RnnConfig::new());
        rnn.net_reset(false);
        for s in &sequence().states {
            rnn.compute_net(s, None, false).unwrap();
            let sum: f32 = rnn.output_layer().iter().map(|o| o.cell_output).sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn raw_outputs_are_pre_softmax() {
        let mut rnn = engine(RnnConfig::new());
        rnn.net_reset(false);
        let mut raw = vec![0.0; 3];
        rnn.compute_net(&sequence().states[0], Some(&mut raw), false).unwrap();

        crate::math::softmax(&mut raw);
        for (p, o) in raw.iter().zip(rnn.output_layer()) {
            assert!((p - o.cell_output).abs() < 1e-6);
        }
    }

    #[test]
    fn decode_is_repeatable_and_read_only() {
        let mut rnn = engine(RnnConfig::new());
        let before = rnn.input_to_hidden().clone();
        let mut seq = sequence();

        let a = rnn.predict_sentence(&mut seq, RunningMode::Test).unwrap();
        let b = rnn.predict_sentence(&mut seq, RunningMode::Validate).unwrap();
        assert_eq!(a, b);
        assert_eq!(&before, rnn.input_to_hidden());
    }

    #[test]
    fn training_leaves_no_residual_gradient() {
        let mut rnn = engine(RnnConfig::new().with_bptt(2, 2));
        let mut seq = sequence();
        let before = rnn.hidden_to_hidden().clone();

        rnn.predict_sentence(&mut seq, RunningMode::Train).unwrap();

        assert!(rnn.gradients().is_zero());
        assert_ne!(&before, rnn.hidden_to_hidden());
    }

    #[test]
    fn bptt_only_touches_seen_columns() {
        let mut rnn = engine(RnnConfig::new());
        let before = rnn.input_to_hidden().clone();
        let mut seq = Sequence::new(vec![state(&[(1, 1.0)], 0)]);

        rnn.predict_sentence(&mut seq, RunningMode::Train).unwrap();

        let after = rnn.input_to_hidden();
        for b in 0..5 {
            assert_ne!(before.get(b, 1), after.get(b, 1));
            for col in [0, 2, 3, 4, 5] {
                assert_eq!(before.get(b, col), after.get(b, col));
            }
        }
    }

    #[test]
    fn masked_units_output_zero_and_pass_no_error() {
        let mut rnn = engine(RnnConfig::new().with_dropout(0.9).with_seed(3));
        rnn.net_reset(true);
        let masked: Vec<bool> = rnn.hidden_layer().iter().map(|n| n.mask).collect();
        assert!(masked.iter().any(|&m| m));

        let s = &sequence().states[0];
        rnn.compute_net(s, None, true).unwrap();
        rnn.learn_net(s, None).unwrap();
        for (n, &m) in rnn.hidden_layer().iter().zip(&masked) {
            assert_eq!(n.mask, m);
            if m {
                assert_eq!(n.cell_output, 0.0);
                assert_eq!(n.er, 0.0);
            }
        }
    }

    #[test]
    fn inference_scales_pre_activation_by_keep_rate() {
        let dropout = 0.4;
        let mut rnn = engine(RnnConfig::new().with_dropout(dropout).with_seed(11));
        let s = &sequence().states[1];

        // hidden state after a reset is 0.1 everywhere, no masks outside training
        let pre: Vec<f32> = (0..5)
            .map(|b| {
                let recurrent: f32 = rnn.hidden_to_hidden().row(b).iter().map(|w| 0.1 * w).sum();
                let row = rnn.input_to_hidden().row(b);
                recurrent + s.sparse.iter().map(|e| e.value * row[e.key]).sum::<f32>()
            })
            .collect();

        rnn.net_reset(false);
        rnn.compute_net(s, None, false).unwrap();
        for (n, p) in rnn.hidden_layer().iter().zip(&pre) {
            assert!(!n.mask);
            assert!((n.cell_output - sigmoid(p * (1.0 - dropout))).abs() < 1e-6);
        }

        rnn.net_reset(false);
        rnn.compute_net(s, None, true).unwrap();
        for (n, p) in rnn.hidden_layer().iter().zip(&pre) {
            assert!((n.cell_output - sigmoid(*p)).abs() < 1e-6);
        }
    }

    #[test]
    fn hidden_error_is_clamped() {
        let mut rnn = engine(RnnConfig::new().with_gradient_cutoff(0.01));
        rnn.net_reset(false);
        let s = &sequence().states[0];
        rnn.compute_net(s, None, true).unwrap();
        rnn.learn_net(s, Some(&[1e6, -1e6, 1e6])).unwrap();
        assert!(rnn.hidden_layer().iter().all(|n| n.er.abs() <= 0.01));
    }

    #[test]
    fn runtime_features_follow_predictions() {
        let mut rnn = engine(RnnConfig::new());
        let mut seq = sequence();
        // tag block for the previous label lives at 3..6
        let mut s = State::new(SparseVector::from_pairs(6, [(0, 1.0), (3, 0.0)]), vec![], 0);
        s.add_runtime_placeholder(-1, 1, 3);
        seq.states[1] = s;

        rnn.predict_sentence(&mut seq, RunningMode::Test).unwrap();
        let entry = seq.states[1].sparse.entries()[1];
        assert!((3..6).contains(&entry.key));
        assert_eq!(entry.value, 1.0);
    }

    #[test]
    fn inconsistent_inputs_are_rejected() {
        let mut rnn = engine(RnnConfig::new());
        rnn.net_reset(false);
        let wide = State::new(SparseVector::from_pairs(9, [(8, 1.0)]), vec![], 0);
        assert!(rnn.compute_net(&wide, None, false).is_err());

        let dense = State::new(SparseVector::new(6), vec![1.0], 0);
        assert!(rnn.compute_net(&dense, None, false).is_err());

        let mut seq = Sequence::new(vec![state(&[(0, 1.0)], 7)]);
        assert!(rnn.predict_sentence(&mut seq, RunningMode::Validate).is_err());
        // test mode never reads the label
        assert!(rnn.predict_sentence(&mut seq, RunningMode::Test).is_ok());
    }

    #[test]
    fn crf_training_updates_transitions() {
        let mut rnn = engine(RnnConfig::new().with_crf(true));
        let mut seq = sequence();

        let path = rnn.predict_sentence_crf(&mut seq, RunningMode::Train).unwrap();
        assert_eq!(path.len(), seq.len());
        assert!(!rnn.crf_layer().transitions().is_zero());
        assert!(rnn.gradients().is_zero());
        assert!(rnn.log_prob() < 0.0);
    }

    #[test]
    fn runtime_features_require_left_to_right() {
        let mut rnn = engine(RnnConfig::new().with_traversal(Traversal::RightToLeft));
        let mut seq = sequence();
        let mut s = State::new(SparseVector::from_pairs(6, [(0, 1.0), (3, 0.0)]), vec![], 0);
        s.add_runtime_placeholder(-1, 1, 3);
        seq.states[1] = s;

        assert!(matches!(
            rnn.predict_sentence(&mut seq, RunningMode::Test),
            Err(RensaError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            rnn.predict_sentence_crf(&mut seq, RunningMode::Test),
            Err(RensaError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn right_to_left_traversal_decodes_every_token() {
        let mut rnn = engine(RnnConfig::new().with_traversal(Traversal::RightToLeft));
        let mut seq = sequence();
        let raw = rnn.predict_sentence(&mut seq, RunningMode::Train).unwrap();
        assert_eq!(raw.rows(), 4);
        assert!(raw.iter_rows().all(|r| r.iter().any(|&v| v != 0.0)));
        assert!(rnn.gradients().is_zero());
    }
}
