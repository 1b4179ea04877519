//! CRF decode/learn state shared by the single-direction engine and the
//! bidirectional composer.

use crate::error::{RensaError, Result};
use crate::math::activation::log_sum_exp;
use crate::math::Matrix;
use crate::crf::viterbi::ViterbiDecoder;

/// Forward-backward tables of the most recent sequence, kept for the
/// transition update.
#[derive(Debug, Clone)]
struct Lattice {
    emissions: Matrix,
    alpha: Matrix,
    beta: Matrix,
    log_z: f32,
}

/// Bigram transition weights plus the per-sequence marginals computed from them.
///
/// Transitions are indexed `[to][from]`.
#[derive(Debug, Clone)]
pub struct CrfLayer {
    transitions: Matrix,
    marginals: Matrix,
    lattice: Option<Lattice>,
}

impl CrfLayer {
    /// A layer with all-zero transition weights.
    pub fn new(num_tags: usize) -> Self {
        Self::with_transitions(Matrix::zeros(num_tags, num_tags))
    }

    pub fn with_transitions(transitions: Matrix) -> Self {
        Self {
            transitions,
            marginals: Matrix::zeros(0, 0),
            lattice: None,
        }
    }

    pub fn num_tags(&self) -> usize {
        self.transitions.rows()
    }

    pub fn transitions(&self) -> &Matrix {
        &self.transitions
    }

    pub fn set_transitions(&mut self, transitions: Matrix) {
        self.transitions = transitions;
    }

    /// Marginals from the last [`CrfLayer::forward_backward`] call, `[seq_len, num_tags]`.
    pub fn marginals(&self) -> &Matrix {
        &self.marginals
    }

    /// Compute per-timestep label marginals under the full sequence
    /// distribution defined by `emissions` and the transition weights.
    pub fn forward_backward(&mut self, emissions: &Matrix) -> Result<&Matrix> {
        let n = self.num_tags();
        if emissions.cols() != n {
            return Err(RensaError::DimensionMismatch(format!(
                "emission width {} does not match {} CRF tags",
                emissions.cols(),
                n
            )));
        }
        let seq_len = emissions.rows();
        if seq_len == 0 {
            self.marginals = Matrix::zeros(0, n);
            self.lattice = None;
            return Ok(&self.marginals);
        }

        let mut alpha = Matrix::zeros(seq_len, n);
        alpha.row_mut(0).copy_from_slice(emissions.row(0));
        for t in 1..seq_len {
            for j in 0..n {
                let incoming = log_sum_exp((0..n).map(|i| alpha.get(t - 1, i) + self.transitions.get(j, i)));
                alpha.set(t, j, incoming + emissions.get(t, j));
            }
        }

        let mut beta = Matrix::zeros(seq_len, n);
        for t in (0..seq_len - 1).rev() {
            for i in 0..n {
                let outgoing = log_sum_exp(
                    (0..n).map(|j| self.transitions.get(j, i) + emissions.get(t + 1, j) + beta.get(t + 1, j)),
                );
                beta.set(t, i, outgoing);
            }
        }

        let log_z = log_sum_exp(alpha.row(seq_len - 1).iter().copied());

        self.marginals = Matrix::from_fn(seq_len, n, |t, j| {
            (alpha.get(t, j) + beta.get(t, j) - log_z).exp()
        });
        self.lattice = Some(Lattice {
            emissions: emissions.clone(),
            alpha,
            beta,
            log_z,
        });
        Ok(&self.marginals)
    }

    /// Best label sequence for `emissions` under the current transition weights.
    pub fn viterbi(&self, emissions: &Matrix) -> Result<Vec<usize>> {
        ViterbiDecoder::new(self.num_tags()).decode(emissions, &self.transitions)
    }

    /// Move the transition weights towards the gold path: observed bigram
    /// counts minus expected bigram counts under the model, scaled by
    /// `learning_rate`. Must follow [`CrfLayer::forward_backward`] on the same
    /// sequence.
    pub fn update_bigram_transition(&mut self, labels: &[usize], learning_rate: f32) -> Result<()> {
        let n = self.num_tags();
        let lattice = self.lattice.as_ref().ok_or_else(|| {
            RensaError::InvalidSequence("transition update requested before forward-backward".into())
        })?;
        if labels.len() != lattice.alpha.rows() {
            return Err(RensaError::InvalidSequence(format!(
                "{} gold labels for a lattice of {} steps",
                labels.len(),
                lattice.alpha.rows()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n) {
            return Err(RensaError::InvalidSequence(format!(
                "label {bad} out of range for {n} tags"
            )));
        }

        let mut delta = Matrix::zeros(n, n);
        for t in 1..labels.len() {
            for to in 0..n {
                for from in 0..n {
                    let pair = lattice.alpha.get(t - 1, from)
                        + self.transitions.get(to, from)
                        + lattice.emissions.get(t, to)
                        + lattice.beta.get(t, to)
                        - lattice.log_z;
                    delta.add(to, from, -pair.exp());
                }
            }
            delta.add(labels[t], labels[t - 1], 1.0);
        }

        for to in 0..n {
            for from in 0..n {
                self.transitions.add(to, from, learning_rate * delta.get(to, from));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emissions(data: &[&[f32]]) -> Matrix {
        Matrix::from_fn(data.len(), data[0].len(), |r, c| data[r][c])
    }

    #[test]
    fn marginals_are_distributions() {
        let mut crf = CrfLayer::with_transitions(Matrix::from_fn(3, 3, |r, c| (r as f32 - c as f32) * 0.3));
        let e = emissions(&[&[0.1, 2.0, -1.0], &[1.0, 0.0, 0.5], &[-0.2, 0.3, 0.9]]);
        let marginals = crf.forward_backward(&e).unwrap();
        for row in marginals.iter_rows() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {sum}");
        }
    }

    #[test]
    fn zero_transitions_reduce_to_softmax() {
        let mut crf = CrfLayer::new(2);
        let e = emissions(&[&[1.0, 3.0], &[0.0, 0.0]]);
        let marginals = crf.forward_backward(&e).unwrap().clone();

        let mut expected = vec![1.0, 3.0];
        crate::math::softmax(&mut expected);
        assert!((marginals.get(0, 0) - expected[0]).abs() < 1e-5);
        assert!((marginals.get(1, 0) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn bigram_update_rewards_gold_transition() {
        let mut crf = CrfLayer::new(2);
        let e = emissions(&[&[0.0, 0.0], &[0.0, 0.0]]);
        crf.forward_backward(&e).unwrap();
        crf.update_bigram_transition(&[0, 1], 0.5).unwrap();

        // uniform model: every bigram expected 0.25 times, gold 0 -> 1 observed once
        assert!((crf.transitions().get(1, 0) - 0.5 * 0.75).abs() < 1e-5);
        assert!((crf.transitions().get(0, 0) + 0.5 * 0.25).abs() < 1e-5);
    }

    #[test]
    fn bigram_update_requires_lattice() {
        let mut crf = CrfLayer::new(2);
        assert!(crf.update_bigram_transition(&[0, 1], 0.1).is_err());

        crf.forward_backward(&emissions(&[&[0.0, 0.0]])).unwrap();
        assert!(crf.update_bigram_transition(&[0, 1], 0.1).is_err());
        assert!(crf.update_bigram_transition(&[7], 0.1).is_err());
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let mut crf = CrfLayer::new(3);
        assert!(crf.forward_backward(&Matrix::zeros(2, 2)).is_err());
    }
}
