//! # Viterbi Decoding for CRF
//!
//! Finds the highest-scoring label sequence given per-timestep emission
//! scores and a bigram transition matrix.

use crate::error::{RensaError, Result};
use crate::math::Matrix;

/// Viterbi decoder for CRF tag sequences.
///
/// Ties are broken towards the lowest label index, both when choosing a
/// predecessor and when choosing the final label.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `num_tags` - Number of distinct tags
    pub fn new(num_tags: usize) -> Self {
        Self { num_tags }
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emissions` - Matrix of shape `[seq_len, num_tags]` with emission scores
    /// * `transitions` - Matrix of shape `[num_tags, num_tags]`, indexed `[to][from]`
    ///
    /// # Returns
    /// The optimal tag sequence as indices.
    pub fn decode(&self, emissions: &Matrix, transitions: &Matrix) -> Result<Vec<usize>> {
        let seq_len = emissions.rows();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        // Validate dimensions
        if emissions.cols() != self.num_tags {
            return Err(RensaError::DimensionMismatch(format!(
                "emission width: expected {}, got {}",
                self.num_tags,
                emissions.cols()
            )));
        }
        if transitions.rows() != self.num_tags || transitions.cols() != self.num_tags {
            return Err(RensaError::DimensionMismatch(format!(
                "transition matrix: expected {n}x{n}, got {}x{}",
                transitions.rows(),
                transitions.cols(),
                n = self.num_tags
            )));
        }

        // DP table
        let mut dp = Matrix::zeros(seq_len, self.num_tags);
        let mut backptr = vec![vec![0usize; self.num_tags]; seq_len];

        // Initialize
        dp.row_mut(0).copy_from_slice(emissions.row(0));

        // Forward pass
        for pos in 1..seq_len {
            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    let score = dp.get(pos - 1, prev_tag) + transitions.get(curr_tag, prev_tag);
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                dp.set(pos, curr_tag, best_score + emissions.get(pos, curr_tag));
                backptr[pos][curr_tag] = best_prev;
            }
        }

        // Find best final tag
        let mut best_final_tag = 0;
        let mut best_final_score = f32::NEG_INFINITY;
        for tag in 0..self.num_tags {
            if dp.get(seq_len - 1, tag) > best_final_score {
                best_final_score = dp.get(seq_len - 1, tag);
                best_final_tag = tag;
            }
        }

        // Backtrack
        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[f32]]) -> Matrix {
        Matrix::from_fn(data.len(), data[0].len(), |r, c| data[r][c])
    }

    #[test]
    fn test_viterbi_single_step_is_argmax() {
        let decoder = ViterbiDecoder::new(3);
        let emissions = rows(&[&[0.2, 1.5, -0.3]]);
        // a transition matrix that would change the answer if it were consulted
        let transitions = rows(&[&[9.0, -9.0, 9.0], &[-9.0, -9.0, -9.0], &[9.0, 9.0, 9.0]]);

        assert_eq!(decoder.decode(&emissions, &transitions).unwrap(), vec![1]);
    }

    #[test]
    fn test_viterbi_transitions_override_emissions() {
        let decoder = ViterbiDecoder::new(2);
        // tag 1 wins step 1 by a small margin, but 0 -> 1 is heavily penalised
        let emissions = rows(&[&[2.0, 0.0], &[0.0, 0.5]]);
        let transitions = rows(&[&[0.0, 0.0], &[-5.0, 0.0]]);

        assert_eq!(decoder.decode(&emissions, &transitions).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_viterbi_ties_pick_lowest_index() {
        let decoder = ViterbiDecoder::new(3);
        let emissions = rows(&[&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0]]);
        let transitions = Matrix::zeros(3, 3);

        assert_eq!(decoder.decode(&emissions, &transitions).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_viterbi_empty() {
        let decoder = ViterbiDecoder::new(2);
        let result = decoder
            .decode(&Matrix::zeros(0, 2), &Matrix::zeros(2, 2))
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_viterbi_dimension_mismatch() {
        let decoder = ViterbiDecoder::new(2);
        assert!(decoder
            .decode(&Matrix::zeros(1, 3), &Matrix::zeros(2, 2))
            .is_err());
        assert!(decoder
            .decode(&Matrix::zeros(1, 2), &Matrix::zeros(3, 3))
            .is_err());
    }
}
