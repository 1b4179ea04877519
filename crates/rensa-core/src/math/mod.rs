//! # Numeric Primitives
//!
//! Dense matrices, sparse feature vectors, activation functions and the
//! seeded weight initialiser shared by every network.

pub mod activation;
pub mod matrix;
pub mod sparse;

pub use activation::{sigmoid, softmax};
pub use matrix::Matrix;
pub use sparse::{SparseEntry, SparseVector};

/// Uniform draw in `[min, max)`.
pub fn random_range(rng: &mut oorandom::Rand64, min: f32, max: f32) -> f32 {
    min + rng.rand_float() as f32 * (max - min)
}

/// Initial value for a single weight: the sum of three uniform draws in
/// `[-0.1, 0.1]`, which concentrates mass near zero.
pub fn rand_init_weight(rng: &mut oorandom::Rand64) -> f32 {
    random_range(rng, -0.1, 0.1) + random_range(rng, -0.1, 0.1) + random_range(rng, -0.1, 0.1)
}

/// A matrix of freshly initialised weights.
pub fn random_matrix(rows: usize, cols: usize, rng: &mut oorandom::Rand64) -> Matrix {
    Matrix::from_fn(rows, cols, |_, _| rand_init_weight(rng))
}
