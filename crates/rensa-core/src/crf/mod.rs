//! # Linear-Chain CRF Output Layer
//!
//! Bigram transition weights over the tag set, forward-backward marginals,
//! Viterbi decoding and the transition update used during CRF training.

pub mod layer;
pub mod viterbi;

pub use crate::math::softmax;
pub use layer::CrfLayer;
pub use viterbi::ViterbiDecoder;
