//! # Featurization
//!
//! Configuration-driven conversion of tokenised sentences into
//! [`Sequence`](crate::types::Sequence)s: sparse template features over a
//! context window, previous-label placeholders and dense word embeddings.

pub mod config;
pub mod featurizer;

pub use config::{FeatureConfig, WeightType};
pub use featurizer::{trunc_position, Featurizer, TemplateFeaturizer, WordEmbedding};
