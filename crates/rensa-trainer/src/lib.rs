//! # Rensa Trainer
//!
//! Corpus loading, hashed template features and the epoch loop that trains
//! a [`rensa_core::Network`] and keeps the best model on disk.

pub mod data;
pub mod embedding;
pub mod featurizer;
pub mod hasher;
pub mod trainer;

pub use data::{build_tagset, load_corpus, read_tags, write_tags, Sentence};
pub use embedding::TextEmbedding;
pub use featurizer::{build_featurizer, DEFAULT_FEATURES};
pub use hasher::TokenHasher;
pub use trainer::{shuffle, tag_corpus, EpochStats, TrainOptions, TrainSummary, Trainer};
