//! # Rensa Core
//!
//! Recurrent sequence labelling: a sigmoid RNN trained with truncated
//! backpropagation through time, a bidirectional composer over two such
//! engines, and an optional linear-chain CRF output layer.
//!
//! ## Quick Start
//!
//! ```rust
//! use rensa_core::math::SparseVector;
//! use rensa_core::rnn::{IoDims, Network, SequenceProcessor};
//! use rensa_core::types::{RunningMode, Sequence, State};
//! use rensa_core::RnnConfig;
//!
//! let config = RnnConfig::new().with_hidden_size(8).with_bidirectional(true);
//! let mut net = Network::new(&config, IoDims::new(4, 0, 3)).unwrap();
//!
//! let mut seq = Sequence::new(vec![
//!     State::new(SparseVector::from_pairs(4, [(0, 1.0)]), vec![], 2),
//!     State::new(SparseVector::from_pairs(4, [(1, 1.0), (3, 1.0)]), vec![], 0),
//! ]);
//! net.predict_sentence(&mut seq, RunningMode::Train).unwrap();
//! let tags = net.tag(&mut seq, RunningMode::Test).unwrap();
//! assert_eq!(tags.len(), 2);
//! ```
pub mod config;
pub mod crf;
pub mod error;
pub mod features;
pub mod math;
pub mod rnn;
pub mod types;

// Re-export primary API
pub use config::RnnConfig;
pub use error::{RensaError, Result};
pub use features::{FeatureConfig, Featurizer, TemplateFeaturizer, WordEmbedding};
pub use rnn::{BiRnn, IoDims, Network, SequenceProcessor, SimpleRnn, StepwiseEngine};
pub use types::{RunningMode, Sequence, State, TagSet};
