//! Wires the core featurizer to the trainer's concrete feature sources.

use anyhow::{Context, Result};
use rensa_core::{FeatureConfig, Featurizer};
use tracing::warn;

use crate::embedding::TextEmbedding;
use crate::hasher::TokenHasher;

/// Feature configuration used when none is given.
pub const DEFAULT_FEATURES: &str = "TFEATURE_CONTEXT: -1,0,1";

/// Hashed template features over `buckets` buckets, plus the word
/// embeddings named in `config` if any.
pub fn build_featurizer(config: FeatureConfig, tag_count: usize, buckets: usize) -> Result<Featurizer> {
    if let Some(path) = &config.tfeature_filename {
        warn!(
            path = %path.display(),
            "template feature files are not read, hashed token features are used instead"
        );
    }

    let embedding = match &config.wordembedding_filename {
        Some(path) if !config.wordembedding_context.is_empty() => Some(
            TextEmbedding::load(path).with_context(|| format!("loading embeddings for {}", path.display()))?,
        ),
        _ => None,
    };

    let mut featurizer = Featurizer::new(config, tag_count);
    if !featurizer.config().tfeature_context.is_empty() {
        featurizer = featurizer.with_template(Box::new(TokenHasher::new(buckets)));
    }
    if let Some(embedding) = embedding {
        featurizer = featurizer.with_embedding(Box::new(embedding));
    }
    Ok(featurizer)
}
