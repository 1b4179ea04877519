//! Turns a tokenised sentence into network input.
//!
//! Sparse layout of one state, left to right:
//!
//! ```text
//! | template block per TFEATURE offset | tag block per RTFEATURE offset |
//! ```
//!
//! Each runtime block holds a single placeholder entry that the engine
//! rewrites to `block_start + predicted_label` while decoding.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{RensaError, Result};
use crate::features::config::{FeatureConfig, WeightType};
use crate::math::SparseVector;
use crate::rnn::IoDims;
use crate::types::{Sequence, State};

/// Source of sparse template feature ids for a token.
pub trait TemplateFeaturizer: Send + Sync {
    /// Number of distinct feature ids this featurizer can emit.
    fn feature_size(&self) -> usize;

    /// Feature ids for the token at `position`, each below [`feature_size`](Self::feature_size).
    fn feature_ids(&self, tokens: &[Vec<String>], position: usize) -> Vec<usize>;
}

/// Dense term vectors keyed by a token column.
pub trait WordEmbedding: Send + Sync {
    fn dimension(&self) -> usize;

    fn term_vector(&self, term: &str) -> Option<&[f32]>;

    /// Vector used for unknown terms and for context outside the sentence.
    fn unknown_vector(&self) -> &[f32];
}

/// Clamp `current` into `[lower, upper)`.
pub fn trunc_position(current: i64, lower: usize, upper: usize) -> usize {
    if current < lower as i64 {
        lower
    } else if current >= upper as i64 {
        upper.saturating_sub(1)
    } else {
        current as usize
    }
}

pub struct Featurizer {
    config: FeatureConfig,
    tag_count: usize,
    template: Option<Box<dyn TemplateFeaturizer>>,
    embedding: Option<Box<dyn WordEmbedding>>,
}

impl Featurizer {
    pub fn new(config: FeatureConfig, tag_count: usize) -> Self {
        Self {
            config,
            tag_count,
            template: None,
            embedding: None,
        }
    }

    pub fn with_template(mut self, template: Box<dyn TemplateFeaturizer>) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_embedding(mut self, embedding: Box<dyn WordEmbedding>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    fn template_block(&self) -> usize {
        self.template.as_ref().map_or(0, |t| t.feature_size())
    }

    /// `template size × |TFEATURE offsets| + tag count × |RTFEATURE offsets|`
    pub fn sparse_dimension(&self) -> usize {
        self.template_block() * self.config.tfeature_context.len()
            + self.tag_count * self.config.rtfeature_context.len()
    }

    /// `embedding dimension × |WORDEMBEDDING offsets|`
    pub fn dense_dimension(&self) -> usize {
        self.embedding
            .as_ref()
            .map_or(0, |e| e.dimension() * self.config.wordembedding_context.len())
    }

    pub fn io_dims(&self) -> IoDims {
        IoDims::new(self.sparse_dimension(), self.dense_dimension(), self.tag_count)
    }

    pub fn log_feature_sizes(&self) {
        info!(
            template = self.template_block(),
            template_context = self.template_block() * self.config.tfeature_context.len(),
            runtime = self.tag_count * self.config.rtfeature_context.len(),
            embedding = self.dense_dimension(),
            "feature sizes"
        );
    }

    /// Build one state per token. Labels are left at 0.
    pub fn extract_features(&self, tokens: &[Vec<String>]) -> Result<Sequence> {
        let n = tokens.len();
        let mut states = Vec::with_capacity(n);
        for i in 0..n {
            let mut state = self.extract_sparse(i, tokens)?;
            state.dense = self.extract_dense(i, tokens)?;
            states.push(state);
        }
        debug!(tokens = n, "extracted sentence features");
        Ok(Sequence::new(states))
    }

    fn extract_sparse(&self, current: usize, tokens: &[Vec<String>]) -> Result<State> {
        let mut features: BTreeMap<usize, f32> = BTreeMap::new();
        let mut start = 0;

        if let Some(template) = &self.template {
            let size = template.feature_size();
            for &offset in &self.config.tfeature_context {
                let position = trunc_position(current as i64 + i64::from(offset), 0, tokens.len());
                for id in template.feature_ids(tokens, position) {
                    if id >= size {
                        return Err(RensaError::DimensionMismatch(format!(
                            "template feature id {id} outside feature size {size}"
                        )));
                    }
                    match self.config.weight_type {
                        WeightType::Binary => {
                            features.insert(start + id, 1.0);
                        }
                        WeightType::Frequency => *features.entry(start + id).or_insert(0.0) += 1.0,
                    }
                }
                start += size;
            }
        }

        // placeholders sort after every template key, so the slot is the
        // number of entries inserted so far
        let mut placeholders = Vec::with_capacity(self.config.rtfeature_context.len());
        for &offset in &self.config.rtfeature_context {
            placeholders.push((offset, features.len(), start));
            features.insert(start, 0.0);
            start += self.tag_count;
        }

        let mut state = State::new(SparseVector::from_map(self.sparse_dimension(), &features), Vec::new(), 0);
        for (offset, slot, block) in placeholders {
            state.add_runtime_placeholder(offset, slot, block);
        }
        Ok(state)
    }

    fn extract_dense(&self, current: usize, tokens: &[Vec<String>]) -> Result<Vec<f32>> {
        let Some(embedding) = &self.embedding else {
            return Ok(Vec::new());
        };
        let context = &self.config.wordembedding_context;
        let n = tokens.len();

        if let [offset] = context.as_slice() {
            let position = trunc_position(current as i64 + i64::from(*offset), 0, n);
            return self.lookup(embedding.as_ref(), &tokens[position]).map(<[f32]>::to_vec);
        }

        let mut dense = Vec::with_capacity(self.dense_dimension());
        for &offset in context {
            let position = current as i64 + i64::from(offset);
            let vector = match usize::try_from(position).ok().filter(|&p| p < n) {
                Some(p) => self.lookup(embedding.as_ref(), &tokens[p])?,
                None => checked(embedding.as_ref(), embedding.unknown_vector())?,
            };
            dense.extend_from_slice(vector);
        }
        Ok(dense)
    }

    fn lookup<'e>(&self, embedding: &'e dyn WordEmbedding, token: &[String]) -> Result<&'e [f32]> {
        let column = self.config.wordembedding_column;
        let term = token.get(column).ok_or_else(|| {
            RensaError::InvalidSequence(format!(
                "token has {} columns, embedding column is {column}",
                token.len()
            ))
        })?;
        let vector = embedding
            .term_vector(term)
            .unwrap_or_else(|| embedding.unknown_vector());
        checked(embedding, vector)
    }
}

fn checked<'e>(embedding: &dyn WordEmbedding, vector: &'e [f32]) -> Result<&'e [f32]> {
    if vector.len() != embedding.dimension() {
        return Err(RensaError::DimensionMismatch(format!(
            "embedding vector has {} values, expected {}",
            vector.len(),
            embedding.dimension()
        )));
    }
    Ok(vector)
}
