//! Plain-text word embeddings: one `term v1 v2 ... vN` line per term.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rensa_core::WordEmbedding;
use tracing::info;

/// Term stored as the unknown vector when present in the file.
pub const UNKNOWN_TERM: &str = "<unk>";

#[derive(Debug, Clone, Default)]
pub struct TextEmbedding {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    unknown: Vec<f32>,
}

impl TextEmbedding {
    /// Build from `(term, vector)` pairs. All vectors must share one length.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<f32>)>) -> Result<Self> {
        let mut vectors = HashMap::new();
        let mut dimension = None;
        for (term, vector) in pairs {
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    bail!("vector for {term:?} has {} values, expected {d}", vector.len())
                }
                Some(_) => {}
            }
            vectors.insert(term, vector);
        }
        let dimension = dimension.unwrap_or(0);
        let unknown = vectors
            .remove(UNKNOWN_TERM)
            .unwrap_or_else(|| vec![0.0; dimension]);
        Ok(Self {
            dimension,
            vectors,
            unknown,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening embeddings {}", path.display()))?;

        let mut pairs = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(term) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("{}:{}: invalid vector value", path.display(), n + 1))?;
            pairs.push((term.to_string(), vector));
        }

        let embedding = Self::from_pairs(pairs)?;
        info!(
            terms = embedding.vectors.len(),
            dimension = embedding.dimension,
            "loaded word embeddings"
        );
        Ok(embedding)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl WordEmbedding for TextEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn term_vector(&self, term: &str) -> Option<&[f32]> {
        self.vectors.get(term).map(Vec::as_slice)
    }

    fn unknown_vector(&self) -> &[f32] {
        &self.unknown
    }
}
