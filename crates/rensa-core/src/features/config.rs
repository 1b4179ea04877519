//! # Feature Context Configuration
//!
//! A line-oriented `KEY: value` file. Blank lines and lines starting with
//! `#` are skipped.
//!
//! ```text
//! TFEATURE_CONTEXT: -2,-1,0,1,2
//! RTFEATURE_CONTEXT: -1
//! WORDEMBEDDING_CONTEXT: 0
//! WORDEMBEDDING_COLUMN: 0
//! TFEATURE_WEIGHT_TYPE: binary
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{RensaError, Result};

const TFEATURE_CONTEXT: &str = "TFEATURE_CONTEXT";
const RTFEATURE_CONTEXT: &str = "RTFEATURE_CONTEXT";
const WORDEMBEDDING_CONTEXT: &str = "WORDEMBEDDING_CONTEXT";
const TFEATURE_FILENAME: &str = "TFEATURE_FILENAME";
const WORDEMBEDDING_FILENAME: &str = "WORDEMBEDDING_FILENAME";
const WORDEMBEDDING_COLUMN: &str = "WORDEMBEDDING_COLUMN";
const TFEATURE_WEIGHT_TYPE: &str = "TFEATURE_WEIGHT_TYPE";

/// How repeated template feature ids at one token are weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WeightType {
    /// Every present feature has weight 1.
    #[default]
    Binary,
    /// Weight counts how often the id occurred.
    Frequency,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Context offsets for template features.
    pub tfeature_context: Vec<i32>,
    /// Offsets of previous-label features. All negative.
    pub rtfeature_context: Vec<i32>,
    /// Context offsets for word embeddings.
    pub wordembedding_context: Vec<i32>,
    pub tfeature_filename: Option<PathBuf>,
    pub wordembedding_filename: Option<PathBuf>,
    /// Token column looked up in the embedding table.
    pub wordembedding_column: usize,
    pub weight_type: WeightType,
}

impl FeatureConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading feature configuration");
        std::fs::read_to_string(path)?.parse()
    }

    /// Whether any previous-label features are configured.
    pub fn uses_runtime_features(&self) -> bool {
        !self.rtfeature_context.is_empty()
    }
}

impl FromStr for FeatureConfig {
    type Err = RensaError;

    fn from_str(text: &str) -> Result<Self> {
        let mut config = FeatureConfig::default();

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| {
                RensaError::InvalidFeatureConfig(format!("line {}: expected `KEY: value`, got {line:?}", n + 1))
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                TFEATURE_FILENAME => config.tfeature_filename = Some(PathBuf::from(value)),
                WORDEMBEDDING_FILENAME => config.wordembedding_filename = Some(PathBuf::from(value)),
                WORDEMBEDDING_COLUMN => {
                    config.wordembedding_column = value.parse().map_err(|_| {
                        RensaError::InvalidFeatureConfig(format!(
                            "line {}: {WORDEMBEDDING_COLUMN} must be a column index, got {value:?}",
                            n + 1
                        ))
                    })?;
                }
                TFEATURE_WEIGHT_TYPE => {
                    config.weight_type = if value.eq_ignore_ascii_case("binary") {
                        WeightType::Binary
                    } else {
                        WeightType::Frequency
                    };
                }
                TFEATURE_CONTEXT => config.tfeature_context.extend(parse_offsets(value, n)?),
                WORDEMBEDDING_CONTEXT => config.wordembedding_context.extend(parse_offsets(value, n)?),
                RTFEATURE_CONTEXT => {
                    let offsets = parse_offsets(value, n)?;
                    if let Some(bad) = offsets.iter().find(|&&o| o >= 0) {
                        return Err(RensaError::InvalidFeatureConfig(format!(
                            "line {}: run time feature offset must be negative, got {bad}",
                            n + 1
                        )));
                    }
                    config.rtfeature_context.extend(offsets);
                }
                other => warn!(key = other, "ignoring unknown feature configuration key"),
            }
        }

        Ok(config)
    }
}

fn parse_offsets(value: &str, line: usize) -> Result<Vec<i32>> {
    value
        .split(',')
        .map(|v| {
            v.trim().parse::<i32>().map_err(|_| {
                RensaError::InvalidFeatureConfig(format!("line {}: invalid context offset {v:?}", line + 1))
            })
        })
        .collect()
}
