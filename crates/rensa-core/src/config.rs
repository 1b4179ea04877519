//! # Network Configuration
//!
//! Hyper-parameters shared by the directional engine and the bidirectional
//! composer. Loadable from JSON; unspecified fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RensaError, Result};
use crate::types::Traversal;

/// Configuration for a recurrent tagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RnnConfig {
    /// Hidden layer size (`L1`).
    pub hidden_size: usize,
    /// Steps of history the truncated BPTT sweep reaches back.
    pub bptt: usize,
    /// Steps between two BPTT sweeps.
    pub bptt_block: usize,
    pub learning_rate: f32,
    /// Probability that a hidden unit is masked for one training sequence.
    pub dropout: f32,
    /// Propagated errors are clamped to `[-gradient_cutoff, gradient_cutoff]`.
    pub gradient_cutoff: f32,
    /// Train and decode through the CRF output layer.
    pub crf: bool,
    /// Seed for weight initialisation and dropout masks.
    pub seed: u64,
    /// Build a bidirectional composer instead of a single engine.
    pub bidirectional: bool,
    /// Walk order of a single engine (ignored when bidirectional).
    pub traversal: Traversal,
}

impl Default for RnnConfig {
    fn default() -> Self {
        Self {
            hidden_size: 30,
            bptt: 5,
            bptt_block: 10,
            learning_rate: 0.1,
            dropout: 0.0,
            gradient_cutoff: 15.0,
            crf: false,
            seed: 1,
            bidirectional: false,
            traversal: Traversal::LeftToRight,
        }
    }
}

impl RnnConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RensaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RensaError::Config(e.to_string()))
    }

    /// Reject settings the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(RensaError::Config("hidden_size must be positive".into()));
        }
        if self.bptt_block == 0 {
            return Err(RensaError::Config("bptt_block must be positive".into()));
        }
        if self.bptt + self.bptt_block < 3 {
            return Err(RensaError::Config(format!(
                "bptt + bptt_block must be at least 3, got {}",
                self.bptt + self.bptt_block
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(RensaError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.gradient_cutoff <= 0.0 {
            return Err(RensaError::Config("gradient_cutoff must be positive".into()));
        }
        Ok(())
    }

    /// Number of steps the BPTT history buffers hold.
    pub fn bptt_window(&self) -> usize {
        self.bptt + self.bptt_block
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_bptt(mut self, bptt: usize, block: usize) -> Self {
        self.bptt = bptt;
        self.bptt_block = block;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_gradient_cutoff(mut self, cutoff: f32) -> Self {
        self.gradient_cutoff = cutoff;
        self
    }

    pub fn with_crf(mut self, enabled: bool) -> Self {
        self.crf = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_bidirectional(mut self, enabled: bool) -> Self {
        self.bidirectional = enabled;
        self
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }
}
