//! Epoch loop with learning-rate halving and early stopping.

use std::path::PathBuf;

use anyhow::{Context, Result};
use oorandom::Rand64;
use rensa_core::rnn::persist::suffixed;
use rensa_core::{Featurizer, Network, RunningMode, SequenceProcessor, Sequence, TagSet};
use tracing::{debug, info, warn};

use crate::data::{write_tags, Sentence};

/// Token-level statistics of one pass over a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    /// Sum of `log10 p(gold)` over all tokens.
    pub log_prob: f64,
    pub tokens: usize,
    pub errors: usize,
}

impl EpochStats {
    pub fn perplexity(&self) -> f64 {
        if self.tokens == 0 {
            return f64::INFINITY;
        }
        10f64.powf(-self.log_prob / self.tokens as f64)
    }

    pub fn error_rate(&self) -> f64 {
        if self.tokens == 0 {
            return 0.0;
        }
        self.errors as f64 / self.tokens as f64
    }
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub max_epochs: usize,
    /// Where the best model is written. The tag set goes next to it with a
    /// `.tags` suffix.
    pub model_path: PathBuf,
    /// Seed for the per-epoch shuffle.
    pub shuffle_seed: u64,
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub epochs: usize,
    pub best_error_rate: f64,
    pub final_learning_rate: f32,
}

pub struct Trainer {
    network: Network,
    featurizer: Featurizer,
    tags: TagSet,
    options: TrainOptions,
}

impl Trainer {
    pub fn new(network: Network, featurizer: Featurizer, tags: TagSet, options: TrainOptions) -> Self {
        Self {
            network,
            featurizer,
            tags,
            options,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    fn featurize(&self, sentences: &[Sentence]) -> Result<Vec<Sequence>> {
        sentences
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_sequence(&self.featurizer, &self.tags))
            .collect()
    }

    /// Run every sequence once in `mode`, comparing predictions to gold labels.
    pub fn run_pass(&mut self, sequences: &mut [Sequence], order: &[usize], mode: RunningMode) -> Result<EpochStats> {
        self.network.reset_log_prob();
        let mut stats = EpochStats::default();

        for (done, &i) in order.iter().enumerate() {
            let seq = &mut sequences[i];
            let predicted = self.network.tag(seq, mode)?;
            stats.tokens += seq.len();
            stats.errors += predicted
                .iter()
                .zip(seq.states.iter())
                .filter(|(p, s)| **p != s.label)
                .count();

            if (done + 1) % 1000 == 0 {
                debug!(
                    sentences = done + 1,
                    error_rate = stats.errors as f64 / stats.tokens.max(1) as f64,
                    "progress"
                );
            }
        }

        stats.log_prob = self.network.log_prob();
        Ok(stats)
    }

    /// Train until `max_epochs` or until validation stops improving after
    /// the learning rate has already been halved once.
    pub fn train(&mut self, train: &[Sentence], valid: &[Sentence]) -> Result<TrainSummary> {
        let mut train_seqs = self.featurize(train).context("featurizing training corpus")?;
        let mut valid_seqs = self.featurize(valid).context("featurizing validation corpus")?;
        if valid_seqs.is_empty() {
            warn!("no validation sentences, model selection uses the training error");
        }
        info!(
            train = train_seqs.len(),
            valid = valid_seqs.len(),
            tags = self.tags.len(),
            "starting training"
        );
        self.featurizer.log_feature_sizes();

        let mut rng = Rand64::new(u128::from(self.options.shuffle_seed));
        let mut order: Vec<usize> = (0..train_seqs.len()).collect();
        let valid_order: Vec<usize> = (0..valid_seqs.len()).collect();

        let mut best = f64::INFINITY;
        let mut halved = false;
        let mut epochs = 0;

        for epoch in 1..=self.options.max_epochs {
            epochs = epoch;
            shuffle(&mut order, &mut rng);

            let stats = self.run_pass(&mut train_seqs, &order, RunningMode::Train)?;
            info!(
                epoch,
                lr = self.network.learning_rate(),
                logp = stats.log_prob,
                ppl = stats.perplexity(),
                error = stats.error_rate(),
                "training epoch done"
            );

            let score = if valid_seqs.is_empty() {
                stats.error_rate()
            } else {
                let v = self.run_pass(&mut valid_seqs, &valid_order, RunningMode::Validate)?;
                info!(
                    epoch,
                    logp = v.log_prob,
                    ppl = v.perplexity(),
                    error = v.error_rate(),
                    "validation"
                );
                v.error_rate()
            };

            if score < best {
                best = score;
                self.save()?;
                continue;
            }

            if halved {
                info!(epoch, "validation did not improve after halving the learning rate, stopping");
                break;
            }
            let lr = self.network.learning_rate() / 2.0;
            info!(epoch, lr, "validation did not improve, halving the learning rate");
            self.network.set_learning_rate(lr);
            halved = true;
        }

        Ok(TrainSummary {
            epochs,
            best_error_rate: best,
            final_learning_rate: self.network.learning_rate(),
        })
    }

    fn save(&self) -> Result<()> {
        let path = &self.options.model_path;
        self.network
            .save(path)
            .with_context(|| format!("saving model to {}", path.display()))?;
        write_tags(suffixed(path, ".tags"), &self.tags)?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }
}

/// Fisher-Yates shuffle driven by `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

/// Predicted tag names for every token of `sentences`.
pub fn tag_corpus(
    network: &mut Network,
    featurizer: &Featurizer,
    tags: &TagSet,
    sentences: &[Sentence],
) -> Result<Vec<Vec<String>>> {
    let mut out = Vec::with_capacity(sentences.len());
    for sentence in sentences {
        let mut seq = featurizer.extract_features(&sentence.tokens)?;
        let predicted = network.tag(&mut seq, RunningMode::Test)?;
        let names = predicted
            .into_iter()
            .map(|i| {
                tags.name(i)
                    .map(str::to_string)
                    .with_context(|| format!("model predicted tag {i} outside the tag set"))
            })
            .collect::<Result<Vec<_>>>()?;
        out.push(names);
    }
    Ok(out)
}
