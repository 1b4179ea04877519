//! Rensa sequence labeller CLI
//!
//! Trains a recurrent tagger on a column-format corpus and tags new text
//! with a saved model.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rensa_core::rnn::persist::suffixed;
use rensa_core::{FeatureConfig, Network, RnnConfig, SequenceProcessor};
use rensa_trainer::{
    build_featurizer, build_tagset, load_corpus, read_tags, tag_corpus, TrainOptions, Trainer, DEFAULT_FEATURES,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rensa-train")]
#[command(about = "Train and run recurrent sequence labellers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Feature extraction settings shared by training and tagging.
#[derive(clap::Args)]
struct FeatureArgs {
    /// Feature context configuration file
    #[arg(short, long)]
    features: Option<PathBuf>,

    /// Hash buckets for template features
    #[arg(long, default_value_t = 1 << 18)]
    buckets: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a labelled corpus
    Train {
        /// Training corpus
        #[arg(short, long)]
        train: PathBuf,

        /// Validation corpus
        #[arg(short, long)]
        valid: Option<PathBuf>,

        /// Output model file
        #[arg(short, long)]
        model: PathBuf,

        /// JSON network configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        features: FeatureArgs,

        /// Hidden layer size
        #[arg(long)]
        hidden: Option<usize>,

        /// BPTT history length
        #[arg(long)]
        bptt: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f32>,

        #[arg(long)]
        dropout: Option<f32>,

        /// Train with the CRF output layer
        #[arg(long)]
        crf: bool,

        /// Train a bidirectional network
        #[arg(long)]
        bidirectional: bool,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 20)]
        max_epochs: usize,
    },
    /// Tag a corpus with a trained model, one tag per line
    Tag {
        /// Model file written by `train`
        #[arg(short, long)]
        model: PathBuf,

        /// Corpus to tag (feature columns only)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file; stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        features: FeatureArgs,
    },
}

fn feature_config(path: Option<&Path>) -> Result<FeatureConfig> {
    match path {
        Some(path) => FeatureConfig::from_file(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(DEFAULT_FEATURES.parse()?),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            train,
            valid,
            model,
            config,
            features,
            hidden,
            bptt,
            learning_rate,
            dropout,
            crf,
            bidirectional,
            seed,
            max_epochs,
        } => {
            let mut rnn = match &config {
                Some(path) => RnnConfig::from_json_file(path)
                    .with_context(|| format!("reading network configuration {}", path.display()))?,
                None => RnnConfig::new(),
            };
            if let Some(hidden) = hidden {
                rnn.hidden_size = hidden;
            }
            if let Some(bptt) = bptt {
                rnn.bptt = bptt;
            }
            if let Some(lr) = learning_rate {
                rnn.learning_rate = lr;
            }
            if let Some(dropout) = dropout {
                rnn.dropout = dropout;
            }
            if let Some(seed) = seed {
                rnn.seed = seed;
            }
            rnn.crf |= crf;
            rnn.bidirectional |= bidirectional;
            rnn.validate()?;

            let train_corpus = load_corpus(&train, true)?;
            let valid_corpus = match &valid {
                Some(path) => load_corpus(path, true)?,
                None => Vec::new(),
            };
            let tags = build_tagset(&train_corpus);
            info!(sentences = train_corpus.len(), tags = %tags, "loaded training corpus");

            let featurizer = build_featurizer(
                feature_config(features.features.as_deref())?,
                tags.len(),
                features.buckets,
            )?;
            let network = Network::new(&rnn, featurizer.io_dims())?;

            let mut trainer = Trainer::new(
                network,
                featurizer,
                tags,
                TrainOptions {
                    max_epochs,
                    model_path: model,
                    shuffle_seed: rnn.seed,
                },
            );
            let summary = trainer.train(&train_corpus, &valid_corpus)?;
            info!(
                epochs = summary.epochs,
                best_error = summary.best_error_rate,
                final_lr = summary.final_learning_rate,
                "training finished"
            );
        }
        Commands::Tag {
            model,
            input,
            output,
            features,
        } => {
            let tags = read_tags(suffixed(&model, ".tags"))?;
            let mut network = Network::load(&model, &RnnConfig::new())
                .with_context(|| format!("loading model {}", model.display()))?;
            let featurizer = build_featurizer(
                feature_config(features.features.as_deref())?,
                tags.len(),
                features.buckets,
            )?;
            if featurizer.io_dims() != network.sizes().io() {
                anyhow::bail!(
                    "feature settings produce {:?} but the model expects {:?}",
                    featurizer.io_dims(),
                    network.sizes().io()
                );
            }

            let sentences = load_corpus(&input, false)?;
            let tagged = tag_corpus(&mut network, &featurizer, &tags, &sentences)?;

            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            for (sentence, labels) in sentences.iter().zip(&tagged) {
                for (token, label) in sentence.tokens.iter().zip(labels) {
                    writeln!(out, "{}\t{label}", token.join("\t"))?;
                }
                writeln!(out)?;
            }
            out.flush()?;
            info!(sentences = sentences.len(), "tagging finished");
        }
    }

    Ok(())
}
