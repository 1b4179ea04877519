//! Column-format corpora.
//!
//! One token per line, columns separated by whitespace, the last column is
//! the gold tag. A blank line ends a sentence.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rensa_core::{Featurizer, Sequence, TagSet};

/// One sentence: feature columns per token and, for labelled corpora, the
/// gold tag of each token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    pub tokens: Vec<Vec<String>>,
    pub labels: Vec<String>,
}

impl Sentence {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Features for every token, gold labels filled from `tags`.
    pub fn to_sequence(&self, featurizer: &Featurizer, tags: &TagSet) -> Result<Sequence> {
        let mut seq = featurizer.extract_features(&self.tokens)?;
        for (state, label) in seq.states.iter_mut().zip(&self.labels) {
            state.label = tags.require(label)?;
        }
        Ok(seq)
    }
}

/// Load a corpus. With `labelled` the last column of every line is taken
/// as the gold tag.
pub fn load_corpus<P: AsRef<Path>>(path: P, labelled: bool) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening corpus {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }

        let mut columns: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if labelled {
            if columns.len() < 2 {
                bail!(
                    "{}:{}: expected feature columns followed by a tag, got {line:?}",
                    path.display(),
                    n + 1
                );
            }
            if let Some(label) = columns.pop() {
                current.labels.push(label);
            }
        }
        current.tokens.push(columns);
    }

    // Don't forget the last sentence
    if !current.is_empty() {
        sentences.push(current);
    }

    Ok(sentences)
}

/// Every tag seen in `sentences`, in first-seen order.
pub fn build_tagset(sentences: &[Sentence]) -> TagSet {
    TagSet::from_names(sentences.iter().flat_map(|s| s.labels.iter().cloned()))
}

/// One tag name per line.
pub fn write_tags<P: AsRef<Path>>(path: P, tags: &TagSet) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    for name in tags.names() {
        writeln!(w, "{name}")?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_tags<P: AsRef<Path>>(path: P) -> Result<TagSet> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading tag set {}", path.display()))?;
    let tags = TagSet::from_names(text.lines().map(str::trim).filter(|l| !l.is_empty()));
    if tags.is_empty() {
        bail!("tag set {} is empty", path.display());
    }
    Ok(tags)
}
