//! Either network layout behind one value, chosen from the configuration
//! when building and from the model header when loading.

use std::path::Path;

use tracing::info;

use crate::config::RnnConfig;
use crate::error::{RensaError, Result};
use crate::math::Matrix;
use crate::rnn::persist::ModelHeader;
use crate::rnn::{BiRnn, IoDims, LayerSizes, SequenceProcessor, SimpleRnn, StepwiseEngine};
use crate::types::{ModelDirection, ModelType, Neuron, RunningMode, Sequence};

pub enum Network {
    Single(SimpleRnn),
    Bidirectional(BiRnn),
}

impl Network {
    /// Build a freshly initialised network of the layout `config` asks for.
    pub fn new(config: &RnnConfig, io: IoDims) -> Result<Self> {
        if config.bidirectional {
            Ok(Network::Bidirectional(BiRnn::new(config, io)?))
        } else {
            Ok(Network::Single(SimpleRnn::new(config, io)?))
        }
    }

    /// Load whichever layout the header at `path` declares.
    pub fn load(path: &Path, config: &RnnConfig) -> Result<Self> {
        let header = ModelHeader::peek(path)?;
        if header.model_type != ModelType::Simple {
            return Err(RensaError::ModelTypeMismatch {
                expected: ModelType::Simple.to_string(),
                found: header.model_type.to_string(),
            });
        }
        info!(direction = %header.direction, crf = header.crf, "loading network");
        match header.direction {
            ModelDirection::Forward => Ok(Network::Single(SimpleRnn::load(path, config)?)),
            ModelDirection::Bidirectional => Ok(Network::Bidirectional(BiRnn::load(path, config)?)),
        }
    }

    pub fn direction(&self) -> ModelDirection {
        match self {
            Network::Single(_) => ModelDirection::Forward,
            Network::Bidirectional(_) => ModelDirection::Bidirectional,
        }
    }

    /// Hidden activations of the last processed token. A composer has no
    /// single hidden layer.
    pub fn hidden_layer(&self) -> Result<&[Neuron]> {
        match self {
            Network::Single(rnn) => Ok(rnn.hidden_layer()),
            Network::Bidirectional(_) => Err(RensaError::UnsupportedOperation(
                "hidden_layer is not defined for a bidirectional network".into(),
            )),
        }
    }

    fn inner(&self) -> &dyn SequenceProcessor {
        match self {
            Network::Single(rnn) => rnn,
            Network::Bidirectional(rnn) => rnn,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SequenceProcessor {
        match self {
            Network::Single(rnn) => rnn,
            Network::Bidirectional(rnn) => rnn,
        }
    }
}

impl SequenceProcessor for Network {
    fn predict_sentence(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Matrix> {
        self.inner_mut().predict_sentence(seq, mode)
    }

    fn predict_sentence_crf(&mut self, seq: &mut Sequence, mode: RunningMode) -> Result<Vec<usize>> {
        self.inner_mut().predict_sentence_crf(seq, mode)
    }

    fn is_crf(&self) -> bool {
        self.inner().is_crf()
    }

    fn sizes(&self) -> LayerSizes {
        self.inner().sizes()
    }

    fn learning_rate(&self) -> f32 {
        self.inner().learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.inner_mut().set_learning_rate(learning_rate);
    }

    fn log_prob(&self) -> f64 {
        self.inner().log_prob()
    }

    fn reset_log_prob(&mut self) {
        self.inner_mut().reset_log_prob();
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.inner().save(path)
    }
}
