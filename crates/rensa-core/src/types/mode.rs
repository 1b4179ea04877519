use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RensaError, Result};

/// What a sequence call should do besides decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunningMode {
    /// Decode, score gold labels, and update weights.
    Train,
    /// Decode and score gold labels without touching weights.
    Validate,
    /// Decode only. Gold labels are ignored.
    Test,
}

impl RunningMode {
    pub fn is_train(self) -> bool {
        self == RunningMode::Train
    }

    /// Whether gold labels are read (for log-likelihood) in this mode.
    pub fn scores_gold(self) -> bool {
        self != RunningMode::Test
    }
}

/// Network cell type, persisted as the first header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    Simple,
    Lstm,
}

impl ModelType {
    pub fn tag(self) -> i32 {
        match self {
            ModelType::Simple => 0,
            ModelType::Lstm => 1,
        }
    }

    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(ModelType::Simple),
            1 => Ok(ModelType::Lstm),
            value => Err(RensaError::UnknownTag {
                what: "model type",
                value,
            }),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Simple => write!(f, "SIMPLE"),
            ModelType::Lstm => write!(f, "LSTM"),
        }
    }
}

/// Network layout, persisted as the second header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelDirection {
    Forward,
    Bidirectional,
}

impl ModelDirection {
    pub fn tag(self) -> i32 {
        match self {
            ModelDirection::Forward => 0,
            ModelDirection::Bidirectional => 1,
        }
    }

    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(ModelDirection::Forward),
            1 => Ok(ModelDirection::Bidirectional),
            value => Err(RensaError::UnknownTag {
                what: "model direction",
                value,
            }),
        }
    }
}

impl fmt::Display for ModelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelDirection::Forward => write!(f, "forward"),
            ModelDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Order in which a single-direction engine walks a sequence on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl Traversal {
    /// Timestep indices in visiting order.
    pub fn order(self, len: usize) -> Box<dyn Iterator<Item = usize>> {
        match self {
            Traversal::LeftToRight => Box::new(0..len),
            Traversal::RightToLeft => Box::new((0..len).rev()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_tags_roundtrip() {
        for t in [ModelType::Simple, ModelType::Lstm] {
            assert_eq!(ModelType::from_tag(t.tag()).unwrap(), t);
        }
        for d in [ModelDirection::Forward, ModelDirection::Bidirectional] {
            assert_eq!(ModelDirection::from_tag(d.tag()).unwrap(), d);
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(matches!(
            ModelType::from_tag(9),
            Err(RensaError::UnknownTag { value: 9, .. })
        ));
        assert!(ModelDirection::from_tag(-1).is_err());
    }

    #[test]
    fn traversal_order() {
        let fwd: Vec<usize> = Traversal::LeftToRight.order(3).collect();
        let bwd: Vec<usize> = Traversal::RightToLeft.order(3).collect();
        assert_eq!(fwd, vec![0, 1, 2]);
        assert_eq!(bwd, vec![2, 1, 0]);
    }

    #[test]
    fn modes() {
        assert!(RunningMode::Train.is_train());
        assert!(RunningMode::Validate.scores_gold());
        assert!(!RunningMode::Test.scores_gold());
    }
}
