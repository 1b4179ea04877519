use thiserror::Error;

/// Errors that can occur during Rensa core operations.
#[derive(Debug, Error)]
pub enum RensaError {
    /// Reading or writing a model or configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model file was written by a different network type than the one loading it.
    #[error("model type mismatch: expected {expected}, found {found}")]
    ModelTypeMismatch {
        /// The type of the engine attempting the load.
        expected: String,
        /// The type tag stored in the file header.
        found: String,
    },

    /// A header field holds a tag value this build does not know.
    #[error("unknown {what} tag in model header: {value}")]
    UnknownTag {
        /// Which header field was being decoded.
        what: &'static str,
        /// The raw value read from disk.
        value: i32,
    },

    /// Layer sizes disagree between two components that must match.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The feature context configuration is malformed.
    #[error("invalid feature configuration: {0}")]
    InvalidFeatureConfig(String),

    /// The operation is not meaningful for this kind of network.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A sequence handed to the engine is inconsistent with the model.
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// The network configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for Rensa operations.
pub type Result<T> = std::result::Result<T, RensaError>;
