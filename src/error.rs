//! Error types shared by the network engine and the feature extractor

use thiserror::Error;

/// Errors raised by glyphnet.
///
/// Configuration problems are reported when a model or extractor is built.
/// Non-convergence is never an error; it shows up in the training report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Topology is too short or contains an empty layer
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// First or last layer disagrees with the expected feature length or class count
    #[error("{layer} layer must have {expected} neurons, got {found}")]
    TopologyMismatch {
        layer: &'static str,
        expected: usize,
        found: usize,
    },

    /// Feature vector length differs from the input layer width
    #[error("Input size {found} does not match the input layer size {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Label does not name one of the output classes
    #[error("Label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    /// Training was handed a sample without a label
    #[error("Sample {index} has no label")]
    MissingLabel { index: usize },

    /// Training was handed no samples at all
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Hyperparameter or extractor setting outside its valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background training run panicked
    #[error("Training failed: {0}")]
    TrainingFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
