mod activation;
mod background;
mod error;
mod gradients;
mod hyperparameters;
mod layer;
mod loss;
mod model;
mod optimizer;
mod sample;
mod training;
mod utils;

pub mod features;
pub mod figures;

pub use activation::ActivationType;
pub use background::{spawn_training, TrainingHandle};
pub use error::{Error, Result};
pub use gradients::Gradients;
pub use features::{FeatureConfig, FeatureExtractor, InkMask, ProjectionExtractor};
pub use figures::{FigureGenerator, FigureType};
pub use hyperparameters::{Hyperparameters, ModelConfig, NoiseConfig};
pub use layer::{Layer, LayerOutput, WeightInitStrategy};
pub use loss::Loss;
pub use model::Model;
pub use optimizer::{LearningRateSchedule, Optimizer, RateChange, UpdateRule};
pub use sample::{one_hot_encode, Sample, SampleSet};
pub use training::{EpochStats, Progress, SessionState, StopReason, TrainingPlan, TrainingReport, TrainingSession};
