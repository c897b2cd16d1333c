use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::layer::WeightInitStrategy;
use crate::loss::Loss;
use crate::optimizer::UpdateRule;
use serde::{Deserialize, Serialize};

/// Hyperparameters for training the neural network model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Starting learning rate
    pub learning_rate: f32,

    /// Fraction of the previous step carried into the next one
    pub momentum: f32,

    /// L2 weight decay coefficient
    pub weight_decay: f32,

    /// Floor for the adaptive learning rate
    pub min_learning_rate: f32,

    /// Ceiling for the adaptive learning rate
    pub max_learning_rate: f32,

    /// Multiplier applied after an improving epoch
    pub learning_rate_growth: f32,

    /// Multiplier applied once `patience` epochs passed without improvement
    pub learning_rate_shrink: f32,

    /// Multiplier applied at the end of every epoch (1.0 disables)
    pub learning_rate_decay: f32,

    /// Relative margin the validation error must beat to count as improved
    pub improvement_margin: f32,

    /// Stale epochs before the learning rate starts shrinking
    pub patience: usize,

    /// Stale epochs before training stops early
    pub early_stopping_patience: usize,

    /// Validation accuracy that, with a low enough error, ends training
    pub target_accuracy: f32,

    /// Samples per mini-batch
    pub batch_size: usize,

    /// Share of the dataset held out for validation
    pub validation_split: f32,

    /// Iteration cap for single-sample training
    pub max_iterations: usize,

    /// Random perturbation of hidden activations during training
    pub training_noise: Option<NoiseConfig>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 0.00001,
            min_learning_rate: 0.001,
            max_learning_rate: 0.5,
            learning_rate_growth: 1.05,
            learning_rate_shrink: 0.7,
            learning_rate_decay: 0.995,
            improvement_margin: 0.005,
            patience: 5,
            early_stopping_patience: 15,
            target_accuracy: 0.95,
            batch_size: 16,
            validation_split: 0.2,
            max_iterations: 5000,
            training_noise: None,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("learning_rate", self.learning_rate),
            ("momentum", self.momentum),
            ("weight_decay", self.weight_decay),
            ("min_learning_rate", self.min_learning_rate),
            ("improvement_margin", self.improvement_margin),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(Error::InvalidConfig(format!("{name} must be a non-negative number, got {value}")));
            }
        }

        if self.min_learning_rate > self.max_learning_rate {
            return Err(Error::InvalidConfig(format!(
                "min_learning_rate {} exceeds max_learning_rate {}",
                self.min_learning_rate, self.max_learning_rate
            )));
        }
        if self.learning_rate_growth < 1.0 {
            return Err(Error::InvalidConfig("learning_rate_growth must be at least 1".into()));
        }
        for (name, value) in [
            ("learning_rate_shrink", self.learning_rate_shrink),
            ("learning_rate_decay", self.learning_rate_decay),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::InvalidConfig(format!("{name} must lie in (0, 1], got {value}")));
            }
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::InvalidConfig(format!(
                "validation_split must lie in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be positive".into()));
        }
        if let Some(noise) = &self.training_noise {
            noise.validate()?;
        }
        Ok(())
    }
}

/// Symmetric noise injected into hidden activations while training
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Chance that a given neuron is perturbed on a forward pass
    pub probability: f32,

    /// Perturbation is drawn uniformly from `[-amplitude, amplitude]`
    pub amplitude: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            probability: 0.1,
            amplitude: 0.005,
        }
    }
}

impl NoiseConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::InvalidConfig(format!(
                "noise probability must lie in [0, 1], got {}",
                self.probability
            )));
        }
        if !(self.amplitude >= 0.0 && self.amplitude.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "noise amplitude must be non-negative, got {}",
                self.amplitude
            )));
        }
        Ok(())
    }
}

/// Everything needed to build a model besides its topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Activation of the hidden layers; the output layer is always sigmoid
    pub hidden_activation: ActivationType,
    pub loss: Loss,
    pub update_rule: UpdateRule,
    pub weight_init: WeightInitStrategy,
    /// Min-max rescale each feature vector before the first layer
    pub normalize_inputs: bool,
    /// Seed for weight initialization and shuffling; `None` draws from the OS
    pub seed: Option<u64>,
    /// Required width of the input layer
    pub input_size: Option<usize>,
    /// Required width of the output layer
    pub class_count: Option<usize>,
    pub hyperparameters: Hyperparameters,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_activation: ActivationType::Sigmoid,
            loss: Loss::CrossEntropyLoss,
            update_rule: UpdateRule::Subtract,
            weight_init: WeightInitStrategy::Xavier,
            normalize_inputs: true,
            seed: None,
            input_size: None,
            class_count: None,
            hyperparameters: Hyperparameters::default(),
        }
    }
}

impl ModelConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }

    pub fn with_shape(mut self, input_size: usize, class_count: usize) -> Self {
        self.input_size = Some(input_size);
        self.class_count = Some(class_count);
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }
}
