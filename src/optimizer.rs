use crate::gradients::Gradients;
use crate::hyperparameters::Hyperparameters;
use crate::layer::Layer;
use serde::{Deserialize, Serialize};

/// Direction in which optimizer steps are applied to the parameters.
///
/// Both rules descend the loss: `Subtract` stores the step along the
/// gradient and subtracts it, `Add` stores the step along the negative
/// gradient and adds it. One engine uses exactly one rule for every
/// weight and bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateRule {
    #[default]
    Subtract,
    Add,
}

impl UpdateRule {
    fn sign(&self) -> f32 {
        match self {
            UpdateRule::Subtract => 1.0,
            UpdateRule::Add => -1.0,
        }
    }
}

/// Momentum SGD with L2 weight decay
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub momentum: f32,
    pub weight_decay: f32,
    pub rule: UpdateRule,
}

impl Optimizer {
    pub fn new(momentum: f32, weight_decay: f32, rule: UpdateRule) -> Self {
        Self {
            momentum,
            weight_decay,
            rule,
        }
    }

    /// Applies one update from the averaged batch gradient.
    ///
    /// Per weight: `step = lr·g + momentum·previous + lr·decay·w`; biases
    /// skip the decay term. The step is remembered for the next momentum term.
    pub fn step(&self, layers: &mut [Layer], grads: &Gradients, learning_rate: f32) {
        let batch = grads.samples.max(1) as f32;
        let sign = self.rule.sign();
        let rate = sign * learning_rate / batch;
        let decay = sign * learning_rate * self.weight_decay;

        for (layer, (weight_grad, bias_grad)) in layers
            .iter_mut()
            .zip(grads.weights.iter().zip(grads.biases.iter()))
        {
            let step = weight_grad * rate + &layer.weight_velocity * self.momentum + &layer.weights * decay;
            let bias_step = bias_grad * rate + &layer.bias_velocity * self.momentum;

            match self.rule {
                UpdateRule::Subtract => {
                    layer.weights -= &step;
                    layer.bias -= &bias_step;
                }
                UpdateRule::Add => {
                    layer.weights += &step;
                    layer.bias += &bias_step;
                }
            }

            layer.weight_velocity = step;
            layer.bias_velocity = bias_step;
        }
    }
}

/// What the schedule did with the learning rate after an epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateChange {
    Grew,
    Held,
    Shrank,
}

/// Validation-driven learning rate for one training session.
///
/// An epoch counts as an improvement when its error beats the best seen so
/// far by more than the relative margin. Improvements grow the rate,
/// `patience` epochs without one start shrinking it. The rate always stays
/// inside `[min_learning_rate, max_learning_rate]`.
#[derive(Debug, Clone)]
pub struct LearningRateSchedule {
    rate: f32,
    min: f32,
    max: f32,
    growth: f32,
    shrink: f32,
    decay: f32,
    margin: f32,
    patience: usize,
    best_error: f32,
    stale_epochs: usize,
}

impl LearningRateSchedule {
    pub fn new(hp: &Hyperparameters) -> Self {
        Self {
            rate: hp.learning_rate.clamp(hp.min_learning_rate, hp.max_learning_rate),
            min: hp.min_learning_rate,
            max: hp.max_learning_rate,
            growth: hp.learning_rate_growth,
            shrink: hp.learning_rate_shrink,
            decay: hp.learning_rate_decay,
            margin: hp.improvement_margin,
            patience: hp.patience,
            best_error: f32::INFINITY,
            stale_epochs: 0,
        }
    }

    /// Return the current learning rate.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Epochs since the last improvement
    pub fn stale_epochs(&self) -> usize {
        self.stale_epochs
    }

    pub fn best_error(&self) -> f32 {
        self.best_error
    }

    /// Feeds one epoch's validation error into the schedule
    pub fn observe(&mut self, validation_error: f32) -> RateChange {
        let change = if validation_error < self.best_error * (1.0 - self.margin) {
            self.best_error = validation_error;
            self.stale_epochs = 0;
            self.rate = (self.rate * self.growth).min(self.max);
            RateChange::Grew
        } else {
            self.stale_epochs += 1;
            if self.stale_epochs >= self.patience {
                self.rate = (self.rate * self.shrink).max(self.min);
                RateChange::Shrank
            } else {
                RateChange::Held
            }
        };
        self.rate = self.rate.clamp(self.min, self.max);
        change
    }

    /// Per-epoch multiplicative decay, floored at the minimum rate
    pub fn decay(&mut self) {
        self.rate = (self.rate * self.decay).clamp(self.min, self.max);
    }
}
