use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Outputs are clamped into `[EPSILON, 1 - EPSILON]` before taking logarithms
pub const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Loss {
    /// Per-class binary cross-entropy summed over the output layer
    #[default]
    CrossEntropyLoss,
    /// Half the summed squared error
    MeanSquaredLoss,
}

impl Loss {
    pub fn calculate(&self, prediction: ArrayView1<f32>, target: ArrayView1<f32>) -> f32 {
        match self {
            Loss::CrossEntropyLoss => {
                // -Σ t·ln(p) + (1 - t)·ln(1 - p)
                let total = Zip::from(prediction)
                    .and(target)
                    .fold(0.0f32, |acc, &p, &t| {
                        let p = p.clamp(EPSILON, 1.0 - EPSILON);
                        acc + t * p.ln() + (1.0 - t) * (1.0 - p).ln()
                    });
                -total
            }
            Loss::MeanSquaredLoss => {
                let total = Zip::from(prediction)
                    .and(target)
                    .fold(0.0f32, |acc, &p, &t| acc + (t - p) * (t - p));
                total / 2.0
            }
        }
    }

    /// Error signal at the output pre-activations of a sigmoid output layer.
    ///
    /// For cross-entropy the sigmoid derivative cancels against the loss
    /// derivative, leaving `output - target`.
    pub fn output_delta(&self, prediction: ArrayView1<f32>, target: ArrayView1<f32>) -> Array1<f32> {
        match self {
            Loss::CrossEntropyLoss => &prediction - &target,
            Loss::MeanSquaredLoss => Zip::from(prediction)
                .and(target)
                .map_collect(|&p, &t| (p - t) * p * (1.0 - p)),
        }
    }
}
