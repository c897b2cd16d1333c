use serde::{Deserialize, Serialize};

/// Slope of the leaky rectifier for negative inputs
pub const LEAKY_SLOPE: f32 = 0.01;

/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationType {
    #[default]
    Sigmoid,
    LeakyReLU,
}

impl ActivationType {
    /// Applies the activation function to a given input
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            ActivationType::Sigmoid => sigmoid(x),
            ActivationType::LeakyReLU => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_SLOPE * x
                }
            }
        }
    }

    /// Computes the derivative of the activation function.
    ///
    /// The sigmoid derivative is taken from the activation `y` itself, the
    /// leaky rectifier needs the pre-activation `x`.
    pub fn derivative(&self, x: f32, y: f32) -> f32 {
        match self {
            ActivationType::Sigmoid => y * (1.0 - y),
            ActivationType::LeakyReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_SLOPE
                }
            }
        }
    }
}

/// Logistic sigmoid split on the sign of `x` so `exp` never overflows.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::EPSILON;

    #[test]
    fn test_activation_functions() {
        assert!((ActivationType::Sigmoid.apply(0.0) - 0.5).abs() < EPSILON);

        assert_eq!(ActivationType::LeakyReLU.apply(2.0), 2.0);
        assert!((ActivationType::LeakyReLU.apply(-1.0) + 0.01).abs() < EPSILON);
    }

    #[test]
    fn test_activation_derivatives() {
        let y = ActivationType::Sigmoid.apply(0.0);
        assert!((ActivationType::Sigmoid.derivative(0.0, y) - 0.25).abs() < EPSILON);

        assert_eq!(ActivationType::LeakyReLU.derivative(-1.0, -0.01), LEAKY_SLOPE);
        assert_eq!(ActivationType::LeakyReLU.derivative(2.0, 2.0), 1.0);
    }

    #[test]
    fn test_sigmoid_extremes_stay_finite() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!(sigmoid(-80.0) > 0.0);
        assert!(sigmoid(80.0).is_finite());
    }
}
