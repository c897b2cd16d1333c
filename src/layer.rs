use crate::activation::ActivationType;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Biases start uniformly inside `[-BIAS_RANGE, BIAS_RANGE]`
const BIAS_RANGE: f32 = 0.1;

/// Represents a fully connected layer in the neural network.
///
/// `weights` has shape `(inputs, neurons)`: row `j` holds the outgoing
/// weights of input `j`. The velocity arrays hold the previous optimizer step
/// for the momentum term and never leave the engine.
#[derive(Debug, Clone)]
pub struct Layer {
    pub neurons: usize,
    pub inputs: usize,
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: ActivationType,
    pub(crate) weight_velocity: Array2<f32>,
    pub(crate) bias_velocity: Array1<f32>,
}

/// Output of one layer for one input vector
#[derive(Debug, Clone)]
pub struct LayerOutput {
    pub preactivation: Array1<f32>,
    pub activation: Array1<f32>,
}

impl Layer {
    /// Constructs a new layer with specified configuration
    ///
    /// # Arguments
    ///
    /// * `inputs` - Number of inputs to this layer
    /// * `neurons` - Number of neurons in this layer
    /// * `activation` - Activation function type for the layer
    /// * `weight_init` - Weight initialization strategy
    /// * `rng` - Generator owned by the model
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        neurons: usize,
        activation: ActivationType,
        weight_init: WeightInitStrategy,
        rng: &mut R,
    ) -> Self {
        let mut layer = Layer {
            neurons,
            inputs,
            weights: Array2::zeros((inputs, neurons)),
            bias: Array1::zeros(neurons),
            activation,
            weight_velocity: Array2::zeros((inputs, neurons)),
            bias_velocity: Array1::zeros(neurons),
        };
        layer.initialize_weights(weight_init, rng);
        layer
    }

    /// Redraws weights and biases and clears the momentum state
    pub fn initialize_weights<R: Rng + ?Sized>(&mut self, strategy: WeightInitStrategy, rng: &mut R) {
        let fan_in = self.inputs.max(1) as f32;
        let fan_out = self.neurons as f32;
        let shape = (self.inputs, self.neurons);

        self.weights = match strategy {
            WeightInitStrategy::Random => {
                Array2::from_shape_fn(shape, |_| rng.random_range(-1.0..=1.0))
            }
            WeightInitStrategy::Xavier => {
                let scale = (2.0 / (fan_in + fan_out)).sqrt();
                Array2::from_shape_fn(shape, |_| rng.random_range(-1.0f32..=1.0) * scale)
            }
            WeightInitStrategy::HeNormal => {
                let std_dev = (2.0 / fan_in).sqrt();
                Array2::from_shape_fn(shape, |_| {
                    let z: f32 = rng.sample(StandardNormal);
                    z * std_dev
                })
            }
        };

        self.bias = Array1::from_shape_fn(self.neurons, |_| rng.random_range(-BIAS_RANGE..=BIAS_RANGE));
        self.weight_velocity.fill(0.0);
        self.bias_velocity.fill(0.0);
    }

    /// Forward propagation through the layer
    ///
    /// # Arguments
    ///
    /// * `input` - Input vector to the layer
    ///
    /// # Returns
    ///
    /// Weighted sums and their activations
    pub fn forward_propagate(&self, input: ArrayView1<f32>) -> LayerOutput {
        assert_eq!(input.len(), self.inputs, "Input size does not match layer's input size");

        let preactivation = input.dot(&self.weights) + &self.bias;
        let activation = preactivation.mapv(|x| self.activation.apply(x));

        LayerOutput {
            preactivation,
            activation,
        }
    }

    /// Error signal pushed back to this layer's inputs, before the input
    /// layer's own activation derivative is applied
    pub fn backpropagate(&self, delta: ArrayView1<f32>) -> Array1<f32> {
        self.weights.dot(&delta)
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightInitStrategy {
    /// Uniform random initialization between -1 and 1
    Random,

    /// Uniform draw scaled by `sqrt(2 / (fan_in + fan_out))`
    #[default]
    Xavier,

    /// He initialization (good for ReLU networks)
    HeNormal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new(6, 2, ActivationType::Sigmoid, WeightInitStrategy::Xavier, &mut rng);
        let scale = (2.0f32 / 8.0).sqrt();

        assert!(layer.weights.iter().all(|w| w.abs() <= scale));
        assert!(layer.bias.iter().all(|b| b.abs() <= BIAS_RANGE));
    }

    #[test]
    fn test_forward_with_known_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = Layer::new(2, 1, ActivationType::LeakyReLU, WeightInitStrategy::Random, &mut rng);
        layer.weights = array![[1.0], [-2.0]];
        layer.bias = array![0.5];

        let out = layer.forward_propagate(array![1.0, 1.0].view());
        assert_eq!(out.preactivation, array![-0.5]);
        assert!((out.activation[0] + 0.005).abs() < 1e-7);
    }

    #[test]
    fn test_backpropagate_uses_transposed_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = Layer::new(2, 2, ActivationType::Sigmoid, WeightInitStrategy::Random, &mut rng);
        layer.weights = array![[1.0, 2.0], [3.0, 4.0]];

        assert_eq!(layer.backpropagate(array![1.0, 1.0].view()), array![3.0, 7.0]);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = Layer::new(4, 3, ActivationType::Sigmoid, WeightInitStrategy::HeNormal, &mut StdRng::seed_from_u64(3));
        let b = Layer::new(4, 3, ActivationType::Sigmoid, WeightInitStrategy::HeNormal, &mut StdRng::seed_from_u64(3));
        assert_eq!(a.weights, b.weights);
    }
}
