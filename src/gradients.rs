use crate::layer::Layer;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Summed parameter gradients for one mini-batch.
///
/// Workers each fill a private accumulator and merge it into the batch total;
/// the optimizer divides by `samples` to get the average gradient.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
    pub samples: usize,
    pub error: f32,
    pub correct: usize,
}

impl Gradients {
    pub fn zeros_like(layers: &[Layer]) -> Self {
        Gradients {
            weights: layers.iter().map(|l| Array2::zeros(l.weights.raw_dim())).collect(),
            biases: layers.iter().map(|l| Array1::zeros(l.bias.raw_dim())).collect(),
            samples: 0,
            error: 0.0,
            correct: 0,
        }
    }

    /// Adds `input ⊗ delta` to the weight gradient of `layer` and `delta` to its bias gradient
    pub fn accumulate(&mut self, layer: usize, input: ArrayView1<f32>, delta: ArrayView1<f32>) {
        let column = input.insert_axis(Axis(1));
        let row = delta.insert_axis(Axis(0));
        ndarray::linalg::general_mat_mul(1.0, &column, &row, 1.0, &mut self.weights[layer]);
        self.biases[layer] += &delta;
    }

    pub fn merge(&mut self, other: Gradients) {
        for (mine, theirs) in self.weights.iter_mut().zip(other.weights.iter()) {
            *mine += theirs;
        }
        for (mine, theirs) in self.biases.iter_mut().zip(other.biases.iter()) {
            *mine += theirs;
        }
        self.samples += other.samples;
        self.error += other.error;
        self.correct += other.correct;
    }

    pub fn clear(&mut self) {
        self.weights.iter_mut().for_each(|w| w.fill(0.0));
        self.biases.iter_mut().for_each(|b| b.fill(0.0));
        self.samples = 0;
        self.error = 0.0;
        self.correct = 0;
    }
}
