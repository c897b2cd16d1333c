use crate::error::{Error, Result};
use crate::model::Model;
use rand::seq::SliceRandom;
use rand::Rng;

/// Converts label into a vector.
/// If label is not below `bounds`, the vector is all zeroes.
pub fn one_hot_encode(label: usize, bounds: usize) -> Vec<f32> {
    (0..bounds).map(|x| if x == label { 1.0 } else { 0.0 }).collect()
}

/// One image worth of network input.
///
/// Features, label and target are fixed at construction; only the recorded
/// prediction changes, through [`Model::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    features: Vec<f32>,
    label: Option<usize>,
    target: Vec<f32>,
    pub(crate) recognized: Option<usize>,
    pub(crate) scores: Vec<f32>,
}

impl Sample {
    /// Labelled sample for training or testing
    pub fn new(features: Vec<f32>, class_count: usize, label: usize) -> Result<Self> {
        if label >= class_count {
            return Err(Error::LabelOutOfRange {
                label,
                classes: class_count,
            });
        }
        Ok(Sample {
            features,
            label: Some(label),
            target: one_hot_encode(label, class_count),
            recognized: None,
            scores: Vec::new(),
        })
    }

    /// Sample of unknown class, e.g. a camera frame awaiting recognition
    pub fn unlabeled(features: Vec<f32>, class_count: usize) -> Self {
        Sample {
            features,
            label: None,
            target: vec![0.0; class_count],
            recognized: None,
            scores: Vec::new(),
        }
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn label(&self) -> Option<usize> {
        self.label
    }

    /// One-hot training signal
    pub fn target(&self) -> &[f32] {
        &self.target
    }

    /// Class chosen by the last prediction
    pub fn recognized(&self) -> Option<usize> {
        self.recognized
    }

    /// Per-class scores from the last prediction
    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// Whether the last prediction matched the label
    pub fn is_correct(&self) -> bool {
        matches!((self.label, self.recognized), (Some(a), Some(b)) if a == b)
    }
}

/// A collection of samples, as handed over by a dataset loader
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng);
    }

    /// Fraction of labelled samples the model classifies correctly.
    ///
    /// Records each prediction on its sample. Unlabelled samples are skipped;
    /// with none labelled the accuracy is 0.
    pub fn accuracy(&mut self, model: &Model) -> Result<f32> {
        let mut labelled = 0usize;
        let mut correct = 0usize;
        for sample in self.samples.iter_mut() {
            if sample.label().is_none() {
                continue;
            }
            model.predict(sample)?;
            labelled += 1;
            if sample.is_correct() {
                correct += 1;
            }
        }
        Ok(correct as f32 / labelled.max(1) as f32)
    }
}

impl From<Vec<Sample>> for SampleSet {
    fn from(samples: Vec<Sample>) -> Self {
        SampleSet { samples }
    }
}

impl FromIterator<Sample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        SampleSet {
            samples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
