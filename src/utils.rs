use ndarray::{Array1, ArrayView1};

/// Index of the largest value.
///
/// The running maximum starts at 0 and only a strictly greater value replaces
/// it, so ties go to the lowest index and an all-zero vector yields 0.
pub fn argmax(values: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best
}

/// Min-max rescale into `[0, 1]`; a constant vector passes through unchanged.
pub fn min_max_normalize(values: &[f32]) -> Array1<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if range > 0.0 {
        values.iter().map(|&v| (v - min) / range).collect()
    } else {
        Array1::from(values.to_vec())
    }
}
