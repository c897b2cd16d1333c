//! Synthetic outline figures for exercising the recognizer without a dataset

use std::f64::consts::PI;

use image::{GrayImage, Luma};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::{FeatureExtractor, InkMask};
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FigureType {
    Triangle,
    Rectangle,
    Circle,
    Sinusoid,
}

impl FigureType {
    pub const ALL: [FigureType; 4] = [
        FigureType::Triangle,
        FigureType::Rectangle,
        FigureType::Circle,
        FigureType::Sinusoid,
    ];

    /// Class index used as the sample label
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<FigureType> {
        Self::ALL.get(index).copied()
    }
}

/// Draws jittered figure outlines on a square boolean canvas
#[derive(Debug, Clone)]
pub struct FigureGenerator {
    rng: StdRng,
    canvas: usize,
    /// Nominal figure extent in pixels
    pub size: i64,
    /// Spread of each corner around its nominal position
    pub size_jitter: i64,
    /// Spread of the centre and the triangle apex
    pub center_jitter: i64,
}

impl FigureGenerator {
    pub fn new(seed: u64) -> Self {
        FigureGenerator {
            rng: StdRng::seed_from_u64(seed),
            canvas: 200,
            size: 100,
            size_jitter: 50,
            center_jitter: 50,
        }
    }

    pub fn generate(&mut self, figure: FigureType) -> InkMask {
        let mut canvas = Canvas::new(self.canvas);
        match figure {
            FigureType::Triangle => self.triangle(&mut canvas),
            FigureType::Rectangle => self.rectangle(&mut canvas),
            FigureType::Circle => self.circle(&mut canvas),
            FigureType::Sinusoid => self.sinusoid(&mut canvas),
        }
        InkMask::from_array(canvas.ink)
    }

    /// Draws one of the first `kinds` figure types, picked uniformly
    pub fn generate_random(&mut self, kinds: usize) -> (FigureType, InkMask) {
        let kinds = kinds.clamp(1, FigureType::ALL.len());
        let figure = FigureType::ALL[self.rng.random_range(0..kinds)];
        (figure, self.generate(figure))
    }

    /// Labelled sample of `figure` run through `extractor`
    pub fn sample(&mut self, figure: FigureType, extractor: &FeatureExtractor) -> Result<Sample> {
        let image = render(&self.generate(figure));
        Sample::new(extractor.extract_gray(&image), FigureType::ALL.len(), figure.index())
    }

    fn jitter(&mut self, spread: i64) -> i64 {
        let half = spread / 2;
        if half == 0 {
            0
        } else {
            self.rng.random_range(-half..half)
        }
    }

    fn corner(&mut self, sign: i64) -> (i64, i64) {
        let mid = self.canvas as i64 / 2;
        let x = mid + sign * self.size / 2 + self.jitter(self.size_jitter);
        let y = mid + sign * self.size / 2 + self.jitter(self.size_jitter);
        (x, y)
    }

    fn triangle(&mut self, canvas: &mut Canvas) {
        let (left, top) = self.corner(-1);
        let (right, bottom) = self.corner(1);
        let apex = self.canvas as i64 / 2 + self.jitter(self.center_jitter);

        canvas.line(left, bottom, apex, top);
        canvas.line(apex, top, right, bottom);
        canvas.line(right, bottom, left, bottom);
    }

    fn rectangle(&mut self, canvas: &mut Canvas) {
        let (left, top) = self.corner(-1);
        let (right, bottom) = self.corner(1);

        canvas.line(left, top, right, top);
        canvas.line(right, top, right, bottom);
        canvas.line(right, bottom, left, bottom);
        canvas.line(left, bottom, left, top);
    }

    fn circle(&mut self, canvas: &mut Canvas) {
        let mid = self.canvas as i64 / 2;
        let cx = (mid + self.jitter(self.size_jitter)) as f64;
        let cy = (mid + self.jitter(self.size_jitter)) as f64;
        let radius = self.rng.random_range(50..65) as f64;

        let mut t = 0.0f64;
        while t < 2.0 * PI {
            canvas.plot((cx + radius * t.cos()) as i64, (cy + radius * t.sin()) as i64);
            t += 0.01;
        }
    }

    fn sinusoid(&mut self, canvas: &mut Canvas) {
        let (left, top) = self.corner(-1);
        let (right, bottom) = self.corner(1);
        let amplitude = ((bottom - top) / 2) as f64;
        let center = top as f64 + amplitude;

        let mut x = left as f64;
        while x <= right as f64 {
            let y = (center + amplitude * (0.25 * x).sin()).round();
            canvas.plot(x as i64, y as i64);
            x += 0.05;
        }
    }
}

/// Ink as black on a white background
pub fn render(mask: &InkMask) -> GrayImage {
    GrayImage::from_fn(mask.width() as u32, mask.height() as u32, |x, y| {
        Luma([if mask.is_ink(x as usize, y as usize) { 0 } else { 255 }])
    })
}

struct Canvas {
    ink: Array2<bool>,
    size: i64,
}

impl Canvas {
    fn new(size: usize) -> Self {
        Canvas {
            ink: Array2::from_elem((size, size), false),
            size: size as i64,
        }
    }

    /// Points outside the canvas are clamped onto its border
    fn plot(&mut self, x: i64, y: i64) {
        let x = x.clamp(0, self.size - 1) as usize;
        let y = y.clamp(0, self.size - 1) as usize;
        self.ink[[y, x]] = true;
    }

    /// Bresenham line, both ends included
    fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = ((x1 - x0).signum(), (y1 - y0).signum());
        let (mut x, mut y) = (x0, y0);
        let mut err = dx + dy;

        loop {
            self.plot(x, y);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_figures() {
        let mut a = FigureGenerator::new(3);
        let mut b = FigureGenerator::new(3);
        for figure in FigureType::ALL {
            assert_eq!(a.generate(figure), b.generate(figure));
        }
    }

    #[test]
    fn test_random_figures_stay_within_kinds() {
        for kinds in 1..=FigureType::ALL.len() {
            let mut a = FigureGenerator::new(17);
            let mut b = FigureGenerator::new(17);
            for _ in 0..20 {
                let (figure, mask) = a.generate_random(kinds);
                assert!(figure.index() < kinds, "{figure:?} drawn with kinds {kinds}");
                assert_eq!((figure, mask), b.generate_random(kinds));
            }
        }

        let mut generator = FigureGenerator::new(5);
        assert!((0..10).all(|_| generator.generate_random(0).0 == FigureType::Triangle));
        let drawn: Vec<FigureType> = (0..200).map(|_| generator.generate_random(99).0).collect();
        assert!(FigureType::ALL.iter().all(|f| drawn.contains(f)));
    }

    #[test]
    fn test_line_is_connected() {
        let mut canvas = Canvas::new(20);
        canvas.line(2, 3, 15, 9);
        let mask = InkMask::from_array(canvas.ink);

        assert!(mask.is_ink(2, 3) && mask.is_ink(15, 9));
        // One pixel per step along the major axis
        assert_eq!(mask.ink_count(), 14);
    }

    #[test]
    fn test_rectangle_outline_is_hollow() {
        let mut generator = FigureGenerator::new(8);
        let mask = generator.generate(FigureType::Rectangle);
        let bounds = mask.bounding_box().unwrap();

        let center_x = (bounds.min_x + bounds.max_x) / 2;
        let center_y = (bounds.min_y + bounds.max_y) / 2;
        assert!(!mask.is_ink(center_x, center_y));
        assert!(mask.is_ink(bounds.min_x, bounds.min_y));
        assert!(mask.is_ink(bounds.max_x, bounds.max_y));
    }

    #[test]
    fn test_index_round_trip() {
        assert_eq!(FigureType::from_index(2), Some(FigureType::Circle));
        assert_eq!(FigureType::Sinusoid.index(), 3);
        assert_eq!(FigureType::from_index(4), None);
    }

    #[test]
    fn test_render_colors() {
        let mut canvas = Canvas::new(4);
        canvas.plot(1, 2);
        let image = render(&InkMask::from_array(canvas.ink));
        assert_eq!(image.get_pixel(1, 2).0[0], 0);
        assert_eq!(image.get_pixel(2, 1).0[0], 255);
    }
}
