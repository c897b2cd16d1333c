//! Raster to feature-vector conversion

mod mask;
mod otsu;
mod projection;
mod raster;

pub use mask::{BoundingBox, InkMask};
pub use otsu::{histogram, otsu_threshold};
pub use projection::ProjectionExtractor;
pub use raster::luma;

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};

/// Geometry of the canvas and layout of the feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Images are resampled to this width before binarization
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub grid_columns: usize,
    pub grid_rows: usize,
    /// Sampled rows, and the same number of sampled columns
    pub profile_bands: usize,
    /// Length of every extracted vector; shorter layouts are zero-padded
    pub output_len: usize,
    /// RGB weights of the grayscale conversion
    pub luma_weights: [f32; 3],
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            canvas_width: 200,
            canvas_height: 200,
            grid_columns: 10,
            grid_rows: 10,
            profile_bands: 40,
            output_len: 200,
            luma_weights: [0.3, 0.59, 0.11],
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        let (width, height) = (self.canvas_width as usize, self.canvas_height as usize);
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfig("canvas must not be empty".into()));
        }
        if self.grid_columns == 0 || self.grid_rows == 0 || self.grid_columns > width || self.grid_rows > height {
            return Err(Error::InvalidConfig(format!(
                "grid {}x{} does not fit a {width}x{height} canvas",
                self.grid_columns, self.grid_rows
            )));
        }
        if self.profile_bands > width.min(height) {
            return Err(Error::InvalidConfig(format!(
                "{} profile bands exceed the canvas",
                self.profile_bands
            )));
        }
        if self.output_len == 0 {
            return Err(Error::InvalidConfig("output_len must be positive".into()));
        }
        Ok(())
    }

    /// Number of features produced before padding or truncation
    pub fn layout_len(&self) -> usize {
        self.grid_columns * self.grid_rows + 2 * self.profile_bands + 2
    }
}

/// Shape-summary features of a glyph image.
///
/// The vector holds, in order: ink density of each grid cell (row-major),
/// ink share of the sampled rows, of the sampled columns, the vertical
/// symmetry score and the aspect ratio of the ink bounding box.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(FeatureExtractor { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn extract(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = raster::fit_canvas(&image.to_rgb8(), self.config.canvas_width, self.config.canvas_height);
        self.extract_canvas(&luma(&rgb, self.config.luma_weights))
    }

    /// Skips the color conversion for images that are already grayscale
    pub fn extract_gray(&self, image: &GrayImage) -> Vec<f32> {
        let gray = raster::fit_canvas(image, self.config.canvas_width, self.config.canvas_height);
        self.extract_canvas(&gray)
    }

    fn extract_canvas(&self, gray: &GrayImage) -> Vec<f32> {
        let threshold = otsu_threshold(&histogram(gray));
        let mask = InkMask::from_gray(gray, threshold);
        trace!(threshold, ink = mask.ink_count(), "Binarized canvas");

        match mask.bounding_box() {
            Some(bounds) => self.summarize(&mask.stretch(&bounds), &bounds),
            None => {
                trace!("No ink found, returning zero features");
                vec![0.0; self.config.output_len]
            }
        }
    }

    /// Builds the feature vector of a normalized mask
    pub fn summarize(&self, mask: &InkMask, bounds: &BoundingBox) -> Vec<f32> {
        let c = &self.config;
        let (width, height) = (mask.width(), mask.height());
        let mut features = Vec::with_capacity(c.layout_len().max(c.output_len));

        for gy in 0..c.grid_rows {
            for gx in 0..c.grid_columns {
                features.push(mask.density(
                    gx * width / c.grid_columns,
                    (gx + 1) * width / c.grid_columns,
                    gy * height / c.grid_rows,
                    (gy + 1) * height / c.grid_rows,
                ));
            }
        }
        features.extend((0..c.profile_bands).map(|i| mask.row_density(i * height / c.profile_bands)));
        features.extend((0..c.profile_bands).map(|i| mask.column_density(i * width / c.profile_bands)));
        features.push(mask.vertical_symmetry());
        features.push(bounds.aspect_ratio());

        features.resize(c.output_len, 0.0);
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn canvas_with_square(x0: u32, y0: u32, size: u32) -> GrayImage {
        GrayImage::from_fn(200, 200, |x, y| {
            let inside = (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y);
            Luma([if inside { 0 } else { 255 }])
        })
    }

    #[test]
    fn test_blank_image_gives_zeros() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let blank = GrayImage::from_pixel(200, 200, Luma([255]));
        assert_eq!(extractor.extract_gray(&blank), vec![0.0; 200]);
    }

    #[test]
    fn test_filled_square_layout() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let features = extractor.extract_gray(&canvas_with_square(30, 50, 40));

        assert_eq!(features.len(), 200);
        // A solid square stretches to a fully inked canvas
        assert!(features[..180].iter().all(|&f| f == 1.0));
        assert_eq!(features[180], 1.0);
        assert_eq!(features[181], 1.0);
        assert!(features[182..].iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_position_does_not_matter() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let mut a = canvas_with_square(10, 10, 60);
        let mut b = canvas_with_square(110, 90, 60);
        // Hollow out the squares so the features carry some shape
        for (image, x0, y0) in [(&mut a, 10, 10), (&mut b, 110, 90)] {
            for y in y0 + 10..y0 + 50 {
                for x in x0 + 10..x0 + 50 {
                    image.put_pixel(x, y, Luma([255]));
                }
            }
        }
        assert_eq!(extractor.extract_gray(&a), extractor.extract_gray(&b));
    }

    #[test]
    fn test_output_len_truncates_and_pads() {
        let short = FeatureConfig {
            output_len: 50,
            ..Default::default()
        };
        let extractor = FeatureExtractor::new(short).unwrap();
        assert_eq!(extractor.extract_gray(&canvas_with_square(0, 0, 20)).len(), 50);

        let long = FeatureConfig {
            output_len: 300,
            ..Default::default()
        };
        let features = FeatureExtractor::new(long).unwrap().extract_gray(&canvas_with_square(0, 0, 20));
        assert_eq!(features.len(), 300);
        assert!(features[182..].iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_rejects_oversized_grid() {
        let config = FeatureConfig {
            grid_columns: 500,
            ..Default::default()
        };
        assert!(matches!(FeatureExtractor::new(config), Err(Error::InvalidConfig(_))));
    }
}
