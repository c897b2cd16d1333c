use image::{DynamicImage, GrayImage};

use super::mask::InkMask;
use super::raster::{fit_canvas, luma};
use super::FeatureConfig;
use crate::error::Result;

/// Pixels darker than this count as ink
const INK_LEVEL: u8 = 128;

/// Raw ink projections: the ink count of every column followed by the ink
/// count of every row, `canvas_width + canvas_height` values in total.
///
/// No normalization is applied; models fed with these vectors should keep
/// `normalize_inputs` enabled.
#[derive(Debug, Clone)]
pub struct ProjectionExtractor {
    config: FeatureConfig,
}

impl ProjectionExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(ProjectionExtractor { config })
    }

    pub fn output_len(&self) -> usize {
        (self.config.canvas_width + self.config.canvas_height) as usize
    }

    pub fn extract(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = fit_canvas(&image.to_rgb8(), self.config.canvas_width, self.config.canvas_height);
        self.extract_gray(&luma(&rgb, self.config.luma_weights))
    }

    pub fn extract_gray(&self, image: &GrayImage) -> Vec<f32> {
        let gray = fit_canvas(image, self.config.canvas_width, self.config.canvas_height);
        Self::from_mask(&InkMask::from_gray(&gray, INK_LEVEL))
    }

    pub fn from_mask(mask: &InkMask) -> Vec<f32> {
        let (columns, rows) = mask.projections();
        columns.into_iter().chain(rows).map(|n| n as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_counts_columns_then_rows() {
        let extractor = ProjectionExtractor::new(FeatureConfig::default()).unwrap();
        let mut image = GrayImage::from_pixel(200, 200, Luma([255]));
        for x in 20..30 {
            image.put_pixel(x, 5, Luma([0]));
        }

        let features = extractor.extract_gray(&image);
        assert_eq!(features.len(), extractor.output_len());
        assert_eq!(features[20], 1.0);
        assert_eq!(features[19], 0.0);
        assert_eq!(features[200 + 5], 10.0);
        assert_eq!(features.iter().sum::<f32>(), 20.0);
    }
}
