use image::GrayImage;

/// 256-bin intensity histogram
pub fn histogram(image: &GrayImage) -> [u32; 256] {
    let mut bins = [0u32; 256];
    for pixel in image.pixels() {
        bins[pixel.0[0] as usize] += 1;
    }
    bins
}

/// Otsu's global threshold.
///
/// Pixels with intensity strictly below the returned value form the dark
/// class. Each split point `t` puts `0..t` in the dark class and `t..=255`
/// in the light one; the first `t` with the largest between-class variance
/// wins. An image with a single intensity has no valid split and yields 0,
/// which leaves every pixel in the light class.
pub fn otsu_threshold(bins: &[u32; 256]) -> u8 {
    let total: u64 = bins.iter().map(|&n| n as u64).sum();
    let weighted: f64 = bins.iter().enumerate().map(|(i, &n)| i as f64 * n as f64).sum();

    let mut dark_count = 0u64;
    let mut dark_sum = 0.0f64;
    let mut best_variance = 0.0f64;
    let mut threshold = 0u8;

    for t in 1..256usize {
        dark_count += bins[t - 1] as u64;
        dark_sum += (t - 1) as f64 * bins[t - 1] as f64;
        if dark_count == 0 {
            continue;
        }
        let light_count = total - dark_count;
        if light_count == 0 {
            break;
        }

        let dark_mean = dark_sum / dark_count as f64;
        let light_mean = (weighted - dark_sum) / light_count as f64;
        let variance = dark_count as f64 * light_count as f64 * (dark_mean - light_mean).powi(2);
        if variance > best_variance {
            best_variance = variance;
            threshold = t as u8;
        }
    }

    threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn bimodal(low: usize, high: usize, spread: usize) -> [u32; 256] {
        let mut bins = [0u32; 256];
        for offset in 0..=spread * 2 {
            let weight = (spread + 1 - offset.abs_diff(spread)) as u32 * 10;
            bins[low + offset - spread] += weight;
            bins[high + offset - spread] += weight;
        }
        bins
    }

    #[test]
    fn test_threshold_between_peaks() {
        for (low, high) in [(40, 200), (10, 60), (120, 250)] {
            let t = otsu_threshold(&bimodal(low, high, 5)) as usize;
            assert!(t > low && t < high, "threshold {t} not between {low} and {high}");
        }
    }

    #[test]
    fn test_threshold_separates_two_levels() {
        let mut bins = [0u32; 256];
        bins[30] = 500;
        bins[220] = 1500;
        let t = otsu_threshold(&bins);
        assert!((31..=220).contains(&t));
        // First-seen maximum
        assert_eq!(t, 31);
    }

    #[test]
    fn test_uniform_image_has_no_dark_class() {
        let white = GrayImage::from_pixel(8, 8, Luma([255]));
        assert_eq!(otsu_threshold(&histogram(&white)), 0);

        let black = GrayImage::from_pixel(8, 8, Luma([0]));
        assert_eq!(otsu_threshold(&histogram(&black)), 0);
    }

    #[test]
    fn test_histogram_counts_pixels() {
        let mut image = GrayImage::from_pixel(4, 4, Luma([255]));
        image.put_pixel(1, 2, Luma([3]));
        let bins = histogram(&image);
        assert_eq!(bins[3], 1);
        assert_eq!(bins[255], 15);
    }
}
