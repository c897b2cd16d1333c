use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Pixel, RgbImage};

/// Single-channel intensity as the weighted sum of the RGB channels
pub fn luma(image: &RgbImage, weights: [f32; 3]) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let value = r as f32 * weights[0] + g as f32 * weights[1] + b as f32 * weights[2];
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Resamples onto a `width` × `height` canvas; returns a copy when the
/// image already has that size.
pub(crate) fn fit_canvas<P>(image: &image::ImageBuffer<P, Vec<u8>>, width: u32, height: u32) -> image::ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    }
}
