use image::{RgbImage, imageops::FilterType};
use ndarray::Array2;

/// The side of the square the digit model reads.
pub const DIGIT_SIDE: u32 = 28;

/// Turns an image into the `(1, 784)` input of the digit model.
///
/// The image is resized to 28x28, converted to grayscale with luma weights and inverted so
/// ink is high valued.
pub fn digit_features(image: &RgbImage) -> Array2<f32> {
    let resized = image::imageops::resize(image, DIGIT_SIDE, DIGIT_SIDE, FilterType::Triangle);

    let side = DIGIT_SIDE as usize;
    Array2::from_shape_fn((1, side * side), |(_, i)| {
        let [r, g, b] = resized.get_pixel((i % side) as u32, (i / side) as u32).0;
        let gray = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        1. - gray / 255.
    })
}
