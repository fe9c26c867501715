//! Image-to-tensor preprocessing
//!
//! Every classifier in the ensemble consumes the same `[1, 3, 224, 224]`
//! channel-first tensor with pixels scaled to `[-1, 1]`.

use crate::image_io::load_resized;
use image::RgbImage;
use leaf_id_common::RecognitionError;
use ndarray::Array4;

/// Square input resolution expected by every classifier
pub const INPUT_SIZE: u32 = 224;

/// Batch-first, channel-first tensor shape
pub const INPUT_SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];

/// Decode image bytes into a normalized `[1, 3, 224, 224]` tensor
///
/// # Errors
/// Returns `InvalidImage` if the bytes cannot be decoded
pub fn preprocess_image(bytes: &[u8]) -> Result<Array4<f32>, RecognitionError> {
    let resized = load_resized(bytes, INPUT_SIZE)?;
    Ok(tensor_from_rgb(&resized))
}

/// Convert an RGB image into a `[1, 3, H, W]` tensor scaled to `[-1, 1]`
pub fn tensor_from_rgb(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array4::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            array[[0, c, y, x]] = f32::from(pixel[c]) / 127.5 - 1.0;
        }
    }

    array
}

/// Map a `[-1, 1]` tensor back to the `[0, 255]` pixel range
///
/// The EfficientNetV2 export rescales internally and expects raw pixel values.
pub fn rescale_to_pixel_range(tensor: &Array4<f32>) -> Array4<f32> {
    tensor.mapv(|v| (v + 1.0) * 127.5)
}
