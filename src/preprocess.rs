use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::DynamicImage;
use ndarray::Array4;

use crate::error::PredictError;

/// Target tensor geometry. The output is always NHWC, RGB, 0-255 scale.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
}

impl PreprocessConfig {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

#[derive(Debug)]
pub struct Processor {
    config: PreprocessConfig,
}

impl Processor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decodes arbitrary image bytes and scales them onto a surface of the
    /// configured size, so the tensor handed to the model has a bounded,
    /// deterministic shape no matter what resolution the client sends.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Array4<f32>, PredictError> {
        let decoded =
            image::load_from_memory(bytes).map_err(PredictError::InvalidImageFormat)?;
        let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

        let mut resized = Image::new(self.config.width, self.config.height, PixelType::U8x3);
        let resize_options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom));
        let mut resizer = Resizer::new();
        resizer
            .resize(&rgb, &mut resized, Some(&resize_options))
            .map_err(|e| PredictError::Unexpected(anyhow::Error::new(e)))?;

        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let pixels: Vec<f32> = resized.buffer().iter().map(|&b| b as f32).collect();
        let tensor = Array4::from_shape_vec((1, height, width, 3), pixels)
            .map_err(|e| PredictError::Unexpected(anyhow::Error::new(e)))?;
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn output_shape_is_fixed_for_any_input_resolution() {
        let processor = Processor::new(PreprocessConfig::square(224));
        for (w, h) in [(1, 1), (64, 48), (300, 200), (1024, 7)] {
            let tensor = processor.normalize(&png_bytes(w, h)).unwrap();
            assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        }
    }

    #[test]
    fn non_square_targets_are_respected() {
        let processor = Processor::new(PreprocessConfig {
            width: 96,
            height: 64,
        });
        let tensor = processor.normalize(&png_bytes(640, 480)).unwrap();
        assert_eq!(tensor.shape(), &[1, 64, 96, 3]);
    }

    #[test]
    fn pixel_values_stay_in_byte_range() {
        let processor = Processor::new(PreprocessConfig::square(32));
        let tensor = processor.normalize(&png_bytes(128, 128)).unwrap();
        assert!(tensor.iter().all(|&v| (0.0..=255.0).contains(&v)));
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        let processor = Processor::new(PreprocessConfig::square(224));
        let err = processor.normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PredictError::InvalidImageFormat(_)));
    }

    #[test]
    fn jpeg_inputs_decode_too() {
        let img = image::RgbImage::from_pixel(50, 40, image::Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();

        let processor = Processor::new(PreprocessConfig::square(224));
        let tensor = processor.normalize(&out.into_inner()).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }
}
