pub mod batch;
pub mod colormap;
pub mod config;
pub mod errors;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod traits;
pub mod ui;

pub mod mocks;

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use ndarray::Axis;
use tracing::debug;

pub use colormap::{ClassMask, COLOR_TABLE};
pub use config::Config;
pub use errors::{LunarSegError, Result};
pub use model::Model;
pub use traits::*;

/// Upload-to-visualization pipeline around a shared segmentation model.
///
/// decode → crop/normalize → add batch axis → predict → argmax → colorize → PNG.
pub struct Segmenter<M: SegmentationModel> {
    model: M,
}

impl<M: SegmentationModel> std::fmt::Debug for Segmenter<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segmenter").finish_non_exhaustive()
    }
}

impl<M: SegmentationModel> Segmenter<M> {
    /// Wraps `model`, refusing one whose class count does not match [`COLOR_TABLE`].
    pub fn new(model: M) -> Result<Self> {
        let num_classes = model.num_classes();
        if num_classes != colormap::NUM_CLASSES {
            return Err(LunarSegError::Configuration {
                message: format!(
                    "model predicts {num_classes} classes but the color table has {}",
                    colormap::NUM_CLASSES
                ),
            });
        }
        Ok(Self { model })
    }

    /// Segments an encoded JPEG/PNG/BMP upload and returns the colorized mask as PNG bytes.
    pub fn segment_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let image = preprocess::decode(bytes)?;
        let segmented = self.segment_image(&image)?;
        encode_png(segmented)
    }

    /// Segments a decoded image into a 480x480 RGB visualization.
    pub fn segment_image(&self, image: &DynamicImage) -> Result<RgbImage> {
        let mask = self.class_mask(image)?;
        colormap::colorize(mask.view())
    }

    /// Per-pixel class indices for the top-left 480x480 crop of `image`.
    pub fn class_mask(&self, image: &DynamicImage) -> Result<ClassMask> {
        let (width, height) = image.dimensions();
        debug!(width, height, color = ?image.color(), "segmenting image");

        let tensor = preprocess::preprocess(image)?.insert_axis(Axis(0));
        let probabilities = self.model.predict(tensor.view())?;
        colormap::argmax_classes(probabilities.view())
    }
}

pub fn encode_png(image: RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|source| LunarSegError::Encode { source })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FailingSegmentationModel, MockSegmentationModel};
    use image::{GrayImage, Rgb};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn segments_png_upload_to_png() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let segmenter = Segmenter::new(MockSegmentationModel::constant(1))?;
        let upload = encode(
            DynamicImage::ImageRgb8(RgbImage::new(512, 600)),
            ImageFormat::Png,
        );

        let png = segmenter.segment_bytes(&upload)?;
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)?;

        assert_eq!(decoded.dimensions(), (480, 480));
        assert_eq!(decoded.color().channel_count(), 3);
        assert!(decoded.to_rgb8().pixels().all(|p| *p == Rgb([255, 0, 0])));
        Ok(())
    }

    #[test]
    fn colors_follow_model_classes() -> Result<()> {
        let segmenter = Segmenter::new(MockSegmentationModel::brightest_channel())?;
        let image = RgbImage::from_fn(480, 480, |x, _| match x / 120 {
            0 => Rgb([0, 0, 0]),
            1 => Rgb([200, 0, 0]),
            2 => Rgb([0, 200, 0]),
            _ => Rgb([0, 0, 200]),
        });

        let segmented = segmenter.segment_image(&DynamicImage::ImageRgb8(image))?;
        for (x, color) in [
            (0, COLOR_TABLE[0]),
            (130, COLOR_TABLE[1]),
            (250, COLOR_TABLE[2]),
            (470, COLOR_TABLE[3]),
        ] {
            assert_eq!(*segmented.get_pixel(x, 10), Rgb(color), "column {x}");
        }
        Ok(())
    }

    #[test]
    fn bmp_uploads_are_accepted() -> Result<()> {
        let segmenter = Segmenter::new(MockSegmentationModel::constant(3))?;
        let upload = encode(
            DynamicImage::ImageRgb8(RgbImage::new(480, 480)),
            ImageFormat::Bmp,
        );
        let mask = segmenter.class_mask(&preprocess::decode(&upload)?)?;
        assert!(mask.iter().all(|&c| c == 3));
        Ok(())
    }

    #[test]
    fn validation_errors_pass_through() {
        let segmenter = Segmenter::new(MockSegmentationModel::constant(0)).unwrap();
        let upload = encode(
            DynamicImage::ImageLuma8(GrayImage::new(480, 480)),
            ImageFormat::Png,
        );
        let err = segmenter.segment_bytes(&upload).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn model_with_extra_classes_is_refused() {
        let err = Segmenter::new(MockSegmentationModel::constant(5)).unwrap_err();
        assert!(matches!(err, LunarSegError::Configuration { .. }));
        assert!(err.to_string().contains("6 classes"));
    }

    #[test]
    fn model_with_too_few_classes_is_refused() {
        let model = MockSegmentationModel::new(2, |_, _, _| 0);
        assert!(Segmenter::new(model).is_err());
    }

    #[test]
    fn model_failure_is_a_server_error() {
        let segmenter = Segmenter::new(FailingSegmentationModel).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(480, 480));
        let err = segmenter.segment_image(&image).unwrap_err();
        assert!(!err.is_client_error());
    }
}
