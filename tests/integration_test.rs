use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use ndarray::{Array4, ArrayView4};

use lunar_seg::{
    colormap::{argmax_classes, colorize, ClassMask},
    mocks::MockSegmentationModel,
    preprocess::{preprocess_bytes, INPUT_SIZE},
    LunarSegError, SegmentationModel, Segmenter, COLOR_TABLE,
};

// Checks the tensor the pipeline hands to the model.
struct ShapeCheckingModel;

impl SegmentationModel for ShapeCheckingModel {
    fn predict(&self, tensor: ArrayView4<f32>) -> lunar_seg::Result<Array4<f32>> {
        assert_eq!(tensor.shape(), &[1, 480, 480, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        let mut probabilities = Array4::<f32>::zeros((1, 480, 480, 4));
        probabilities
            .slice_mut(ndarray::s![.., .., .., 2])
            .fill(0.7);
        Ok(probabilities)
    }

    fn num_classes(&self) -> usize {
        4
    }
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

#[test]
fn jpeg_upload_becomes_480_square_png() {
    let upload = encode(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(480, 480, Rgb([90, 90, 90]))),
        ImageFormat::Jpeg,
    );
    let segmenter = Segmenter::new(ShapeCheckingModel).unwrap();

    let png = segmenter.segment_bytes(&upload).unwrap();
    let result = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();

    assert_eq!(result.dimensions(), (INPUT_SIZE, INPUT_SIZE));
    assert!(result
        .to_rgb8()
        .pixels()
        .all(|p| *p == Rgb(COLOR_TABLE[2])));
}

#[test]
fn crop_keeps_top_left_region() {
    // Right half of a 960-wide image is red; only the left 480 columns are seen.
    let image = RgbImage::from_fn(960, 480, |x, _| {
        if x < 480 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 0, 0])
        }
    });
    let segmenter = Segmenter::new(MockSegmentationModel::brightest_channel()).unwrap();

    let mask = segmenter
        .class_mask(&DynamicImage::ImageRgb8(image))
        .unwrap();
    assert_eq!(mask.dim(), (480, 480));
    assert!(mask.iter().all(|&c| c == 0));
}

#[test]
fn white_png_preprocesses_to_ones() {
    let upload = encode(
        DynamicImage::ImageRgb8(RgbImage::from_pixel(480, 480, Rgb([255, 255, 255]))),
        ImageFormat::Png,
    );
    let tensor = preprocess_bytes(&upload).unwrap();
    assert_eq!(tensor.shape(), &[480, 480, 3]);
    assert!(tensor.iter().all(|&v| v == 1.0));
}

#[test]
fn undersized_upload_names_required_dimensions() {
    let upload = encode(
        DynamicImage::ImageRgb8(RgbImage::new(100, 100)),
        ImageFormat::Png,
    );
    let segmenter = Segmenter::new(MockSegmentationModel::constant(0)).unwrap();

    let err = segmenter.segment_bytes(&upload).unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("at least 480x480"));
    assert!(err.to_string().contains("100x100"));
}

#[test]
fn argmax_then_colorize_round_through_table() {
    let mut probabilities = Array4::<f32>::zeros((1, 2, 2, 4));
    for (i, (y, x)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
        probabilities[[0, y, x, i]] = 1.0;
    }
    let mask: ClassMask = argmax_classes(probabilities.view()).unwrap();
    let image = colorize(mask.view()).unwrap();

    assert_eq!(*image.get_pixel(0, 0), Rgb(COLOR_TABLE[0]));
    assert_eq!(*image.get_pixel(1, 0), Rgb(COLOR_TABLE[1]));
    assert_eq!(*image.get_pixel(0, 1), Rgb(COLOR_TABLE[2]));
    assert_eq!(*image.get_pixel(1, 1), Rgb(COLOR_TABLE[3]));
}

#[test]
fn mask_with_unknown_class_is_refused() {
    let mask = ClassMask::from_elem((3, 3), 9);
    assert!(matches!(
        colorize(mask.view()),
        Err(LunarSegError::ClassOutOfRange { class: 9, x: 0, y: 0 })
    ));
}

#[test]
fn segmenter_is_shareable_across_threads() {
    let segmenter = std::sync::Arc::new(Segmenter::new(MockSegmentationModel::constant(1)).unwrap());
    let upload = encode(
        DynamicImage::ImageRgb8(RgbImage::new(480, 480)),
        ImageFormat::Png,
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let segmenter = segmenter.clone();
            let upload = upload.clone();
            std::thread::spawn(move || segmenter.segment_bytes(&upload).unwrap())
        })
        .collect();
    let outputs: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}
