use std::{borrow::Cow, io::Cursor};

use image::{imageops, DynamicImage, GenericImageView, ImageReader};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{LunarSegError, Result};

/// Side length of the square the model consumes.
pub const INPUT_SIZE: u32 = 480;

/// Number of color channels the model consumes.
pub const INPUT_CHANNELS: u8 = 3;

/// Decodes an uploaded JPEG/PNG/BMP payload, sniffing the format from its bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LunarSegError::Decode { source: e.into() })?
        .decode()
        .map_err(|source| LunarSegError::Decode { source })
}

/// Rejects images the model cannot take: smaller than the input square, or not
/// exactly three color channels.
pub fn validate(image: &DynamicImage) -> Result<()> {
    let (width, height) = image.dimensions();
    let channels = image.color().channel_count();

    if height < INPUT_SIZE || width < INPUT_SIZE {
        return Err(LunarSegError::validation(
            "dimensions",
            format!(
                "Image must be at least {INPUT_SIZE}x{INPUT_SIZE}. \
                 Provided: {height}x{width}x{channels} (height x width x channels)"
            ),
        ));
    }
    if channels != INPUT_CHANNELS {
        return Err(LunarSegError::validation(
            "channels",
            format!("Expected {INPUT_CHANNELS} color channels (RGB). Found: {channels}"),
        ));
    }
    Ok(())
}

/// Turns a decoded image into the model input: the top-left 480x480 crop
/// (never resized) as an `(H, W, C)` float tensor scaled from `[0, 255]` to `[0, 1]`.
///
/// High bit-depth RGB images are first reduced to 8 bits per sample so the
/// output range stays `[0, 1]`.
pub fn preprocess(image: &DynamicImage) -> Result<Array3<f32>> {
    validate(image)?;

    let rgb = match image {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    };
    let cropped = imageops::crop_imm(&*rgb, 0, 0, INPUT_SIZE, INPUT_SIZE).to_image();

    Ok(normalize(cropped.as_ndarray3()))
}

/// Decodes and preprocesses in one step.
pub fn preprocess_bytes(bytes: &[u8]) -> Result<Array3<f32>> {
    preprocess(&decode(bytes)?)
}

// `as_ndarray3` yields (C, H, W); the model wants (H, W, C).
fn normalize(chw: ArrayView3<u8>) -> Array3<f32> {
    chw.permuted_axes([1, 2, 0])
        .mapv(|v| f32::from(v) / 255.0)
        .as_standard_layout()
        .into_owned()
}
