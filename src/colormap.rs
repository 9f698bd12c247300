use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;
use ndarray::prelude::*;

use crate::errors::{LunarSegError, Result};

/// Per-pixel class indices, `(height, width)`.
pub type ClassMask = Array2<u8>;

/// Display color of each class, indexed by class id.
///
/// Class 2 is labelled "sky" by the trained model; it is kept as-is.
pub const COLOR_TABLE: [[u8; 3]; 4] = [
    [0, 0, 0],   // 0: background
    [255, 0, 0], // 1: large rocks
    [0, 255, 0], // 2: sky
    [0, 0, 255], // 3: small rocks
];

pub const NUM_CLASSES: usize = COLOR_TABLE.len();

/// Collapses `(batch, height, width, classes)` probabilities of the first batch
/// element into a class mask. The lowest class index wins ties; NaN never wins.
pub fn argmax_classes(probabilities: ArrayView4<f32>) -> Result<ClassMask> {
    let (batch, _, _, classes) = probabilities.dim();
    if batch == 0 || classes == 0 {
        return Err(LunarSegError::model(
            "argmax",
            format!("prediction has shape {:?}", probabilities.shape()),
        ));
    }
    if classes > usize::from(u8::MAX) + 1 {
        return Err(LunarSegError::model(
            "argmax",
            format!("{classes} classes do not fit in a u8 mask"),
        ));
    }

    Ok(probabilities
        .index_axis(Axis(0), 0)
        .map_axis(Axis(2), |scores| {
            let mut best = 0;
            for (class, &score) in scores.iter().enumerate() {
                if score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
                    best = class;
                }
            }
            best as u8
        }))
}

/// Maps every class index to its [`COLOR_TABLE`] entry.
///
/// Indices outside the table are rejected rather than clamped.
pub fn colorize(mask: ArrayView2<u8>) -> Result<RgbImage> {
    if let Some(((y, x), &class)) = mask
        .indexed_iter()
        .find(|(_, class)| usize::from(**class) >= NUM_CLASSES)
    {
        return Err(LunarSegError::ClassOutOfRange {
            class: class.into(),
            x,
            y,
        });
    }

    let (height, width) = mask.dim();
    let gray = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([mask[[y as usize, x as usize]]])
    });
    Ok(map_colors(&gray, |Luma([class])| {
        Rgb(COLOR_TABLE[usize::from(class)])
    }))
}
