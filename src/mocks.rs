use crate::colormap::NUM_CLASSES;
use crate::errors::{LunarSegError, Result};
use crate::traits::SegmentationModel;
use ndarray::prelude::*;

/// In-process stand-in for the ONNX model.
///
/// Produces one-hot probabilities: every pixel gets the class returned by
/// `classify(y, x, rgb)`, where `rgb` is the normalized input sample.
pub struct MockSegmentationModel {
    num_classes: usize,
    classify: Box<dyn Fn(usize, usize, [f32; 3]) -> usize + Send + Sync>,
}

impl MockSegmentationModel {
    pub fn new<F>(num_classes: usize, classify: F) -> Self
    where
        F: Fn(usize, usize, [f32; 3]) -> usize + Send + Sync + 'static,
    {
        Self {
            num_classes,
            classify: Box::new(classify),
        }
    }

    /// Labels every pixel with `class`.
    pub fn constant(class: usize) -> Self {
        Self::new(NUM_CLASSES.max(class + 1), move |_, _, _| class)
    }

    /// Labels each pixel by its brightest channel: red → 1, green → 2,
    /// blue → 3, and pixels darker than 0.5 everywhere → 0.
    pub fn brightest_channel() -> Self {
        Self::new(NUM_CLASSES, |_, _, [r, g, b]| {
            let max = r.max(g).max(b);
            if max < 0.5 {
                0
            } else if max == r {
                1
            } else if max == g {
                2
            } else {
                3
            }
        })
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch, height, width, channels) = tensor.dim();
        if channels != 3 {
            return Err(LunarSegError::model(
                "mock inference",
                format!("expected 3 channels, got {channels}"),
            ));
        }

        let mut probabilities = Array4::<f32>::zeros((batch, height, width, self.num_classes));
        for n in 0..batch {
            for y in 0..height {
                for x in 0..width {
                    let rgb = [tensor[[n, y, x, 0]], tensor[[n, y, x, 1]], tensor[[n, y, x, 2]]];
                    let class = (self.classify)(y, x, rgb);
                    if class < self.num_classes {
                        probabilities[[n, y, x, class]] = 1.0;
                    }
                }
            }
        }
        Ok(probabilities)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Model whose inference always fails, for exercising the server-error path.
#[derive(Debug, Default, Clone)]
pub struct FailingSegmentationModel;

impl SegmentationModel for FailingSegmentationModel {
    fn predict(&self, _tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        Err(LunarSegError::model("inference", "mock inference failure"))
    }

    fn num_classes(&self) -> usize {
        NUM_CLASSES
    }
}
