use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over the trained segmentation network.
///
/// Implementations receive a `(1, 480, 480, 3)` tensor scaled to `[0, 1]` and
/// return `(1, 480, 480, classes)` per-pixel class probabilities. They are
/// loaded once and shared read-only between requests, hence `Send + Sync`.
pub trait SegmentationModel: Send + Sync {
    /// Runs inference on a batched NHWC tensor.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Number of classes along the last output axis; must equal the color
    /// table length for the model to be usable.
    fn num_classes(&self) -> usize;
}
