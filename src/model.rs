use std::path::Path;

use crate::{
    errors::{LunarSegError, Result},
    preprocess::{INPUT_CHANNELS, INPUT_SIZE},
    traits::SegmentationModel,
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Lunar terrain segmentation network exported to ONNX.
///
/// Expects NHWC input `(1, 480, 480, 3)` and yields `(1, 480, 480, 4)` class
/// probabilities. `Session::run` needs `&mut`, so concurrent callers serialize
/// on the session lock.
pub struct Model {
    input_name: String,
    output_name: String,
    num_classes: usize,
    session: Mutex<Session>,
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| LunarSegError::Model {
                operation: "session builder init".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| LunarSegError::Model {
                operation: "execution provider setup".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| LunarSegError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| LunarSegError::Model {
                operation: format!("load model file {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| LunarSegError::model("read model inputs", "model has no inputs"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| LunarSegError::model("read model outputs", "model has no outputs"))?;
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let shape: Vec<i64> = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| LunarSegError::model("read model input shape", "input is not a tensor"))?
            .iter()
            .copied()
            .collect();
        check_input_shape(&shape)?;

        let mut model = Self {
            input_name,
            output_name,
            num_classes: 0,
            session: Mutex::new(session),
        };

        // warm up, and learn the class count from a real run
        let zeros = Array4::<f32>::zeros((
            1,
            INPUT_SIZE as usize,
            INPUT_SIZE as usize,
            usize::from(INPUT_CHANNELS),
        ));
        let probabilities = model.run(zeros.view())?;
        model.num_classes = check_output_shape(probabilities.dim())?;

        info!(
            input = %model.input_name,
            output = %model.output_name,
            classes = model.num_classes,
            "loaded segmentation model from {}",
            model_path.display()
        );
        Ok(model)
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let probabilities = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        debug!(shape = ?probabilities.shape(), "inference finished");
        Ok(probabilities)
    }
}

impl SegmentationModel for Model {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.run(tensor)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Accepts `[batch, 480, 480, 3]`, where any dimension may be dynamic (`-1`).
fn check_input_shape(shape: &[i64]) -> Result<()> {
    let expected = [
        -1,
        i64::from(INPUT_SIZE),
        i64::from(INPUT_SIZE),
        i64::from(INPUT_CHANNELS),
    ];
    let matches = shape.len() == expected.len()
        && shape
            .iter()
            .zip(expected)
            .all(|(&actual, wanted)| actual < 0 || wanted < 0 || actual == wanted);
    if matches {
        Ok(())
    } else {
        Err(LunarSegError::Configuration {
            message: format!(
                "model input shape {shape:?} is not compatible with [N, {INPUT_SIZE}, {INPUT_SIZE}, {INPUT_CHANNELS}]"
            ),
        })
    }
}

/// Requires `(batch, 480, 480, classes)` output and returns the class count.
fn check_output_shape(dim: (usize, usize, usize, usize)) -> Result<usize> {
    let (_, height, width, classes) = dim;
    let size = INPUT_SIZE as usize;
    if height != size || width != size {
        return Err(LunarSegError::Configuration {
            message: format!(
                "model output is {height}x{width} per image, expected {INPUT_SIZE}x{INPUT_SIZE}"
            ),
        });
    }
    Ok(classes)
}
