use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the lunar segmentation service.
///
/// Validation failures are the only variant caused by the caller's input; every
/// other variant is an internal failure. [`LunarSegError::is_client_error`] is
/// what the HTTP layer uses to pick the response status.
#[derive(Error, Debug)]
pub enum LunarSegError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{reason}")]
    Validation { field: String, reason: String },

    #[error("Failed to decode image")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode segmented image")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Class index {class} at ({x}, {y}) has no color")]
    ClassOutOfRange { class: usize, x: usize, y: usize },
}

pub type Result<T> = std::result::Result<T, LunarSegError>;

impl LunarSegError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn model(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Model {
            operation: operation.into(),
            source: message.into(),
        }
    }

    /// Whether the failure was caused by the uploaded input rather than by the service.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<ort::Error> for LunarSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors only come out of tensor plumbing around inference, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for LunarSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
