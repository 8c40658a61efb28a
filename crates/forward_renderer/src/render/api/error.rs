//! Errors reported by graphics device implementations

use std::path::PathBuf;

use thiserror::Error;

/// Device-level failure
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A native API call failed
    #[error("{operation} failed with native result {code}")]
    Api {
        /// Name of the failing call
        operation: &'static str,
        /// Native result code
        code: i32,
    },

    /// No memory type satisfies the requested properties
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// None of the candidate formats is supported for the requested use
    #[error("No supported format among the candidates")]
    NoSuitableFormat,

    /// The requested queue family does not exist on this device
    #[error("No queue family with the requested capabilities")]
    QueueNotFound,

    /// A blocking wait ran out of time
    #[error("{operation} timed out")]
    Timeout {
        /// Name of the waiting call
        operation: &'static str,
    },

    /// A shader binary could not be read
    #[error("Failed to read shader {path}: {source}")]
    Shader {
        /// Shader path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A buffer was requested with no contents
    #[error("Buffer size must be greater than zero")]
    EmptyBuffer,

    /// A mesh or model was uploaded without vertices or indices
    #[error("Geometry '{0}' has no vertices or no indices")]
    EmptyGeometry(String),

    /// A shader binary is not valid SPIR-V
    #[error("Invalid SPIR-V in {0}")]
    InvalidShader(PathBuf),
}

impl DeviceError {
    /// Native result code, when the failure came from the API
    pub const fn native_code(&self) -> Option<i32> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
