//! Error taxonomy for the smoke test
//!
//! Every failure class here is fatal for the run: the binary reports the
//! error together with its probable causes, tears down device resources,
//! and exits non-zero. Cleanup-time failures are deliberately not part of
//! this enum; they are logged as warnings and never escalated.

use tch::Device;
use thiserror::Error;

/// Fatal failure classes of a smoke-test run
#[derive(Debug, Error)]
pub enum SmokeError {
    /// No usable CUDA accelerator was found
    #[error("CUDA accelerator unavailable: {reason}")]
    AcceleratorUnavailable {
        /// Why the probe rejected the environment
        reason: String,
    },

    /// Moving model parameters onto the device failed
    #[error("failed to place model on {device:?}: {message}")]
    Placement {
        /// Device the model was being placed on
        device: Device,
        /// Underlying allocator or runtime message
        message: String,
    },

    /// Constructing the optimizer or criterion failed
    #[error("optimizer setup failed: {message}")]
    OptimizerSetup {
        /// Underlying message from the tensor runtime
        message: String,
    },

    /// A device-level runtime error occurred during a training iteration
    #[error("device error during batch {batch}: {message}")]
    Training {
        /// 1-indexed batch at which the loop aborted
        batch: usize,
        /// Underlying message from the tensor runtime
        message: String,
    },

    /// A configuration struct failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SmokeError {
    /// Short list of plausible root causes, printed alongside the error
    pub fn probable_causes(&self) -> &'static [&'static str] {
        match self {
            SmokeError::AcceleratorUnavailable { .. } => &[
                "no NVIDIA GPU is present or visible to this process",
                "the NVIDIA driver is not installed or too old",
                "libtorch was built without CUDA support",
                "CUDA_VISIBLE_DEVICES hides every device",
            ],
            SmokeError::Placement { .. } => &[
                "device memory exhausted by another process",
                "CUDA runtime error while allocating parameters",
                "driver/runtime version mismatch",
            ],
            SmokeError::OptimizerSetup { .. } => &[
                "model parameters were not registered on the device",
                "CUDA runtime error while allocating optimizer state",
            ],
            SmokeError::Training { .. } => &[
                "device out of memory mid-run",
                "invalid device operation or kernel launch failure",
                "the device was lost or reset during the run",
            ],
            SmokeError::InvalidConfig(_) => &[
                "a builder method was called with an out-of-range value",
            ],
        }
    }
}

impl From<anyhow::Error> for SmokeError {
    fn from(err: anyhow::Error) -> Self {
        SmokeError::InvalidConfig(err.to_string())
    }
}

/// Best-effort extraction of a message from a caught panic payload
///
/// libtorch reports device faults by panicking across the tch boundary;
/// the payload is a `String` or `&str` in practice.
pub fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
