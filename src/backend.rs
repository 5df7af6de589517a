//! Backend abstraction
//!
//! Training runs on any Burn autodiff backend; the aliases here pick the
//! portable ndarray backend as the default. The device is always passed
//! explicitly into the trainer rather than held as process-global state, so
//! several runs can coexist in one process.

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};

/// The default inference backend
pub type DefaultBackend = NdArray<f32>;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

/// Get a human-readable name for the default backend
pub fn backend_name() -> &'static str {
    "ndarray (CPU)"
}
