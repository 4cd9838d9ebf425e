//! Matrix-free high-order finite element kernels with pluggable execution backends.
//!
//! Element-local operators (mass action, interpolation, gradients) are written once and run on
//! the backend selected by a [`config::Runtime`]: on the calling thread, on the rayon thread
//! pool, or as a grid of thread blocks on an emulated accelerator. Buffers track whether their
//! contents are valid in host memory, device memory or both, and move data on demand.
pub mod array;
pub mod basis;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod kernels;
pub mod launch;
pub mod memcpy;
pub mod operator;
pub mod quadrature;
pub mod vector;

pub(crate) mod workspace;

pub extern crate nalgebra;

pub use hofem_traits::{DeviceCopy, Real};
