//! # gpu-smoke
//!
//! CUDA availability and training smoke test
//!
//! Probes for a usable CUDA accelerator, trains a small fully-connected
//! network on synthetic batches for a fixed number of iterations, and
//! reports timing and device memory statistics. Built on tch-rs for the
//! tensor work and NVML for device introspection.
//!
//! The library exposes every stage of the flow so each can be tested in
//! isolation; the `gpu-smoke` binary just wires them together:
//!
//! ```text
//! preflight -> probe -> build model -> train -> report -> teardown
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Scoped device teardown guard
pub mod cleanup;

/// Fatal error taxonomy with probable-cause reporting
pub mod error;

/// The fixed-topology smoke-test network
pub mod net;

/// Environment preflight and device probe
pub mod probe;

/// Run and memory accounting
pub mod report;

/// Training loop, session, and statistics
pub mod train;

/// Current version of gpu-smoke
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
