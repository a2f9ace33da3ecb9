//! Offload execution boundary
//!
//! Kernel compilation and device queue creation live behind
//! `OffloadDevice`; the scan submits chunks to an `OffloadExecutor` and
//! observes completion by polling. `HostDevice` runs named host kernels on
//! worker threads.

mod errors;
mod executor;
mod host;

pub use errors::{OffloadError, OffloadResult};
pub use executor::{
    ExecutionHandle, ExecutionStatus, KernelColumn, KernelInput, KernelOutput, OffloadDevice,
    OffloadExecutor,
};
pub use host::{HostDevice, HostExecutor, HostKernel, DEFAULT_MAX_IN_FLIGHT, PASSTHROUGH_KERNEL};
