//! Host-side offload device
//!
//! Runs kernels as Rust closures on worker threads. Kernel "source" is the
//! name of a registered kernel. Completion is detected with
//! `JoinHandle::is_finished`, so `poll` never blocks on a running kernel.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::storage::Bitmap;

use super::errors::{OffloadError, OffloadResult};
use super::executor::{
    ExecutionHandle, ExecutionStatus, KernelInput, KernelOutput, OffloadDevice, OffloadExecutor,
};

/// A host kernel: returns the rows of the chunk that pass.
pub type HostKernel = Arc<dyn Fn(&KernelInput) -> Result<Bitmap, String> + Send + Sync>;

/// Name of the built-in kernel that keeps every live row.
pub const PASSTHROUGH_KERNEL: &str = "passthrough";

/// Default number of concurrently running kernels per executor.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Device that builds host executors from a kernel registry.
pub struct HostDevice {
    kernels: HashMap<String, HostKernel>,
    max_in_flight: usize,
}

impl HostDevice {
    /// Device with no kernels registered
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            kernels: HashMap::new(),
            max_in_flight,
        }
    }

    /// Device with the built-in kernels registered
    pub fn with_builtins() -> Self {
        let mut device = Self::new(DEFAULT_MAX_IN_FLIGHT);
        device.register(PASSTHROUGH_KERNEL, |input: &KernelInput| Ok(input.rowmap.clone()));
        device
    }

    /// Register a kernel under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, kernel: F)
    where
        F: Fn(&KernelInput) -> Result<Bitmap, String> + Send + Sync + 'static,
    {
        self.kernels.insert(name.into(), Arc::new(kernel));
    }
}

impl OffloadDevice for HostDevice {
    fn build_program(
        &self,
        source: &str,
        work_group_size: usize,
    ) -> OffloadResult<Box<dyn OffloadExecutor>> {
        if work_group_size == 0 {
            return Err(OffloadError::BuildFailed(
                "work group size must be positive".to_string(),
            ));
        }
        let name = source.trim();
        let kernel = self
            .kernels
            .get(name)
            .cloned()
            .ok_or_else(|| OffloadError::BuildFailed(format!("unknown kernel \"{}\"", name)))?;
        Ok(Box::new(HostExecutor::new(kernel, self.max_in_flight)))
    }
}

/// Executor running one host kernel on worker threads.
pub struct HostExecutor {
    kernel: HostKernel,
    max_in_flight: usize,
    running: HashMap<u64, JoinHandle<Result<Bitmap, String>>>,
    next_handle: u64,
}

impl HostExecutor {
    pub fn new(kernel: HostKernel, max_in_flight: usize) -> Self {
        Self {
            kernel,
            max_in_flight,
            running: HashMap::new(),
            next_handle: 1,
        }
    }
}

impl OffloadExecutor for HostExecutor {
    fn submit(&mut self, input: KernelInput) -> OffloadResult<ExecutionHandle> {
        if self.running.len() >= self.max_in_flight {
            return Err(OffloadError::ResourceExhausted(format!(
                "{} kernels already running",
                self.running.len()
            )));
        }
        let kernel = Arc::clone(&self.kernel);
        let join = thread::Builder::new()
            .name(format!("chunk-kernel-{}", input.chunk_base_rowid))
            .spawn(move || kernel(&input))
            .map_err(|e| OffloadError::ResourceExhausted(format!("spawn failed: {}", e)))?;

        let id = self.next_handle;
        self.next_handle += 1;
        self.running.insert(id, join);
        Ok(ExecutionHandle(id))
    }

    fn poll(&mut self, handle: ExecutionHandle) -> OffloadResult<ExecutionStatus> {
        let finished = self
            .running
            .get(&handle.0)
            .ok_or(OffloadError::UnknownHandle(handle.0))?
            .is_finished();
        if !finished {
            return Ok(ExecutionStatus::Running);
        }
        let join = self
            .running
            .remove(&handle.0)
            .ok_or(OffloadError::UnknownHandle(handle.0))?;
        match join.join() {
            Ok(Ok(rowmap)) => Ok(ExecutionStatus::Complete(KernelOutput { rowmap })),
            Ok(Err(reason)) => Err(OffloadError::ExecutionFailed(reason)),
            Err(_) => Err(OffloadError::ExecutionFailed("kernel panicked".to_string())),
        }
    }

    fn discard(&mut self, handle: ExecutionHandle) {
        // Dropping the join handle detaches the worker; its result is lost.
        self.running.remove(&handle.0);
    }

    fn in_flight(&self) -> usize {
        self.running.len()
    }
}
