//! Offload execution interface
//!
//! The kernel is opaque: a device builds it from source text into an
//! executor, and the scan only submits chunk buffers and polls for results.
//! Polling never blocks.

use crate::storage::{Bitmap, ElementType, RowId};

use super::errors::OffloadResult;

/// Handle of one submitted kernel execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionHandle(pub u64);

/// One eagerly loaded column handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelColumn {
    /// Attribute index in the relation
    pub column: usize,
    pub elem_type: ElementType,
    /// Dense little-endian values, `chunk_size * width` bytes
    pub values: Vec<u8>,
    /// Set bit = NULL; `None` means no nulls
    pub nulls: Option<Bitmap>,
}

impl KernelColumn {
    /// Whether row `index` of this column is null
    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.as_ref().is_some_and(|n| index < n.len() && n.get(index))
    }
}

/// Host buffers copied to the device for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInput {
    pub chunk_base_rowid: RowId,
    /// Liveness map of the chunk
    pub rowmap: Bitmap,
    /// Clause columns, in attribute order
    pub columns: Vec<KernelColumn>,
}

impl KernelInput {
    /// Clause column with the given attribute index
    pub fn column(&self, column: usize) -> Option<&KernelColumn> {
        self.columns.iter().find(|c| c.column == column)
    }
}

/// Result copied back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOutput {
    /// Rows that passed the kernel's predicate
    pub rowmap: Bitmap,
}

/// Completion state of a submitted execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Complete(KernelOutput),
}

/// Execution queue bound to one built kernel program.
pub trait OffloadExecutor: Send {
    /// Submit a chunk. Fails with `ResourceExhausted` when no slot is free.
    fn submit(&mut self, input: KernelInput) -> OffloadResult<ExecutionHandle>;

    /// Non-blocking completion check. A completed handle is retired.
    fn poll(&mut self, handle: ExecutionHandle) -> OffloadResult<ExecutionStatus>;

    /// Forcibly dispose of an execution, finished or not.
    fn discard(&mut self, handle: ExecutionHandle);

    /// Executions submitted and not yet retired or discarded.
    fn in_flight(&self) -> usize;
}

/// Builds kernel programs and their execution queues.
pub trait OffloadDevice: Send + Sync {
    /// Build `source` into an executor.
    fn build_program(
        &self,
        source: &str,
        work_group_size: usize,
    ) -> OffloadResult<Box<dyn OffloadExecutor>>;
}
