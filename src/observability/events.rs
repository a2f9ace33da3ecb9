//! Observable scan events
//!
//! Events are explicit and typed; each maps to a stable event name and a
//! default severity.

use std::fmt;

use super::logger::Severity;

/// Observable events of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Session lifecycle
    /// Session opened and validated
    ScanBegin,
    /// Materializer reported end-of-data
    ScanComplete,
    /// Session torn down
    ScanEnd,
    /// Session restarted from the first window
    ScanRescan,
    /// Fatal error terminated the scan
    ScanFailed,

    // Loading
    /// Existence window turned into a chunk
    ChunkLoaded,
    /// Chunk buffers released
    ChunkReleased,
    /// Clause column materialized into a chunk
    ColumnEagerLoad,
    /// Existence table has no more windows
    ExistenceExhausted,

    // Offload
    /// Kernel program built for the session
    KernelBuilt,
    /// Chunk submitted for kernel execution
    KernelSubmitted,
    /// Submission refused for lack of resources; chunk requeued
    KernelSubmitDeferred,
    /// Kernel finished; chunk promoted to ready
    KernelCompleted,

    // Column cache
    /// Column cache window repositioned by an index seek
    CacheReseek,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ScanBegin => "SCAN_BEGIN",
            Event::ScanComplete => "SCAN_COMPLETE",
            Event::ScanEnd => "SCAN_END",
            Event::ScanRescan => "SCAN_RESCAN",
            Event::ScanFailed => "SCAN_FAILED",
            Event::ChunkLoaded => "CHUNK_LOADED",
            Event::ChunkReleased => "CHUNK_RELEASED",
            Event::ColumnEagerLoad => "COLUMN_EAGER_LOAD",
            Event::ExistenceExhausted => "EXISTENCE_EXHAUSTED",
            Event::KernelBuilt => "KERNEL_BUILT",
            Event::KernelSubmitted => "KERNEL_SUBMITTED",
            Event::KernelSubmitDeferred => "KERNEL_SUBMIT_DEFERRED",
            Event::KernelCompleted => "KERNEL_COMPLETED",
            Event::CacheReseek => "CACHE_RESEEK",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ScanBegin
            | Event::ScanComplete
            | Event::ScanEnd
            | Event::ScanRescan
            | Event::KernelBuilt => Severity::Info,
            Event::KernelSubmitDeferred => Severity::Warn,
            Event::ScanFailed => Severity::Error,
            Event::ChunkLoaded
            | Event::ChunkReleased
            | Event::ColumnEagerLoad
            | Event::ExistenceExhausted
            | Event::KernelSubmitted
            | Event::KernelCompleted
            | Event::CacheReseek => Severity::Trace,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
