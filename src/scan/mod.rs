//! Chunked columnar scan
//!
//! A scan session walks a table's existence windows as fixed-size chunks,
//! optionally gates each chunk on an offloaded predicate kernel, and
//! materializes one row per live row-id:
//!
//! ```text
//! existence scan ──> ChunkLoader ──> pending ──> executing ──> ready ──> TupleMaterializer ──> Row
//!                        │ (clause columns,                               │ (other required
//!                        │  eager range reads)                            │  columns)
//!                        v                                                v
//!                  column stores <──────────────────────────── ColumnStoreCache
//! ```
//!
//! Chunks live in a session-scoped `ChunkArena`; queues hold `ChunkId`s.
//! Drained chunks are released immediately, the rest at rescan or teardown.

mod arena;
mod cache;
mod chunk;
mod config;
mod errors;
mod loader;
mod materializer;
mod pipeline;
mod row;
mod session;

pub use arena::{ArenaStats, ChunkArena, ChunkId};
pub use cache::ColumnStoreCache;
pub use chunk::{Chunk, ChunkEvent, ChunkState, EagerColumn};
pub use config::{
    PlanConfig, PlanOption, Predictable, SessionConfig, DEFAULT_CHUNK_SIZE,
    DEFAULT_IDLE_POLL_INTERVAL_US, DEFAULT_MAX_ASYNC_CHUNKS, DEFAULT_WORK_GROUP_SIZE,
};
pub use errors::{ScanError, ScanErrorCode, ScanResult, Severity};
pub use loader::ChunkLoader;
pub use materializer::TupleMaterializer;
pub use pipeline::{Advance, ChunkPipeline, PipelineQueues};
pub use row::Row;
pub use session::{ScanMode, ScanSession, ScanStrategy, SessionState};
