//! Storage model consumed by the scan
//!
//! A logical table is a row-id existence table plus one value store per
//! attribute:
//!
//! - Existence rows are `(base_rowid, bitmap of CHUNK_SIZE bits)`; the windows
//!   partition the row-id space and are read in row-id order.
//! - Column-store rows are `(base_rowid, value array, optional null bitmap)`,
//!   indexed by base row-id.
//!
//! The scan reaches storage only through the `RelationSet` traits. Resolving
//! the physical objects (naming, locking, catalog lookup) belongs to the
//! provider. `MemoryRelationSet` is the in-process provider.

mod bitmap;
mod errors;
mod memory;
mod record;
mod relation;
mod types;

pub use bitmap::Bitmap;
pub use errors::{StorageError, StorageResult};
pub use memory::{
    AccessStats, ExistenceSpec, MemoryRelationSet, MemoryRelationSetBuilder, RecordSpec,
    TableKind, TableSpec,
};
pub use record::{ArrayData, ColumnArray, ColumnRecord, ExistenceRow};
pub use relation::{ColumnCursor, ExistenceScan, RelationKind, RelationSet};
pub use types::{ColumnDesc, Datum, ElementType, RowId};
