//! Relation-set provider interface
//!
//! A logical table is backed by one existence table (row-id windows and
//! their liveness maps) plus one value store per attribute, each with an
//! index keyed by base row-id. Opening and locking those objects is the
//! provider's business; the scan only consumes the handles below.

use std::fmt;

use super::errors::StorageResult;
use super::record::{ColumnRecord, ExistenceRow};
use super::types::{ColumnDesc, RowId};

/// Kind of storage object backing a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Chunked column-store table managed by this engine
    ManagedColumnar,
    /// Foreign table handled by some other wrapper
    Foreign,
    /// Plain heap relation
    Regular,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ManagedColumnar => "managed_columnar",
            RelationKind::Foreign => "foreign",
            RelationKind::Regular => "regular",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sequential scan over the existence table, ordered by base row-id.
pub trait ExistenceScan: Send {
    /// Next existence row, or `None` once the table is exhausted.
    fn next(&mut self) -> StorageResult<Option<ExistenceRow>>;
}

/// Seek-capable cursor over one column store's row-id index.
pub trait ColumnCursor: Send {
    /// Record with the greatest base row-id `<= rowid`, scanning backward
    /// from a `<=` bound. Subsequent `next` calls continue after it.
    fn seek_le(&mut self, rowid: RowId) -> StorageResult<Option<ColumnRecord>>;

    /// Reposition so that `next` yields records with base row-id `> rowid`.
    fn seek_after(&mut self, rowid: RowId) -> StorageResult<()>;

    /// Next record in forward key order.
    fn next(&mut self) -> StorageResult<Option<ColumnRecord>>;
}

/// Handles to the storage objects backing one logical table.
pub trait RelationSet: Send + Sync {
    /// Name of the logical table (used in error messages)
    fn name(&self) -> &str;

    /// Kind of object; the scan only accepts `ManagedColumnar`
    fn kind(&self) -> RelationKind;

    /// Attribute descriptors, in table order
    fn columns(&self) -> &[ColumnDesc];

    /// Begin a sequential scan of the existence table
    fn begin_existence_scan(&self) -> StorageResult<Box<dyn ExistenceScan>>;

    /// Records of `column` with `lo <= base_rowid < hi`, in key order
    fn range_scan(&self, column: usize, lo: RowId, hi: RowId) -> StorageResult<Vec<ColumnRecord>>;

    /// Open a seekable index cursor over `column`
    fn open_cursor(&self, column: usize) -> StorageResult<Box<dyn ColumnCursor>>;

    /// Name of the value store of `column`, for diagnostics
    fn column_store_name(&self, column: usize) -> String {
        match self.columns().get(column) {
            Some(desc) => format!("{}.{}.cs", self.name(), desc.name),
            None => format!("{}.#{}.cs", self.name(), column),
        }
    }
}
