//! In-memory relation set
//!
//! BTreeMap-backed provider keyed by base row-id, so range scans and
//! `<=`/`>` seeks are plain ordered-map range queries. Used by the CLI and
//! by tests; it also counts index seeks so scan efficiency can be observed.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::bitmap::Bitmap;
use super::errors::{StorageError, StorageResult};
use super::record::{ColumnArray, ColumnRecord, ExistenceRow};
use super::relation::{ColumnCursor, ExistenceScan, RelationKind, RelationSet};
use super::types::{ColumnDesc, Datum, RowId};

type Store = Arc<BTreeMap<RowId, ColumnRecord>>;

/// Access counters of a memory relation set.
#[derive(Debug, Default)]
pub struct AccessStats {
    /// `seek_le` calls across all cursors
    seeks: AtomicU64,
    /// `range_scan` calls
    range_scans: AtomicU64,
    /// Records returned by forward `next` calls
    forward_reads: AtomicU64,
}

impl AccessStats {
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }

    pub fn range_scans(&self) -> u64 {
        self.range_scans.load(Ordering::Relaxed)
    }

    pub fn forward_reads(&self) -> u64 {
        self.forward_reads.load(Ordering::Relaxed)
    }
}

/// Relation set held entirely in memory.
#[derive(Debug)]
pub struct MemoryRelationSet {
    name: String,
    kind: RelationKind,
    columns: Vec<ColumnDesc>,
    existence: Arc<BTreeMap<RowId, Bitmap>>,
    stores: Vec<Store>,
    stats: Arc<AccessStats>,
}

impl MemoryRelationSet {
    /// Start building a managed columnar table
    pub fn builder(name: impl Into<String>, columns: Vec<ColumnDesc>) -> MemoryRelationSetBuilder {
        let ncols = columns.len();
        MemoryRelationSetBuilder {
            name: name.into(),
            kind: RelationKind::ManagedColumnar,
            columns,
            existence: BTreeMap::new(),
            stores: vec![BTreeMap::new(); ncols],
            error: None,
        }
    }

    /// Build from a JSON table description
    pub fn from_spec(spec: TableSpec) -> StorageResult<Self> {
        if spec.chunk_size == 0 || spec.chunk_size % 8 != 0 {
            return Err(StorageError::invalid_table(format!(
                "chunk_size must be a positive multiple of 8, got {}",
                spec.chunk_size
            )));
        }

        let mut builder = Self::builder(spec.name, spec.columns).kind(spec.kind.into());

        for window in &spec.existence {
            for &pos in &window.rows {
                if pos >= spec.chunk_size {
                    return Err(StorageError::invalid_table(format!(
                        "row {} outside window of {} rows at base {}",
                        pos, spec.chunk_size, window.base_rowid
                    )));
                }
            }
            builder = builder.existence(
                window.base_rowid,
                Bitmap::from_positions(spec.chunk_size, &window.rows),
            );
        }

        for rec in &spec.records {
            let column = builder
                .columns
                .iter()
                .position(|c| c.name == rec.column)
                .ok_or_else(|| {
                    StorageError::invalid_table(format!("unknown column \"{}\"", rec.column))
                })?;
            let elem_type = builder.columns[column].elem_type;
            let mut datums = Vec::with_capacity(rec.values.len());
            for value in &rec.values {
                if value.is_null() {
                    datums.push(None);
                    continue;
                }
                let datum = Datum::from_json(elem_type, value).ok_or_else(|| {
                    StorageError::invalid_table(format!(
                        "value {} is not a valid {} for column \"{}\"",
                        value, elem_type, rec.column
                    ))
                })?;
                datums.push(Some(datum));
            }
            builder = builder.record(
                column,
                ColumnRecord::new(rec.base_rowid, ColumnArray::from_datums(elem_type, &datums)),
            );
        }

        builder.build()
    }

    /// Load a JSON table description from disk
    pub fn load(path: &Path) -> StorageResult<Self> {
        Self::from_spec(TableSpec::load(path)?)
    }

    /// Access counters shared with every cursor opened on this set
    pub fn stats(&self) -> Arc<AccessStats> {
        Arc::clone(&self.stats)
    }

    fn store(&self, column: usize) -> StorageResult<&Store> {
        self.stores.get(column).ok_or_else(|| StorageError::NoSuchColumn {
            relation: self.name.clone(),
            column,
        })
    }
}

impl RelationSet for MemoryRelationSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RelationKind {
        self.kind
    }

    fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    fn begin_existence_scan(&self) -> StorageResult<Box<dyn ExistenceScan>> {
        Ok(Box::new(MemoryExistenceScan {
            table: Arc::clone(&self.existence),
            last: None,
        }))
    }

    fn range_scan(&self, column: usize, lo: RowId, hi: RowId) -> StorageResult<Vec<ColumnRecord>> {
        let store = self.store(column)?;
        self.stats.range_scans.fetch_add(1, Ordering::Relaxed);
        if lo >= hi {
            return Ok(Vec::new());
        }
        Ok(store.range(lo..hi).map(|(_, rec)| rec.clone()).collect())
    }

    fn open_cursor(&self, column: usize) -> StorageResult<Box<dyn ColumnCursor>> {
        let store = self.store(column)?;
        Ok(Box::new(MemoryCursor {
            store: Arc::clone(store),
            after: None,
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// Builder for `MemoryRelationSet`
pub struct MemoryRelationSetBuilder {
    name: String,
    kind: RelationKind,
    columns: Vec<ColumnDesc>,
    existence: BTreeMap<RowId, Bitmap>,
    stores: Vec<BTreeMap<RowId, ColumnRecord>>,
    error: Option<StorageError>,
}

impl MemoryRelationSetBuilder {
    /// Override the relation kind
    pub fn kind(mut self, kind: RelationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add an existence-table row
    pub fn existence(mut self, base_rowid: RowId, rowmap: Bitmap) -> Self {
        if self.existence.insert(base_rowid, rowmap).is_some() && self.error.is_none() {
            self.error = Some(StorageError::invalid_table(format!(
                "duplicate existence row at base {}",
                base_rowid
            )));
        }
        self
    }

    /// Add a column-store record
    pub fn record(mut self, column: usize, record: ColumnRecord) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(store) = self.stores.get_mut(column) else {
            self.error = Some(StorageError::NoSuchColumn {
                relation: self.name.clone(),
                column,
            });
            return self;
        };

        let overlaps_prev = store
            .range(..=record.base_rowid)
            .next_back()
            .is_some_and(|(_, prev)| prev.max_rowid() >= record.base_rowid);
        let overlaps_next = store
            .range((Bound::Excluded(record.base_rowid), Bound::Unbounded))
            .next()
            .is_some_and(|(base, _)| *base <= record.max_rowid());
        if overlaps_prev || overlaps_next {
            self.error = Some(StorageError::invalid_table(format!(
                "record at base {} overlaps another record of column {}",
                record.base_rowid, column
            )));
            return self;
        }

        store.insert(record.base_rowid, record);
        self
    }

    /// Finish building
    pub fn build(self) -> StorageResult<MemoryRelationSet> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(MemoryRelationSet {
            name: self.name,
            kind: self.kind,
            columns: self.columns,
            existence: Arc::new(self.existence),
            stores: self.stores.into_iter().map(Arc::new).collect(),
            stats: Arc::new(AccessStats::default()),
        })
    }
}

struct MemoryExistenceScan {
    table: Arc<BTreeMap<RowId, Bitmap>>,
    last: Option<RowId>,
}

impl ExistenceScan for MemoryExistenceScan {
    fn next(&mut self) -> StorageResult<Option<ExistenceRow>> {
        let lower = match self.last {
            Some(last) => Bound::Excluded(last),
            None => Bound::Unbounded,
        };
        let row = self
            .table
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(base, map)| ExistenceRow::new(*base, map.clone()));
        if let Some(ref row) = row {
            self.last = Some(row.base_rowid);
        }
        Ok(row)
    }
}

struct MemoryCursor {
    store: Store,
    /// `next` yields records with base strictly greater than this
    after: Option<RowId>,
    stats: Arc<AccessStats>,
}

impl ColumnCursor for MemoryCursor {
    fn seek_le(&mut self, rowid: RowId) -> StorageResult<Option<ColumnRecord>> {
        self.stats.seeks.fetch_add(1, Ordering::Relaxed);
        let found = self.store.range(..=rowid).next_back().map(|(_, rec)| rec.clone());
        self.after = Some(found.as_ref().map_or(rowid, |rec| rec.base_rowid));
        Ok(found)
    }

    fn seek_after(&mut self, rowid: RowId) -> StorageResult<()> {
        self.after = Some(rowid);
        Ok(())
    }

    fn next(&mut self) -> StorageResult<Option<ColumnRecord>> {
        let lower = match self.after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        let found = self
            .store
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(_, rec)| rec.clone());
        if let Some(ref rec) = found {
            self.after = Some(rec.base_rowid);
            self.stats.forward_reads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }
}

/// JSON description of a table for `MemoryRelationSet::from_spec`.
///
/// ```json
/// {
///   "name": "sales",
///   "chunk_size": 64,
///   "columns": [{"name": "qty", "type": "int32"}],
///   "existence": [{"base_rowid": 0, "rows": [0, 5, 63]}],
///   "records": [{"column": "qty", "base_rowid": 0, "values": [1, 2, null]}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub kind: TableKind,
    pub chunk_size: usize,
    pub columns: Vec<ColumnDesc>,
    #[serde(default)]
    pub existence: Vec<ExistenceSpec>,
    #[serde(default)]
    pub records: Vec<RecordSpec>,
}

impl TableSpec {
    /// Read a table description from a JSON file
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StorageError::invalid_table(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| StorageError::invalid_table(format!("invalid table JSON: {}", e)))
    }
}

/// Serialized relation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    ManagedColumnar,
    Foreign,
    Regular,
}

impl From<TableKind> for RelationKind {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::ManagedColumnar => RelationKind::ManagedColumnar,
            TableKind::Foreign => RelationKind::Foreign,
            TableKind::Regular => RelationKind::Regular,
        }
    }
}

/// One existence window: live row offsets relative to `base_rowid`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistenceSpec {
    pub base_rowid: RowId,
    pub rows: Vec<usize>,
}

/// One column-store record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSpec {
    pub column: String,
    pub base_rowid: RowId,
    pub values: Vec<serde_json::Value>,
}
