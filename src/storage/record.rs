//! Persisted row shapes of the existence table and the column stores
//!
//! ```text
//! existence table:  (int64 base_rowid, bitmap[CHUNK_SIZE])
//! column store:     (int64 base_rowid, value array, optional null bitmap)
//! ```
//!
//! A column record covers row-ids `[base_rowid, base_rowid + nitems - 1]`.

use super::bitmap::Bitmap;
use super::types::{Datum, ElementType, RowId};

/// One existence-table row: the liveness map of a row-id window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistenceRow {
    /// First row-id of the window
    pub base_rowid: RowId,
    /// Bit `i` set means row-id `base_rowid + i` exists
    pub rowmap: Bitmap,
}

impl ExistenceRow {
    pub fn new(base_rowid: RowId, rowmap: Bitmap) -> Self {
        Self { base_rowid, rowmap }
    }
}

/// Element storage of a column array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayData {
    /// Dense little-endian buffer, `nitems * width` bytes. Null slots keep
    /// their width.
    Fixed(Vec<u8>),
    /// One byte string per item.
    Variable(Vec<Vec<u8>>),
}

/// A stored value array.
///
/// The layout fields mirror what a generic array container carries; the scan
/// only accepts one-dimensional, zero-based arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnArray {
    pub elem_type: ElementType,
    pub ndim: usize,
    pub lower_bound: i32,
    pub data: ArrayData,
    /// Set bit = NULL. `None` means no nulls in this array.
    pub nulls: Option<Bitmap>,
}

impl ColumnArray {
    /// Build a one-dimensional array from optional datums.
    ///
    /// Datums of a different element type are stored as nulls.
    pub fn from_datums(elem_type: ElementType, values: &[Option<Datum>]) -> Self {
        let mut nulls = Bitmap::new(values.len());
        let mut any_null = false;
        let data = match elem_type.fixed_width() {
            Some(width) => {
                let mut buf = vec![0u8; width * values.len()];
                for (i, value) in values.iter().enumerate() {
                    match value {
                        Some(d) if d.elem_type() == elem_type => {
                            buf[i * width..(i + 1) * width].copy_from_slice(&d.encode());
                        }
                        _ => {
                            nulls.set(i);
                            any_null = true;
                        }
                    }
                }
                ArrayData::Fixed(buf)
            }
            None => {
                let mut items = Vec::with_capacity(values.len());
                for (i, value) in values.iter().enumerate() {
                    match value {
                        Some(d) if d.elem_type() == elem_type => items.push(d.encode()),
                        _ => {
                            nulls.set(i);
                            any_null = true;
                            items.push(Vec::new());
                        }
                    }
                }
                ArrayData::Variable(items)
            }
        };
        Self {
            elem_type,
            ndim: 1,
            lower_bound: 0,
            data,
            nulls: any_null.then_some(nulls),
        }
    }

    /// Number of items.
    pub fn nitems(&self) -> usize {
        match &self.data {
            ArrayData::Fixed(buf) => match self.elem_type.fixed_width() {
                Some(width) if width > 0 => buf.len() / width,
                _ => 0,
            },
            ArrayData::Variable(items) => items.len(),
        }
    }

    /// Whether item `index` is null. Out-of-range items are null.
    pub fn is_null(&self, index: usize) -> bool {
        if index >= self.nitems() {
            return true;
        }
        match &self.nulls {
            Some(nulls) => index < nulls.len() && nulls.get(index),
            None => false,
        }
    }

    /// Positional access honoring the null bitmap.
    pub fn datum_at(&self, index: usize) -> Option<Datum> {
        if self.is_null(index) {
            return None;
        }
        match &self.data {
            ArrayData::Fixed(buf) => {
                let width = self.elem_type.fixed_width()?;
                Datum::decode(self.elem_type, buf.get(index * width..(index + 1) * width)?)
            }
            ArrayData::Variable(items) => Datum::decode(self.elem_type, items.get(index)?),
        }
    }

    /// Raw fixed-width bytes, if this is a fixed-width array.
    pub fn fixed_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::Fixed(buf) => Some(buf),
            ArrayData::Variable(_) => None,
        }
    }
}

/// One column-store row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRecord {
    pub base_rowid: RowId,
    pub values: ColumnArray,
}

impl ColumnRecord {
    pub fn new(base_rowid: RowId, values: ColumnArray) -> Self {
        Self { base_rowid, values }
    }

    /// Last row-id covered by this record (inclusive).
    ///
    /// An empty array covers nothing; its upper bound sits below its base.
    pub fn max_rowid(&self) -> RowId {
        self.base_rowid + self.values.nitems() as RowId - 1
    }

    /// Whether `rowid` falls inside this record's span.
    pub fn covers(&self, rowid: RowId) -> bool {
        rowid >= self.base_rowid && rowid <= self.max_rowid()
    }
}
