//! ColumnStoreCache: point lookups by row-id over one column store
//!
//! Holds a single cached record (the window) plus the index cursor used to
//! refill it. Lookup policy, in order:
//!
//! 1. Window covers the row-id: serve from the cached array.
//! 2. Row-id lies past the window and before the next record already read
//!    from the cursor (or the cursor is exhausted): the row-id has no record,
//!    answer null.
//! 3. Row-id lies shortly past the window (within twice the window's item
//!    count) or a lookahead is held: read up to two records forward. Each
//!    record read that ends before the row-id becomes the window; one that
//!    covers it is served; one that starts after it is kept as the lookahead
//!    and null is returned.
//! 4. Otherwise reseek: greatest record with base `<=` row-id becomes the
//!    window and the cursor resumes strictly after it. If that record ends
//!    before the row-id, the following record is read as the lookahead so
//!    the rest of the gap is answered by rule 2.
//!
//! Invariant: every record with base `<= frontier` is either the window or
//! lies entirely before it, and the cursor (after the lookahead, if any)
//! yields records with base `> frontier` in key order.

use std::sync::Arc;

use crate::observability::{log_event, Event, ScanMetrics};
use crate::storage::{ColumnCursor, ColumnRecord, Datum, RowId};

use super::errors::ScanResult;

/// Records read forward before giving up and reseeking
const MAX_PROBE_RECORDS: usize = 2;

/// Single-window cache over one column store.
pub struct ColumnStoreCache {
    column: usize,
    store_name: String,
    cursor: Box<dyn ColumnCursor>,
    window: Option<ColumnRecord>,
    /// Highest row-id known to need no further cursor reads
    frontier: Option<RowId>,
    /// Next record after the frontier, already read from the cursor
    lookahead: Option<ColumnRecord>,
    /// Cursor returned end after the frontier
    exhausted: bool,
    metrics: Arc<ScanMetrics>,
}

impl ColumnStoreCache {
    pub fn new(
        column: usize,
        store_name: impl Into<String>,
        cursor: Box<dyn ColumnCursor>,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            column,
            store_name: store_name.into(),
            cursor,
            window: None,
            frontier: None,
            lookahead: None,
            exhausted: false,
            metrics,
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Row-id span of the current window, inclusive
    pub fn window(&self) -> Option<(RowId, RowId)> {
        self.window.as_ref().map(|w| (w.base_rowid, w.max_rowid()))
    }

    /// Drop the window and any read-ahead state
    pub fn reset(&mut self) {
        self.window = None;
        self.frontier = None;
        self.lookahead = None;
        self.exhausted = false;
    }

    /// Value of this column at `rowid`; `None` means null
    pub fn lookup(&mut self, rowid: RowId) -> ScanResult<Option<Datum>> {
        if let Some(window) = &self.window {
            if window.covers(rowid) {
                self.metrics.increment_cache_hits();
                return Ok(serve(window, rowid));
            }
        }

        if let Some(frontier) = self.frontier {
            if rowid > frontier {
                if self.exhausted
                    || self.lookahead.as_ref().is_some_and(|r| r.base_rowid > rowid)
                {
                    self.metrics.increment_cache_gap_hits();
                    return Ok(None);
                }
                if self.within_probe_range(rowid) {
                    if let Some(value) = self.probe(rowid)? {
                        return Ok(value);
                    }
                }
            }
        }

        self.reseek(rowid)
    }

    fn within_probe_range(&self, rowid: RowId) -> bool {
        if self.lookahead.is_some() {
            return true;
        }
        match &self.window {
            Some(window) => {
                let nitems = window.values.nitems() as RowId;
                rowid < window.max_rowid() + 2 * nitems
            }
            None => true,
        }
    }

    /// Forward probe. `Some(answer)` if resolved, `None` to fall back to reseek.
    fn probe(&mut self, rowid: RowId) -> ScanResult<Option<Option<Datum>>> {
        for _ in 0..MAX_PROBE_RECORDS {
            let record = match self.lookahead.take() {
                Some(record) => record,
                None => match self.cursor.next()? {
                    Some(record) => record,
                    None => {
                        self.exhausted = true;
                        self.metrics.increment_cache_gap_hits();
                        return Ok(Some(None));
                    }
                },
            };

            if record.base_rowid > rowid {
                self.lookahead = Some(record);
                self.metrics.increment_cache_gap_hits();
                return Ok(Some(None));
            }

            let covers = record.covers(rowid);
            self.adopt(record);
            if covers {
                self.metrics.increment_cache_probe_hits();
                return Ok(Some(self.window.as_ref().and_then(|w| serve(w, rowid))));
            }
        }
        Ok(None)
    }

    fn reseek(&mut self, rowid: RowId) -> ScanResult<Option<Datum>> {
        self.metrics.increment_cache_reseeks();
        log_event(
            Event::CacheReseek,
            &[("column", &self.store_name), ("rowid", &rowid.to_string())],
        );

        self.lookahead = None;
        self.exhausted = false;
        match self.cursor.seek_le(rowid)? {
            Some(record) => {
                let end = record.base_rowid.max(record.max_rowid());
                self.cursor.seek_after(end)?;
                let value = serve(&record, rowid);
                self.window = Some(record);
                if rowid > end {
                    // No record starts in (end, rowid]: the gap extends to
                    // whatever the cursor yields next.
                    match self.cursor.next()? {
                        Some(next) => self.lookahead = Some(next),
                        None => self.exhausted = true,
                    }
                    self.frontier = Some(rowid);
                } else {
                    self.frontier = Some(end);
                }
                Ok(value)
            }
            None => {
                self.cursor.seek_after(rowid)?;
                self.window = None;
                self.frontier = Some(rowid);
                Ok(None)
            }
        }
    }

    /// Replace the window with a record read forward from the cursor
    fn adopt(&mut self, record: ColumnRecord) {
        self.frontier = Some(record.base_rowid.max(record.max_rowid()));
        self.window = Some(record);
    }
}

fn serve(record: &ColumnRecord, rowid: RowId) -> Option<Datum> {
    if !record.covers(rowid) {
        return None;
    }
    record.values.datum_at((rowid - record.base_rowid) as usize)
}
