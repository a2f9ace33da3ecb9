//! TupleMaterializer: live bits into output rows
//!
//! Walks the current chunk's rowmap from the saved bit index. For each live
//! row every output column is resolved as:
//! - not required: null, storage untouched
//! - eagerly loaded into the chunk: read from the chunk buffer
//! - otherwise: `ColumnStoreCache::lookup`
//!
//! A drained chunk is released immediately. When nothing is ready the
//! pipeline is advanced, sleeping between polls while kernels are in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::observability::ScanMetrics;
use crate::storage::RowId;

use super::arena::ChunkId;
use super::cache::ColumnStoreCache;
use super::errors::{ScanError, ScanResult};
use super::pipeline::{Advance, ChunkPipeline};
use super::row::Row;

pub struct TupleMaterializer {
    current: Option<ChunkId>,
    index: usize,
    ncols: usize,
    required: BTreeSet<usize>,
    caches: BTreeMap<usize, ColumnStoreCache>,
    idle_poll: Duration,
    metrics: Arc<ScanMetrics>,
}

impl TupleMaterializer {
    pub fn new(
        ncols: usize,
        required: BTreeSet<usize>,
        caches: Vec<ColumnStoreCache>,
        idle_poll: Duration,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            current: None,
            index: 0,
            ncols,
            required,
            caches: caches.into_iter().map(|c| (c.column(), c)).collect(),
            idle_poll,
            metrics,
        }
    }

    /// Current chunk and the bit index the next search starts from
    pub fn position(&self) -> Option<(ChunkId, usize)> {
        self.current.map(|id| (id, self.index))
    }

    /// Forget the position and every cache window
    pub fn reset(&mut self) {
        self.current = None;
        self.index = 0;
        for cache in self.caches.values_mut() {
            cache.reset();
        }
    }

    /// Next visible row, or `None` at end of data
    pub fn next(&mut self, pipeline: &mut ChunkPipeline) -> ScanResult<Option<Row>> {
        loop {
            if let Some(id) = self.current {
                if let Some(row) = self.next_in_chunk(pipeline, id)? {
                    self.metrics.increment_rows_emitted();
                    return Ok(Some(row));
                }
                self.current = None;
                pipeline.consume(id)?;
            }

            if let Some(id) = pipeline.pop_ready() {
                self.current = Some(id);
                self.index = 0;
                continue;
            }

            match pipeline.advance()? {
                Advance::Ready => {}
                Advance::EndOfData => return Ok(None),
                Advance::InFlight => thread::sleep(self.idle_poll),
            }
        }
    }

    fn next_in_chunk(&mut self, pipeline: &ChunkPipeline, id: ChunkId) -> ScanResult<Option<Row>> {
        let chunk = pipeline
            .chunk(id)
            .ok_or_else(|| ScanError::invalid_state("current chunk was released"))?;
        let Some(bit) = chunk.rowmap.next_set(self.index) else {
            return Ok(None);
        };
        self.index = bit + 1;

        let rowid = chunk.base_rowid + bit as RowId;
        let mut values = Vec::with_capacity(self.ncols);
        for column in 0..self.ncols {
            let value = if !self.required.contains(&column) {
                None
            } else if let Some(eager) = chunk.eager_column(column) {
                eager.datum_at(bit)
            } else if let Some(cache) = self.caches.get_mut(&column) {
                cache.lookup(rowid)?
            } else {
                None
            };
            values.push(value);
        }
        Ok(Some(Row::new(rowid, values)))
    }
}
