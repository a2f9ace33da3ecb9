//! ChunkLoader: existence windows into chunks
//!
//! Reads the existence table in row-id order and turns each row into a
//! chunk. When the plan gates output on kernel evaluation, the clause
//! columns are copied into dense per-chunk buffers before the chunk is
//! queued; otherwise the chunk goes straight to ready and its columns are
//! resolved lazily at materialization.
//!
//! Layout checks on every clause-column record are fatal:
//! - element type must match the column
//! - one dimension, lower bound 0
//! - offset within the chunk must be byte aligned (multiple of 8)
//! - the record must fit inside the chunk window
//! - the element type must be fixed width

use std::sync::Arc;

use crate::observability::{log_event, Event, ScanMetrics};
use crate::storage::{
    ArrayData, Bitmap, ColumnRecord, ElementType, ExistenceScan, RelationSet, RowId,
};

use super::arena::ChunkArena;
use super::chunk::{Chunk, ChunkEvent, EagerColumn};
use super::config::PlanConfig;
use super::errors::{ScanError, ScanResult};
use super::pipeline::PipelineQueues;

/// Produces chunks from the existence table.
pub struct ChunkLoader {
    relset: Arc<dyn RelationSet>,
    scan: Box<dyn ExistenceScan>,
    chunk_size: usize,
    /// Clause columns and their element types, in attribute order
    eager_cols: Vec<(usize, ElementType)>,
    /// Whether chunks need kernel evaluation before output
    gated: bool,
    /// Lowest base row-id the next window may start at
    next_min_base: Option<RowId>,
    exhausted: bool,
    metrics: Arc<ScanMetrics>,
}

impl ChunkLoader {
    pub fn new(
        relset: Arc<dyn RelationSet>,
        plan: &PlanConfig,
        chunk_size: usize,
        metrics: Arc<ScanMetrics>,
    ) -> ScanResult<Self> {
        let gated = plan.requires_offload();
        let mut eager_cols = Vec::new();
        if gated {
            for &column in &plan.clause_cols {
                let desc = relset.columns().get(column).ok_or_else(|| {
                    ScanError::invalid_config(format!(
                        "clause column {} does not exist in \"{}\"",
                        column + 1,
                        relset.name()
                    ))
                })?;
                eager_cols.push((column, desc.elem_type));
            }
        }
        let scan = relset.begin_existence_scan()?;

        Ok(Self {
            relset,
            scan,
            chunk_size,
            eager_cols,
            gated,
            next_min_base: None,
            exhausted: false,
            metrics,
        })
    }

    /// Whether the existence table has been read to the end
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Restart from the first existence window
    pub fn restart(&mut self) -> ScanResult<()> {
        self.scan = self.relset.begin_existence_scan()?;
        self.next_min_base = None;
        self.exhausted = false;
        Ok(())
    }

    /// Load up to `max_chunks` chunks into `arena`, queueing each as pending
    /// (gated) or ready. Returns the number of chunks produced.
    pub fn load(
        &mut self,
        arena: &mut ChunkArena,
        queues: &mut PipelineQueues,
        max_chunks: usize,
    ) -> ScanResult<usize> {
        let mut count = 0;
        while count < max_chunks {
            let Some(mut chunk) = self.load_one()? else {
                break;
            };
            let state = chunk
                .apply(ChunkEvent::Queue { gated: self.gated })
                .ok_or_else(|| ScanError::invalid_state("freshly loaded chunk cannot be queued"))?;

            log_event(
                Event::ChunkLoaded,
                &[
                    ("base_rowid", &chunk.base_rowid.to_string()),
                    ("live_rows", &chunk.live_rows().to_string()),
                    ("state", state.as_str()),
                ],
            );

            let id = arena.alloc(chunk);
            if self.gated {
                queues.pending.push_back(id);
            } else {
                queues.ready.push_back(id);
            }
            count += 1;
        }
        Ok(count)
    }

    /// Read the next existence window and build its chunk
    pub fn load_one(&mut self) -> ScanResult<Option<Chunk>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(row) = self.scan.next()? else {
            self.exhausted = true;
            log_event(Event::ExistenceExhausted, &[("relation", self.relset.name())]);
            return Ok(None);
        };

        let existence_name = format!("{}.rowid", self.relset.name());
        if row.rowmap.len() != self.chunk_size {
            return Err(ScanError::layout_mismatch(
                &existence_name,
                format!(
                    "existence bitmap at base {} has {} bits, expected {}",
                    row.base_rowid,
                    row.rowmap.len(),
                    self.chunk_size
                ),
            ));
        }
        if let Some(min) = self.next_min_base {
            if row.base_rowid < min {
                return Err(ScanError::layout_mismatch(
                    &existence_name,
                    format!(
                        "existence window at base {} overlaps the previous window ending at {}",
                        row.base_rowid,
                        min - 1
                    ),
                ));
            }
        }
        self.next_min_base = Some(row.base_rowid + self.chunk_size as RowId);

        let mut chunk = Chunk::new(row.base_rowid, row.rowmap);
        for &(column, elem_type) in &self.eager_cols {
            let eager = self.load_column(chunk.base_rowid, column, elem_type)?;
            chunk.eager.insert(column, eager);
        }
        self.metrics.increment_chunks_loaded();
        Ok(Some(chunk))
    }

    /// Materialize `column` for the window starting at `base_rowid`
    fn load_column(
        &self,
        base_rowid: RowId,
        column: usize,
        elem_type: ElementType,
    ) -> ScanResult<EagerColumn> {
        let store = self.relset.column_store_name(column);
        let mut eager = EagerColumn::zeroed(elem_type, self.chunk_size).ok_or_else(|| {
            ScanError::layout_mismatch(
                &store,
                format!("element type {} is not fixed width", elem_type),
            )
        })?;

        let records = self.relset.range_scan(
            column,
            base_rowid,
            base_rowid + self.chunk_size as RowId,
        )?;

        let mut covered = Bitmap::new(self.chunk_size);
        for record in &records {
            self.copy_record(&store, base_rowid, record, &mut eager, &mut covered)?;
        }

        if records.is_empty() {
            eager.nulls = Some(Bitmap::filled(self.chunk_size));
        } else {
            for i in 0..self.chunk_size {
                if !covered.get(i) {
                    eager.set_null(i, self.chunk_size);
                }
            }
        }

        self.metrics.increment_eager_column_loads();
        log_event(
            Event::ColumnEagerLoad,
            &[
                ("base_rowid", &base_rowid.to_string()),
                ("column", &store),
                ("records", &records.len().to_string()),
            ],
        );
        Ok(eager)
    }

    fn copy_record(
        &self,
        store: &str,
        base_rowid: RowId,
        record: &ColumnRecord,
        eager: &mut EagerColumn,
        covered: &mut Bitmap,
    ) -> ScanResult<()> {
        let values = &record.values;
        let at = |reason: String| {
            ScanError::layout_mismatch(store, format!("record at base {}: {}", record.base_rowid, reason))
        };

        if values.elem_type != eager.elem_type {
            return Err(at(format!(
                "element type {}, expected {}",
                values.elem_type, eager.elem_type
            )));
        }
        if values.ndim != 1 {
            return Err(at(format!("{} dimensions, expected 1", values.ndim)));
        }
        if values.lower_bound != 0 {
            return Err(at(format!("lower bound {}, expected 0", values.lower_bound)));
        }

        let offset = record.base_rowid - base_rowid;
        if offset < 0 || offset % 8 != 0 {
            return Err(at(format!("offset {} within chunk is not byte aligned", offset)));
        }
        let offset = offset as usize;
        let nitems = values.nitems();
        if offset + nitems > self.chunk_size {
            return Err(at(format!(
                "{} items at offset {} overrun the chunk of {} rows",
                nitems, offset, self.chunk_size
            )));
        }

        let width = eager.elem_type.fixed_width().unwrap_or(0);
        let bytes = match &values.data {
            ArrayData::Fixed(bytes) if bytes.len() == nitems * width => bytes,
            ArrayData::Fixed(bytes) => {
                return Err(at(format!(
                    "{} value bytes for {} items of width {}",
                    bytes.len(),
                    nitems,
                    width
                )))
            }
            ArrayData::Variable(_) => return Err(at("variable-width values".to_string())),
        };

        eager.values[offset * width..(offset + nitems) * width].copy_from_slice(bytes);
        if let Some(nulls) = &values.nulls {
            if nulls.count_ones() > 0 {
                eager
                    .nulls
                    .get_or_insert_with(|| Bitmap::new(self.chunk_size))
                    .union_at(offset, nulls);
            }
        }
        covered.set_range(offset..offset + nitems);
        Ok(())
    }
}
