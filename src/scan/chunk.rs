//! Chunk: one row-id window, its liveness map and eagerly loaded columns
//!
//! Chunk lifecycle:
//!
//! ```text
//! Loaded ──(gated)──> Pending ──submit──> Executing ──complete──> Ready ──drain──> Consumed
//!    │                   ^                    │
//!    │                   └────── refused ─────┘ (never leaves Pending)
//!    └──────(ungated)──────────────────────────────────────────> Ready
//! ```
//!
//! Transitions are pure: `ChunkState::transition` either yields the next
//! state or rejects the event.

use std::collections::BTreeMap;

use crate::offload::{KernelColumn, KernelInput};
use crate::storage::{Bitmap, Datum, ElementType, RowId};

/// Pipeline stage of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Built by the loader, not yet queued
    Loaded,
    /// Waiting for kernel submission
    Pending,
    /// Kernel submitted, awaiting completion
    Executing,
    /// Safe to materialize
    Ready,
    /// Every live row has been emitted
    Consumed,
}

/// Events driving `ChunkState` transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Loader queues the chunk; `gated` means kernel evaluation is required
    Queue { gated: bool },
    /// Kernel submission accepted
    Submitted,
    /// Kernel submission refused for lack of resources
    Refused,
    /// Kernel execution finished
    Completed,
    /// Materializer emitted the last live row
    Drained,
}

impl ChunkState {
    /// Next state for `event`, or `None` if the event is not valid here.
    pub fn transition(self, event: ChunkEvent) -> Option<ChunkState> {
        use ChunkEvent::*;
        use ChunkState::*;
        match (self, event) {
            (Loaded, Queue { gated: true }) => Some(Pending),
            (Loaded, Queue { gated: false }) => Some(Ready),
            (Pending, Submitted) => Some(Executing),
            (Pending, Refused) => Some(Pending),
            (Executing, Completed) => Some(Ready),
            (Ready, Drained) => Some(Consumed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Loaded => "loaded",
            ChunkState::Pending => "pending",
            ChunkState::Executing => "executing",
            ChunkState::Ready => "ready",
            ChunkState::Consumed => "consumed",
        }
    }
}

/// Dense buffer of one eagerly loaded fixed-width column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerColumn {
    pub elem_type: ElementType,
    /// `chunk_size * width` little-endian bytes
    pub values: Vec<u8>,
    /// Set bit = NULL. Allocated on the first null seen.
    pub nulls: Option<Bitmap>,
}

impl EagerColumn {
    /// Zeroed buffer with no nulls. Returns `None` for variable-width types.
    pub fn zeroed(elem_type: ElementType, chunk_size: usize) -> Option<Self> {
        let width = elem_type.fixed_width()?;
        Some(Self {
            elem_type,
            values: vec![0u8; width * chunk_size],
            nulls: None,
        })
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.as_ref().is_some_and(|n| n.get(index))
    }

    /// Mark `index` null, allocating the null bitmap on demand
    pub fn set_null(&mut self, index: usize, chunk_size: usize) {
        self.nulls
            .get_or_insert_with(|| Bitmap::new(chunk_size))
            .set(index);
    }

    /// Value at `index`, or `None` if null
    pub fn datum_at(&self, index: usize) -> Option<Datum> {
        if self.is_null(index) {
            return None;
        }
        let width = self.elem_type.fixed_width()?;
        let start = index * width;
        self.values
            .get(start..start + width)
            .and_then(|bytes| Datum::decode(self.elem_type, bytes))
    }
}

/// A fixed-size window of row-ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub base_rowid: RowId,
    /// Bit `i` set = row-id `base_rowid + i` is live (and visible once Ready)
    pub rowmap: Bitmap,
    /// Eagerly loaded clause columns, keyed by attribute index
    pub eager: BTreeMap<usize, EagerColumn>,
    state: ChunkState,
}

impl Chunk {
    pub fn new(base_rowid: RowId, rowmap: Bitmap) -> Self {
        Self {
            base_rowid,
            rowmap,
            eager: BTreeMap::new(),
            state: ChunkState::Loaded,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Apply `event`, returning the new state or `None` (state unchanged)
    pub fn apply(&mut self, event: ChunkEvent) -> Option<ChunkState> {
        let next = self.state.transition(event)?;
        self.state = next;
        Some(next)
    }

    pub fn size(&self) -> usize {
        self.rowmap.len()
    }

    /// Row-id one past the end of the window
    pub fn end_rowid(&self) -> RowId {
        self.base_rowid + self.rowmap.len() as RowId
    }

    pub fn live_rows(&self) -> usize {
        self.rowmap.count_ones()
    }

    pub fn eager_column(&self, column: usize) -> Option<&EagerColumn> {
        self.eager.get(&column)
    }

    /// Owned copy of the rowmap and clause buffers for kernel submission
    pub fn kernel_input(&self) -> KernelInput {
        KernelInput {
            chunk_base_rowid: self.base_rowid,
            rowmap: self.rowmap.clone(),
            columns: self
                .eager
                .iter()
                .map(|(column, eager)| KernelColumn {
                    column: *column,
                    elem_type: eager.elem_type,
                    values: eager.values.clone(),
                    nulls: eager.nulls.clone(),
                })
                .collect(),
        }
    }

    /// Approximate bytes held by the chunk's buffers
    pub fn footprint(&self) -> usize {
        self.rowmap.as_bytes().len()
            + self
                .eager
                .values()
                .map(|e| e.values.len() + e.nulls.as_ref().map_or(0, |n| n.as_bytes().len()))
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gated_path() {
        let mut state = ChunkState::Loaded;
        for event in [
            ChunkEvent::Queue { gated: true },
            ChunkEvent::Refused,
            ChunkEvent::Submitted,
            ChunkEvent::Completed,
            ChunkEvent::Drained,
        ] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, ChunkState::Consumed);
    }

    #[test]
    fn test_ungated_path_skips_execution() {
        let state = ChunkState::Loaded
            .transition(ChunkEvent::Queue { gated: false })
            .unwrap();
        assert_eq!(state, ChunkState::Ready);
        assert_eq!(state.transition(ChunkEvent::Submitted), None);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert_eq!(ChunkState::Pending.transition(ChunkEvent::Completed), None);
        assert_eq!(ChunkState::Executing.transition(ChunkEvent::Drained), None);
        assert_eq!(ChunkState::Consumed.transition(ChunkEvent::Drained), None);
    }

    #[test]
    fn test_apply_leaves_state_on_reject() {
        let mut chunk = Chunk::new(0, Bitmap::new(8));
        assert_eq!(chunk.apply(ChunkEvent::Completed), None);
        assert_eq!(chunk.state(), ChunkState::Loaded);
    }

    #[test]
    fn test_eager_column_nulls() {
        let mut col = EagerColumn::zeroed(ElementType::Int32, 8).unwrap();
        col.values[4..8].copy_from_slice(&7i32.to_le_bytes());
        assert_eq!(col.datum_at(1), Some(Datum::Int32(7)));
        assert!(col.nulls.is_none());

        col.set_null(1, 8);
        assert_eq!(col.datum_at(1), None);
        assert!(!col.is_null(0));
    }

    #[test]
    fn test_variable_width_has_no_dense_buffer() {
        assert!(EagerColumn::zeroed(ElementType::Text, 8).is_none());
    }

    #[test]
    fn test_kernel_input_copies_clause_columns() {
        let mut chunk = Chunk::new(64, Bitmap::from_positions(8, &[1, 2]));
        chunk
            .eager
            .insert(2, EagerColumn::zeroed(ElementType::Int64, 8).unwrap());
        let input = chunk.kernel_input();
        assert_eq!(input.chunk_base_rowid, 64);
        assert_eq!(input.rowmap.count_ones(), 2);
        assert_eq!(input.column(2).unwrap().values.len(), 64);
        assert_eq!(chunk.end_rowid(), 72);
    }
}
