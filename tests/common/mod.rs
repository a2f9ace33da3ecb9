//! Shared fixtures for integration tests
//!
//! - Table builders over `MemoryRelationSet`
//! - A scripted offload device whose executors refuse, delay and count
//!   submissions on demand

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chunkscan::offload::{
    ExecutionHandle, ExecutionStatus, KernelInput, KernelOutput, OffloadDevice, OffloadError,
    OffloadExecutor, OffloadResult,
};
use chunkscan::scan::{Row, ScanSession};
use chunkscan::storage::{
    Bitmap, ColumnArray, ColumnDesc, ColumnRecord, Datum, ElementType, MemoryRelationSet,
    MemoryRelationSetBuilder, RowId,
};

// =============================================================================
// Tables
// =============================================================================

/// int64 array with `values[i] = start + i`
pub fn int64_run(start: i64, n: usize) -> ColumnArray {
    let datums: Vec<Option<Datum>> = (0..n as i64).map(|i| Some(Datum::Int64(start + i))).collect();
    ColumnArray::from_datums(ElementType::Int64, &datums)
}

pub fn int32_values(values: &[Option<i32>]) -> ColumnArray {
    let datums: Vec<Option<Datum>> = values.iter().map(|v| v.map(Datum::Int32)).collect();
    ColumnArray::from_datums(ElementType::Int32, &datums)
}

/// Table `t(v int64)` with `windows` fully live windows of `chunk_size` rows
/// and one record per window holding `v = rowid`.
pub fn dense_table(chunk_size: usize, windows: usize) -> MemoryRelationSet {
    let mut builder =
        MemoryRelationSet::builder("t", vec![ColumnDesc::new("v", ElementType::Int64)]);
    for w in 0..windows {
        let base = (w * chunk_size) as RowId;
        builder = builder
            .existence(base, Bitmap::filled(chunk_size))
            .record(0, ColumnRecord::new(base, int64_run(base, chunk_size)));
    }
    builder.build().unwrap()
}

/// Builder for a two-column table `t(k int32, v int64)`
pub fn two_column_builder() -> MemoryRelationSetBuilder {
    MemoryRelationSet::builder(
        "t",
        vec![
            ColumnDesc::new("k", ElementType::Int32),
            ColumnDesc::new("v", ElementType::Int64),
        ],
    )
}

/// Drain a session, returning every row
pub fn collect_rows(session: &mut ScanSession) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = session.next().unwrap() {
        rows.push(row);
    }
    rows
}

pub fn rowids(rows: &[Row]) -> Vec<RowId> {
    rows.iter().map(|r| r.rowid).collect()
}

// =============================================================================
// Scripted offload device
// =============================================================================

/// Counters shared between a test and the executors it scripted
#[derive(Debug, Default)]
pub struct ExecutorLog {
    pub submits: AtomicUsize,
    pub refusals: AtomicUsize,
    pub completions: AtomicUsize,
    pub discards: AtomicUsize,
    /// While set, every submission is refused
    pub refuse: AtomicBool,
    /// Number of upcoming submissions to refuse
    pub refuse_next: AtomicUsize,
}

impl ExecutorLog {
    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn refusals(&self) -> usize {
        self.refusals.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

pub type Predicate = Arc<dyn Fn(&KernelInput) -> Bitmap + Send + Sync>;

/// Behavior of executors built by a `ScriptedDevice`
#[derive(Clone)]
pub struct Script {
    /// Polls before an execution reports completion
    pub polls_to_complete: usize,
    /// Executions allowed in flight at once
    pub capacity: usize,
    /// Rows that pass; defaults to every live row
    pub predicate: Option<Predicate>,
    /// Fail every poll with an execution error
    pub fail_polls: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            polls_to_complete: 1,
            capacity: usize::MAX,
            predicate: None,
            fail_polls: false,
        }
    }
}

pub struct ScriptedDevice {
    pub script: Script,
    pub log: Arc<ExecutorLog>,
}

impl ScriptedDevice {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(ExecutorLog::default()),
        }
    }
}

impl OffloadDevice for ScriptedDevice {
    fn build_program(
        &self,
        source: &str,
        _work_group_size: usize,
    ) -> OffloadResult<Box<dyn OffloadExecutor>> {
        if source.trim().is_empty() {
            return Err(OffloadError::BuildFailed("empty kernel source".into()));
        }
        Ok(Box::new(ScriptedExecutor {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            next_handle: 0,
            running: HashMap::new(),
        }))
    }
}

pub struct ScriptedExecutor {
    script: Script,
    log: Arc<ExecutorLog>,
    next_handle: u64,
    /// handle -> (polls remaining, result rowmap)
    running: HashMap<u64, (usize, Bitmap)>,
}

impl OffloadExecutor for ScriptedExecutor {
    fn submit(&mut self, input: KernelInput) -> OffloadResult<ExecutionHandle> {
        let refuse_once = self
            .log
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse_once
            || self.log.refuse.load(Ordering::SeqCst)
            || self.running.len() >= self.script.capacity
        {
            self.log.refusals.fetch_add(1, Ordering::SeqCst);
            return Err(OffloadError::ResourceExhausted("no free queue slot".into()));
        }

        let result = match &self.script.predicate {
            Some(predicate) => predicate(&input),
            None => input.rowmap.clone(),
        };
        self.next_handle += 1;
        self.running
            .insert(self.next_handle, (self.script.polls_to_complete, result));
        self.log.submits.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionHandle(self.next_handle))
    }

    fn poll(&mut self, handle: ExecutionHandle) -> OffloadResult<ExecutionStatus> {
        if self.script.fail_polls {
            return Err(OffloadError::ExecutionFailed("device lost".into()));
        }
        let entry = self
            .running
            .get_mut(&handle.0)
            .ok_or(OffloadError::UnknownHandle(handle.0))?;
        if entry.0 > 1 {
            entry.0 -= 1;
            return Ok(ExecutionStatus::Running);
        }
        let (_, rowmap) = self
            .running
            .remove(&handle.0)
            .ok_or(OffloadError::UnknownHandle(handle.0))?;
        self.log.completions.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionStatus::Complete(KernelOutput { rowmap }))
    }

    fn discard(&mut self, handle: ExecutionHandle) {
        if self.running.remove(&handle.0).is_some() {
            self.log.discards.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn in_flight(&self) -> usize {
        self.running.len()
    }
}
