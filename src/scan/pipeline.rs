//! ChunkPipeline: pending → executing → ready
//!
//! Each chunk sits in exactly one queue at a time. `advance` is invoked when
//! the ready queue runs dry:
//!
//! 1. Poll executing chunks; completed ones have their rowmap intersected
//!    with the kernel's result and move to ready.
//! 2. Submit pending chunks. A submission refused for lack of resources puts
//!    the chunk back at the head of pending and stops submitting until the
//!    next call.
//! 3. Top up from the loader while `pending + executing` is below the
//!    outstanding-chunk budget (for ungated plans, while `ready` is), then
//!    submit again.
//!
//! End of data is reported once the existence table is exhausted and both
//! pending and executing are empty.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::observability::{log_event, Event, ScanMetrics};
use crate::offload::{ExecutionHandle, ExecutionStatus, OffloadExecutor};

use super::arena::{ArenaStats, ChunkArena, ChunkId};
use super::chunk::{Chunk, ChunkEvent};
use super::errors::{ScanError, ScanResult};
use super::loader::ChunkLoader;

/// The three ordered chunk queues.
#[derive(Debug, Default)]
pub struct PipelineQueues {
    pub pending: VecDeque<ChunkId>,
    pub executing: VecDeque<(ChunkId, ExecutionHandle)>,
    pub ready: VecDeque<ChunkId>,
}

impl PipelineQueues {
    /// Chunks in `pending ∪ executing`
    pub fn outstanding(&self) -> usize {
        self.pending.len() + self.executing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.executing.is_empty() && self.ready.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outstanding() + self.ready.len()
    }
}

/// Outcome of one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// At least one chunk is ready
    Ready,
    /// Nothing ready yet; executions are in flight or were deferred
    InFlight,
    /// No chunk will ever become ready again
    EndOfData,
}

pub struct ChunkPipeline {
    arena: ChunkArena,
    queues: PipelineQueues,
    loader: ChunkLoader,
    executor: Option<Box<dyn OffloadExecutor>>,
    /// Whether chunks pass through kernel execution
    gated: bool,
    max_async_chunks: usize,
    metrics: Arc<ScanMetrics>,
}

impl ChunkPipeline {
    pub fn new(
        loader: ChunkLoader,
        executor: Option<Box<dyn OffloadExecutor>>,
        gated: bool,
        max_async_chunks: usize,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            arena: ChunkArena::new(),
            queues: PipelineQueues::default(),
            loader,
            executor,
            gated,
            max_async_chunks,
            metrics,
        }
    }

    pub fn queues(&self) -> &PipelineQueues {
        &self.queues
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.arena.get(id)
    }

    pub fn is_exhausted(&self) -> bool {
        self.loader.is_exhausted()
    }

    /// Take the oldest ready chunk
    pub fn pop_ready(&mut self) -> Option<ChunkId> {
        self.queues.ready.pop_front()
    }

    /// Release a chunk the materializer has fully drained.
    ///
    /// The chunk is released even when it was not ready, so the arena stays
    /// balanced, but the rejected transition is reported.
    pub fn consume(&mut self, id: ChunkId) -> ScanResult<()> {
        let drained = self
            .arena
            .get_mut(id)
            .and_then(|chunk| chunk.apply(ChunkEvent::Drained));
        let chunk = self
            .arena
            .release(id)
            .ok_or_else(|| ScanError::invalid_state("consumed chunk is not live"))?;
        self.metrics.increment_chunks_released();
        log_event(
            Event::ChunkReleased,
            &[("base_rowid", &chunk.base_rowid.to_string())],
        );
        match drained {
            Some(_) => Ok(()),
            None => Err(ScanError::invalid_state(format!(
                "chunk at row-id {} drained while {}",
                chunk.base_rowid,
                chunk.state().as_str()
            ))),
        }
    }

    /// Drive the pipeline one step
    pub fn advance(&mut self) -> ScanResult<Advance> {
        self.poll_executing()?;
        self.submit_pending()?;

        if !self.loader.is_exhausted() {
            let in_pipeline = if self.gated {
                self.queues.outstanding()
            } else {
                self.queues.ready.len()
            };
            let room = self.max_async_chunks.saturating_sub(in_pipeline);
            if room > 0 {
                self.loader.load(&mut self.arena, &mut self.queues, room)?;
                self.submit_pending()?;
            }
        }

        if !self.queues.ready.is_empty() {
            Ok(Advance::Ready)
        } else if self.loader.is_exhausted() && self.queues.outstanding() == 0 {
            Ok(Advance::EndOfData)
        } else {
            Ok(Advance::InFlight)
        }
    }

    fn poll_executing(&mut self) -> ScanResult<()> {
        if self.queues.executing.is_empty() {
            return Ok(());
        }
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| ScanError::invalid_state("chunks executing without an executor"))?;

        let mut still_running = VecDeque::with_capacity(self.queues.executing.len());
        while let Some((id, handle)) = self.queues.executing.pop_front() {
            match executor.poll(handle) {
                Ok(ExecutionStatus::Running) => still_running.push_back((id, handle)),
                Ok(ExecutionStatus::Complete(output)) => {
                    if let Some(chunk) = self.arena.get_mut(id) {
                        chunk.rowmap.intersect(&output.rowmap);
                        chunk.apply(ChunkEvent::Completed);
                        self.metrics.increment_kernel_completions();
                        log_event(
                            Event::KernelCompleted,
                            &[
                                ("base_rowid", &chunk.base_rowid.to_string()),
                                ("visible_rows", &chunk.live_rows().to_string()),
                            ],
                        );
                    }
                    self.queues.ready.push_back(id);
                }
                Err(err) => {
                    // Keep the handle queued so teardown disposes of it.
                    still_running.push_back((id, handle));
                    still_running.extend(self.queues.executing.drain(..));
                    self.queues.executing = still_running;
                    return Err(ScanError::from(err));
                }
            }
        }
        self.queues.executing = still_running;
        Ok(())
    }

    fn submit_pending(&mut self) -> ScanResult<()> {
        if self.queues.pending.is_empty() {
            return Ok(());
        }
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| ScanError::invalid_state("chunks pending without an executor"))?;

        while self.queues.executing.len() < self.max_async_chunks {
            let Some(id) = self.queues.pending.pop_front() else {
                break;
            };
            let Some(chunk) = self.arena.get_mut(id) else {
                continue;
            };

            match executor.submit(chunk.kernel_input()) {
                Ok(handle) => {
                    chunk.apply(ChunkEvent::Submitted);
                    self.queues.executing.push_back((id, handle));
                    self.metrics.increment_kernel_submits();
                    log_event(
                        Event::KernelSubmitted,
                        &[
                            ("base_rowid", &chunk.base_rowid.to_string()),
                            ("handle", &handle.0.to_string()),
                        ],
                    );
                }
                Err(err) if err.is_recoverable() => {
                    chunk.apply(ChunkEvent::Refused);
                    self.queues.pending.push_front(id);
                    self.metrics.increment_kernel_requeues();
                    log_event(
                        Event::KernelSubmitDeferred,
                        &[
                            ("base_rowid", &chunk.base_rowid.to_string()),
                            ("reason", &err.to_string()),
                        ],
                    );
                    break;
                }
                Err(err) => {
                    self.queues.pending.push_front(id);
                    return Err(ScanError::from(err));
                }
            }
        }
        Ok(())
    }

    /// Dispose of every queued chunk and in-flight execution.
    /// Returns the number of chunks released.
    pub fn discard_all(&mut self) -> usize {
        if let Some(executor) = self.executor.as_mut() {
            for (_, handle) in self.queues.executing.drain(..) {
                executor.discard(handle);
            }
        }
        self.queues.executing.clear();
        self.queues.pending.clear();
        self.queues.ready.clear();

        let released = self.arena.release_all();
        if released > 0 {
            self.metrics.add_chunks_released(released as u64);
            log_event(Event::ChunkReleased, &[("count", &released.to_string())]);
        }
        released
    }

    /// Discard everything and restart from the first existence window
    pub fn restart(&mut self) -> ScanResult<usize> {
        let released = self.discard_all();
        self.loader.restart()?;
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offload::{KernelInput, KernelOutput, OffloadError, OffloadResult};
    use crate::scan::config::PlanConfig;
    use crate::storage::{Bitmap, ColumnDesc, ElementType, MemoryRelationSet, RelationSet};
    use std::collections::HashMap;

    /// Completes on the second poll; refuses submissions past `capacity`.
    struct TwoPollExecutor {
        capacity: usize,
        next: u64,
        polls: HashMap<u64, (usize, Bitmap)>,
    }

    impl OffloadExecutor for TwoPollExecutor {
        fn submit(&mut self, input: KernelInput) -> OffloadResult<ExecutionHandle> {
            if self.polls.len() >= self.capacity {
                return Err(OffloadError::ResourceExhausted("busy".into()));
            }
            self.next += 1;
            self.polls.insert(self.next, (0, input.rowmap));
            Ok(ExecutionHandle(self.next))
        }

        fn poll(&mut self, handle: ExecutionHandle) -> OffloadResult<ExecutionStatus> {
            let entry = self
                .polls
                .get_mut(&handle.0)
                .ok_or(OffloadError::UnknownHandle(handle.0))?;
            entry.0 += 1;
            if entry.0 < 2 {
                return Ok(ExecutionStatus::Running);
            }
            let (_, rowmap) = self.polls.remove(&handle.0).unwrap();
            Ok(ExecutionStatus::Complete(KernelOutput { rowmap }))
        }

        fn discard(&mut self, handle: ExecutionHandle) {
            self.polls.remove(&handle.0);
        }

        fn in_flight(&self) -> usize {
            self.polls.len()
        }
    }

    fn relset(windows: i64) -> Arc<dyn RelationSet> {
        let mut builder =
            MemoryRelationSet::builder("t", vec![ColumnDesc::new("a", ElementType::Int32)]);
        for w in 0..windows {
            builder = builder.existence(w * 8, Bitmap::filled(8));
        }
        Arc::new(builder.build().unwrap())
    }

    fn pipeline(windows: i64, capacity: usize, budget: usize) -> ChunkPipeline {
        let metrics = Arc::new(ScanMetrics::new());
        let plan = PlanConfig::with_kernel("k", Vec::<usize>::new(), [0]);
        let loader = ChunkLoader::new(relset(windows), &plan, 8, Arc::clone(&metrics)).unwrap();
        let executor = TwoPollExecutor {
            capacity,
            next: 0,
            polls: HashMap::new(),
        };
        ChunkPipeline::new(loader, Some(Box::new(executor)), true, budget, metrics)
    }

    #[test]
    fn test_gated_chunks_flow_to_ready() {
        let mut p = pipeline(2, 4, 4);
        assert_eq!(p.advance().unwrap(), Advance::InFlight);
        assert_eq!(p.queues().executing.len(), 2);
        assert_eq!(p.advance().unwrap(), Advance::InFlight);
        assert_eq!(p.advance().unwrap(), Advance::Ready);
        assert_eq!(p.queues().ready.len(), 2);

        let a = p.pop_ready().unwrap();
        let b = p.pop_ready().unwrap();
        p.consume(a).unwrap();
        p.consume(b).unwrap();
        assert_eq!(p.advance().unwrap(), Advance::EndOfData);
        assert_eq!(p.arena_stats().live(), 0);
    }

    #[test]
    fn test_budget_bounds_outstanding() {
        let mut p = pipeline(10, 1, 3);
        p.advance().unwrap();
        assert_eq!(p.queues().outstanding(), 3);
        assert_eq!(p.queues().executing.len(), 1);
        p.advance().unwrap();
        assert!(p.queues().outstanding() <= 3);
        assert_eq!(p.arena_stats().allocated, 3);
    }

    #[test]
    fn test_refused_chunk_stays_pending_in_order() {
        let mut p = pipeline(3, 1, 3);
        p.advance().unwrap();
        let first_pending = p.queues().pending[0];
        assert_eq!(p.chunk(first_pending).unwrap().base_rowid, 8);
    }

    #[test]
    fn test_consume_rejects_chunk_not_ready() {
        let mut p = pipeline(2, 4, 4);
        p.advance().unwrap();
        let (executing, _) = p.queues().executing[0];

        let err = p.consume(executing).unwrap_err();
        assert_eq!(err.code(), crate::scan::errors::ScanErrorCode::InvalidState);
        assert_eq!(p.arena_stats().released, 1);
        assert!(p.consume(executing).is_err());
        assert_eq!(p.arena_stats().released, 1);
    }

    #[test]
    fn test_discard_all_releases_every_queue() {
        let mut p = pipeline(6, 2, 4);
        p.advance().unwrap();
        p.advance().unwrap();
        p.advance().unwrap();
        let live = p.arena_stats().live();
        assert!(live > 0);
        assert_eq!(p.discard_all() as u64, live);
        assert!(p.queues().is_empty());
        assert_eq!(p.discard_all(), 0);
    }

    #[test]
    fn test_restart_replays_from_first_window() {
        let mut p = pipeline(2, 4, 4);
        p.advance().unwrap();
        p.restart().unwrap();
        assert!(!p.is_exhausted());
        p.advance().unwrap();
        let (first, _) = p.queues().executing[0];
        assert_eq!(p.chunk(first).unwrap().base_rowid, 0);
    }
}
