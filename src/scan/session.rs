//! ScanSession: one scan over a managed columnar table
//!
//! Lifecycle:
//!
//! ```text
//! open ──> Open ──next()=None──> Finished
//!           │  ^                    │
//!           │  └──── rescan() ──────┘
//!           └──error──> Failed (poisoned; only end() is valid)
//! any ──end()/drop──> Ended
//! ```
//!
//! Teardown releases every chunk in every queue exactly once and discards
//! in-flight kernel executions whether or not they finished.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::observability::{log_event, Event, MetricsSnapshot, ScanMetrics};
use crate::offload::{OffloadDevice, OffloadExecutor};
use crate::storage::{ColumnDesc, RelationKind, RelationSet};

use super::arena::ArenaStats;
use super::cache::ColumnStoreCache;
use super::config::{PlanConfig, Predictable, SessionConfig};
use super::errors::{ScanError, ScanResult};
use super::loader::ChunkLoader;
use super::materializer::TupleMaterializer;
use super::pipeline::{ChunkPipeline, PipelineQueues};
use super::row::Row;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// End of data was reported
    Finished,
    /// A fatal error terminated the scan
    Failed,
    /// Torn down; every resource released
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
            SessionState::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a plan will be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScanMode {
    /// Chunks are gated on kernel evaluation
    Offload { kernel: String },
    /// Every live row is returned
    AllVisible,
    /// Nothing is returned; storage is not touched
    AllInvisible,
}

/// Column-by-column execution strategy of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStrategy {
    pub relation: String,
    #[serde(flatten)]
    pub mode: ScanMode,
    /// Loaded into each chunk before kernel submission
    pub eager_cols: Vec<String>,
    /// Resolved per row through a column cache
    pub cached_cols: Vec<String>,
    /// Emitted as null without touching storage
    pub pruned_cols: Vec<String>,
}

struct ScanEngine {
    pipeline: ChunkPipeline,
    materializer: TupleMaterializer,
}

pub struct ScanSession {
    id: Uuid,
    relset: Arc<dyn RelationSet>,
    plan: PlanConfig,
    state: SessionState,
    /// `None` when the plan makes every row invisible
    engine: Option<ScanEngine>,
    failure: Option<ScanError>,
    metrics: Arc<ScanMetrics>,
}

impl ScanSession {
    /// Validate the plan against the relation and prepare the scan.
    ///
    /// `device` is required when the plan gates rows on kernel evaluation.
    pub fn open(
        relset: Arc<dyn RelationSet>,
        plan: PlanConfig,
        config: SessionConfig,
        device: Option<&dyn OffloadDevice>,
    ) -> ScanResult<Self> {
        config.validate()?;
        validate_plan(relset.as_ref(), &plan)?;

        let id = Uuid::new_v4();
        let metrics = Arc::new(ScanMetrics::new());

        let engine = match plan.predictable {
            Predictable::AllInvisible => None,
            Predictable::Unset | Predictable::AllVisible => {
                let executor = if plan.requires_offload() {
                    Some(build_executor(&plan, &config, device)?)
                } else {
                    None
                };
                let loader =
                    ChunkLoader::new(Arc::clone(&relset), &plan, config.chunk_size, Arc::clone(&metrics))?;
                let pipeline = ChunkPipeline::new(
                    loader,
                    executor,
                    plan.requires_offload(),
                    config.max_async_chunks,
                    Arc::clone(&metrics),
                );

                let mut caches = Vec::new();
                for column in plan.lazy_cols() {
                    caches.push(ColumnStoreCache::new(
                        column,
                        relset.column_store_name(column),
                        relset.open_cursor(column)?,
                        Arc::clone(&metrics),
                    ));
                }
                let materializer = TupleMaterializer::new(
                    relset.columns().len(),
                    plan.required_cols.clone(),
                    caches,
                    config.idle_poll_interval(),
                    Arc::clone(&metrics),
                );
                Some(ScanEngine {
                    pipeline,
                    materializer,
                })
            }
        };

        log_event(
            Event::ScanBegin,
            &[
                ("chunk_size", &config.chunk_size.to_string()),
                ("max_async_chunks", &config.max_async_chunks.to_string()),
                ("mode", mode_name(&plan)),
                ("relation", relset.name()),
                ("session_id", &id.to_string()),
            ],
        );

        Ok(Self {
            id,
            relset,
            plan,
            state: SessionState::Open,
            engine,
            failure: None,
            metrics,
        })
    }

    /// Execution strategy of `plan` over `relset`, without opening a scan
    pub fn describe(relset: &dyn RelationSet, plan: &PlanConfig) -> ScanResult<ScanStrategy> {
        validate_plan(relset, plan)?;

        let mode = match plan.predictable {
            Predictable::Unset => ScanMode::Offload {
                kernel: plan.kernel_source.clone().unwrap_or_default(),
            },
            Predictable::AllVisible => ScanMode::AllVisible,
            Predictable::AllInvisible => ScanMode::AllInvisible,
        };
        let invisible = plan.predictable == Predictable::AllInvisible;

        let mut strategy = ScanStrategy {
            relation: relset.name().to_string(),
            mode,
            eager_cols: Vec::new(),
            cached_cols: Vec::new(),
            pruned_cols: Vec::new(),
        };
        for (column, desc) in relset.columns().iter().enumerate() {
            let name = desc.name.clone();
            if invisible || !plan.required_cols.contains(&column) {
                if plan.is_eager(column) {
                    strategy.eager_cols.push(name);
                } else {
                    strategy.pruned_cols.push(name);
                }
            } else if plan.is_eager(column) {
                strategy.eager_cols.push(name);
            } else {
                strategy.cached_cols.push(name);
            }
        }
        Ok(strategy)
    }

    /// Next visible row, or `None` once the scan is complete
    pub fn next(&mut self) -> ScanResult<Option<Row>> {
        match self.state {
            SessionState::Open => {}
            SessionState::Finished => return Ok(None),
            SessionState::Failed => {
                let reason = self
                    .failure
                    .as_ref()
                    .map_or_else(String::new, |e| e.to_string());
                return Err(ScanError::invalid_state("scan failed and must be ended")
                    .with_details(reason));
            }
            SessionState::Ended => {
                return Err(ScanError::invalid_state("scan already ended"));
            }
        }

        let Some(engine) = self.engine.as_mut() else {
            self.finish();
            return Ok(None);
        };

        match engine.materializer.next(&mut engine.pipeline) {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                log_event(
                    Event::ScanFailed,
                    &[
                        ("code", err.code().code()),
                        ("reason", &err.to_string()),
                        ("session_id", &self.id.to_string()),
                    ],
                );
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn finish(&mut self) {
        self.state = SessionState::Finished;
        log_event(
            Event::ScanComplete,
            &[
                ("rows", &self.metrics.snapshot().rows_emitted.to_string()),
                ("session_id", &self.id.to_string()),
            ],
        );
    }

    /// Restart the scan from the first existence window.
    ///
    /// Every queued chunk is released and in-flight executions are discarded.
    pub fn rescan(&mut self) -> ScanResult<()> {
        match self.state {
            SessionState::Open | SessionState::Finished => {}
            SessionState::Failed => {
                return Err(ScanError::invalid_state("cannot rescan a failed scan"))
            }
            SessionState::Ended => return Err(ScanError::invalid_state("scan already ended")),
        }

        let mut released = 0;
        if let Some(engine) = self.engine.as_mut() {
            engine.materializer.reset();
            match engine.pipeline.restart() {
                Ok(n) => released = n,
                Err(err) => {
                    self.state = SessionState::Failed;
                    self.failure = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.state = SessionState::Open;
        log_event(
            Event::ScanRescan,
            &[
                ("released", &released.to_string()),
                ("session_id", &self.id.to_string()),
            ],
        );
        Ok(())
    }

    /// Tear the session down. Idempotent.
    pub fn end(&mut self) -> MetricsSnapshot {
        if self.state != SessionState::Ended {
            self.teardown();
        }
        self.metrics.snapshot()
    }

    fn teardown(&mut self) {
        let mut released = 0;
        if let Some(engine) = self.engine.as_mut() {
            engine.materializer.reset();
            released = engine.pipeline.discard_all();
        }
        let previous = self.state;
        self.state = SessionState::Ended;
        log_event(
            Event::ScanEnd,
            &[
                ("metrics", &self.metrics.snapshot().to_json()),
                ("previous_state", previous.as_str()),
                ("released", &released.to_string()),
                ("session_id", &self.id.to_string()),
            ],
        );
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn relation(&self) -> &dyn RelationSet {
        self.relset.as_ref()
    }

    pub fn plan(&self) -> &PlanConfig {
        &self.plan
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Chunk allocation counters; zero for plans that never load chunks
    pub fn arena_stats(&self) -> ArenaStats {
        self.engine
            .as_ref()
            .map(|e| e.pipeline.arena_stats())
            .unwrap_or_default()
    }

    pub fn queues(&self) -> Option<&PipelineQueues> {
        self.engine.as_ref().map(|e| e.pipeline.queues())
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.state != SessionState::Ended {
            self.teardown();
        }
    }
}

fn mode_name(plan: &PlanConfig) -> &'static str {
    match plan.predictable {
        Predictable::Unset => "offload",
        Predictable::AllVisible => "all_visible",
        Predictable::AllInvisible => "all_invisible",
    }
}

fn build_executor(
    plan: &PlanConfig,
    config: &SessionConfig,
    device: Option<&dyn OffloadDevice>,
) -> ScanResult<Box<dyn OffloadExecutor>> {
    let source = plan
        .kernel_source
        .as_deref()
        .ok_or_else(|| ScanError::invalid_config("plan requires a kernel but none was given"))?;
    let device = device.ok_or_else(|| {
        ScanError::invalid_config("plan requires a kernel but no offload device is available")
    })?;
    let executor = device.build_program(source, config.work_group_size)?;
    log_event(
        Event::KernelBuilt,
        &[
            ("source_len", &source.len().to_string()),
            ("work_group_size", &config.work_group_size.to_string()),
        ],
    );
    Ok(executor)
}

fn column<'a>(relset: &'a dyn RelationSet, index: usize, role: &str) -> ScanResult<&'a ColumnDesc> {
    let desc = relset.columns().get(index).ok_or_else(|| {
        ScanError::invalid_config(format!(
            "{} column {} does not exist in \"{}\"",
            role,
            index + 1,
            relset.name()
        ))
    })?;
    if desc.dropped {
        return Err(ScanError::invalid_config(format!(
            "{} column \"{}\" of \"{}\" is dropped",
            role,
            desc.name,
            relset.name()
        )));
    }
    Ok(desc)
}

fn validate_plan(relset: &dyn RelationSet, plan: &PlanConfig) -> ScanResult<()> {
    if relset.kind() != RelationKind::ManagedColumnar {
        return Err(ScanError::wrong_object_kind(relset.name(), relset.kind()));
    }
    for &index in &plan.required_cols {
        column(relset, index, "required")?;
    }
    if plan.requires_offload() {
        if plan.kernel_source.is_none() {
            return Err(ScanError::invalid_config(
                "plan requires a kernel but none was given",
            ));
        }
        for &index in &plan.clause_cols {
            let desc = column(relset, index, "clause")?;
            if !desc.elem_type.is_fixed_width() {
                return Err(ScanError::layout_mismatch(
                    &relset.column_store_name(index),
                    format!(
                        "clause column \"{}\" has variable-width type {}",
                        desc.name, desc.elem_type
                    ),
                ));
            }
        }
    }
    Ok(())
}
