//! Session and plan configuration
//!
//! `SessionConfig` carries the engine-wide knobs (chunk size, outstanding
//! execution budget, kernel work-group size). `PlanConfig` carries what the
//! planner decided for one scan and is parsed from its private option list;
//! unknown options are rejected rather than ignored.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ScanError, ScanResult};

/// Default rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default bound on chunks in `Pending ∪ Executing`
pub const DEFAULT_MAX_ASYNC_CHUNKS: usize = 8;

/// Default kernel work-group size
pub const DEFAULT_WORK_GROUP_SIZE: usize = 64;

/// Default sleep between polls when nothing is ready
pub const DEFAULT_IDLE_POLL_INTERVAL_US: u64 = 50;

/// Engine configuration passed at session construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Rows per chunk; must match the existence table's bitmap length
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum chunks pending or executing at once
    #[serde(default = "default_max_async_chunks")]
    pub max_async_chunks: usize,

    /// Work-group size handed to the device when building the kernel
    #[serde(default = "default_work_group_size")]
    pub work_group_size: usize,

    /// Sleep between polls while waiting on in-flight kernels
    #[serde(default = "default_idle_poll_interval_us")]
    pub idle_poll_interval_us: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_async_chunks() -> usize {
    DEFAULT_MAX_ASYNC_CHUNKS
}
fn default_work_group_size() -> usize {
    DEFAULT_WORK_GROUP_SIZE
}
fn default_idle_poll_interval_us() -> u64 {
    DEFAULT_IDLE_POLL_INTERVAL_US
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_async_chunks: DEFAULT_MAX_ASYNC_CHUNKS,
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            idle_poll_interval_us: DEFAULT_IDLE_POLL_INTERVAL_US,
        }
    }
}

impl SessionConfig {
    /// Config with the given chunk size and defaults elsewhere
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> ScanResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::invalid_config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: SessionConfig = serde_json::from_str(&content)
            .map_err(|e| ScanError::invalid_config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.chunk_size == 0 || self.chunk_size % 8 != 0 {
            return Err(ScanError::invalid_config(format!(
                "chunk_size must be a positive multiple of 8, got {}",
                self.chunk_size
            )));
        }
        if self.max_async_chunks == 0 {
            return Err(ScanError::invalid_config("max_async_chunks must be > 0"));
        }
        if self.work_group_size == 0 {
            return Err(ScanError::invalid_config("work_group_size must be > 0"));
        }
        Ok(())
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_micros(self.idle_poll_interval_us)
    }
}

/// Whether the planner could decide row visibility without the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Predictable {
    /// Visibility depends on kernel evaluation
    #[default]
    Unset,
    /// Every live row is returned
    AllVisible,
    /// No row is returned
    AllInvisible,
}

/// One entry of the planner's private option list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOption {
    pub name: String,
    pub value: Value,
}

impl PlanOption {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-scan plan decisions. Column sets hold 0-based attribute indexes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanConfig {
    pub predictable: Predictable,
    /// Kernel source text, opaque to the scan
    pub kernel_source: Option<String>,
    /// Columns the kernel needs, loaded eagerly into each chunk
    pub clause_cols: BTreeSet<usize>,
    /// Columns returned to the caller; the rest are emitted as null
    pub required_cols: BTreeSet<usize>,
}

impl PlanConfig {
    /// Plan where every live row is visible and no kernel runs
    pub fn all_visible(required_cols: impl IntoIterator<Item = usize>) -> Self {
        Self {
            predictable: Predictable::AllVisible,
            required_cols: required_cols.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Plan where the kernel decides visibility
    pub fn with_kernel(
        source: impl Into<String>,
        clause_cols: impl IntoIterator<Item = usize>,
        required_cols: impl IntoIterator<Item = usize>,
    ) -> Self {
        Self {
            predictable: Predictable::Unset,
            kernel_source: Some(source.into()),
            clause_cols: clause_cols.into_iter().collect(),
            required_cols: required_cols.into_iter().collect(),
        }
    }

    /// Parse the planner's option list.
    ///
    /// Attribute numbers in `clause_cols`/`required_cols` are 1-based;
    /// `required_cols` entries below 1 name system columns and are skipped.
    pub fn from_options(options: &[PlanOption]) -> ScanResult<Self> {
        let mut plan = PlanConfig::default();

        for opt in options {
            match opt.name.as_str() {
                "predictable" => {
                    let visible = opt.value.as_bool().ok_or_else(|| {
                        ScanError::invalid_config(format!(
                            "option \"predictable\" expects a boolean, got {}",
                            opt.value
                        ))
                    })?;
                    plan.predictable = if visible {
                        Predictable::AllVisible
                    } else {
                        Predictable::AllInvisible
                    };
                }
                "device_kernel" => {
                    let source = opt.value.as_str().ok_or_else(|| {
                        ScanError::invalid_config(format!(
                            "option \"device_kernel\" expects a string, got {}",
                            opt.value
                        ))
                    })?;
                    plan.kernel_source = Some(source.to_string());
                }
                "clause_cols" => {
                    let attnum = attnum_of(opt)?;
                    if attnum < 1 {
                        return Err(ScanError::invalid_config(format!(
                            "clause column attribute number must be >= 1, got {}",
                            attnum
                        )));
                    }
                    plan.clause_cols.insert((attnum - 1) as usize);
                }
                "required_cols" => {
                    let attnum = attnum_of(opt)?;
                    if attnum < 1 {
                        continue;
                    }
                    plan.required_cols.insert((attnum - 1) as usize);
                }
                other => return Err(ScanError::unknown_option(other)),
            }
        }

        Ok(plan)
    }

    /// Parse a JSON array of `{"name": ..., "value": ...}` options
    pub fn from_json(json: &str) -> ScanResult<Self> {
        let options: Vec<PlanOption> = serde_json::from_str(json)
            .map_err(|e| ScanError::invalid_config(format!("invalid plan JSON: {}", e)))?;
        Self::from_options(&options)
    }

    /// Load plan options from a JSON file
    pub fn load(path: &Path) -> ScanResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::invalid_config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Whether chunks must pass through kernel execution before output
    pub fn requires_offload(&self) -> bool {
        self.predictable == Predictable::Unset
    }

    /// Columns that are required but not eagerly loaded
    pub fn lazy_cols(&self) -> impl Iterator<Item = usize> + '_ {
        self.required_cols
            .iter()
            .copied()
            .filter(move |c| !self.is_eager(*c))
    }

    /// Whether `column` is loaded into each chunk before queuing
    pub fn is_eager(&self, column: usize) -> bool {
        self.requires_offload() && self.clause_cols.contains(&column)
    }
}

fn attnum_of(opt: &PlanOption) -> ScanResult<i64> {
    opt.value.as_i64().ok_or_else(|| {
        ScanError::invalid_config(format!(
            "option \"{}\" expects an attribute number, got {}",
            opt.name, opt.value
        ))
    })
}
