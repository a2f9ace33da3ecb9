//! Scan error types
//!
//! Error codes:
//! - SCAN_WRONG_OBJECT_KIND (FATAL)
//! - SCAN_LAYOUT_MISMATCH (FATAL)
//! - SCAN_UNKNOWN_OPTION (FATAL)
//! - SCAN_INVALID_CONFIG (FATAL)
//! - SCAN_STORAGE_FAILED (ERROR)
//! - SCAN_OFFLOAD_FAILED (ERROR)
//! - SCAN_INVALID_STATE (ERROR)
//!
//! Every error terminates the scan. Offload resource exhaustion is not in
//! this list: it is absorbed by the pipeline and never reaches the caller.

use std::fmt;

use crate::offload::OffloadError;
use crate::storage::StorageError;

/// Severity levels for scan errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The scan fails; storage and configuration are not implicated
    Error,
    /// Unsupported or corrupted layout, or a bad plan; never retried
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Scan error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorCode {
    /// Relation is not a managed columnar table
    WrongObjectKind,
    /// Stored data does not match the expected fixed-width layout
    LayoutMismatch,
    /// Plan carried an option this scan does not understand
    UnknownOption,
    /// Session or plan configuration is invalid
    InvalidConfig,
    /// Storage provider failed
    StorageFailed,
    /// Kernel build or execution failed
    OffloadFailed,
    /// Operation not valid in the session's current state
    InvalidState,
}

impl ScanErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ScanErrorCode::WrongObjectKind => "SCAN_WRONG_OBJECT_KIND",
            ScanErrorCode::LayoutMismatch => "SCAN_LAYOUT_MISMATCH",
            ScanErrorCode::UnknownOption => "SCAN_UNKNOWN_OPTION",
            ScanErrorCode::InvalidConfig => "SCAN_INVALID_CONFIG",
            ScanErrorCode::StorageFailed => "SCAN_STORAGE_FAILED",
            ScanErrorCode::OffloadFailed => "SCAN_OFFLOAD_FAILED",
            ScanErrorCode::InvalidState => "SCAN_INVALID_STATE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ScanErrorCode::WrongObjectKind
            | ScanErrorCode::LayoutMismatch
            | ScanErrorCode::UnknownOption
            | ScanErrorCode::InvalidConfig => Severity::Fatal,
            ScanErrorCode::StorageFailed
            | ScanErrorCode::OffloadFailed
            | ScanErrorCode::InvalidState => Severity::Error,
        }
    }
}

impl fmt::Display for ScanErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Scan error with the offending object in its details
#[derive(Debug, Clone)]
pub struct ScanError {
    code: ScanErrorCode,
    message: String,
    details: Option<String>,
}

impl ScanError {
    fn new(code: ScanErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach context such as the relation, column or row-id
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Relation is not managed by this engine
    pub fn wrong_object_kind(relation: &str, kind: impl fmt::Display) -> Self {
        Self::new(
            ScanErrorCode::WrongObjectKind,
            format!("\"{}\" is not a managed columnar table", relation),
        )
        .with_details(format!("kind: {}", kind))
    }

    /// Unexpected element type, dimensionality, alignment or bounds
    pub fn layout_mismatch(object: &str, reason: impl Into<String>) -> Self {
        Self::new(ScanErrorCode::LayoutMismatch, reason).with_details(format!("object: {}", object))
    }

    /// Unrecognized plan option
    pub fn unknown_option(name: &str) -> Self {
        Self::new(
            ScanErrorCode::UnknownOption,
            format!("unexpected private plan information: {}", name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ScanErrorCode::InvalidConfig, reason)
    }

    /// Session used after a failure, teardown, or out of order
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::new(ScanErrorCode::InvalidState, reason)
    }

    /// Kernel build or execution failure
    pub fn offload_failed(reason: impl Into<String>) -> Self {
        Self::new(ScanErrorCode::OffloadFailed, reason)
    }

    pub fn code(&self) -> ScanErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScanError {}

impl From<StorageError> for ScanError {
    fn from(err: StorageError) -> Self {
        Self::new(ScanErrorCode::StorageFailed, err.to_string())
    }
}

impl From<OffloadError> for ScanError {
    fn from(err: OffloadError) -> Self {
        Self::new(ScanErrorCode::OffloadFailed, err.to_string())
    }
}

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;
