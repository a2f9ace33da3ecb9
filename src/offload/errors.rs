//! Offload execution errors

use thiserror::Error;

/// Result type for offload operations
pub type OffloadResult<T> = Result<T, OffloadError>;

/// Errors raised by an offload device or executor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OffloadError {
    /// No execution slot or buffer available right now
    #[error("execution resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("kernel build failed: {0}")]
    BuildFailed(String),

    #[error("kernel execution failed: {0}")]
    ExecutionFailed(String),

    #[error("unknown execution handle {0}")]
    UnknownHandle(u64),
}

impl OffloadError {
    /// Whether the submission may simply be retried later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OffloadError::ResourceExhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exhaustion_is_recoverable() {
        assert!(OffloadError::ResourceExhausted("queue full".into()).is_recoverable());
        assert!(!OffloadError::BuildFailed("syntax".into()).is_recoverable());
        assert!(!OffloadError::ExecutionFailed("fault".into()).is_recoverable());
        assert!(!OffloadError::UnknownHandle(3).is_recoverable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            OffloadError::UnknownHandle(9).to_string(),
            "unknown execution handle 9"
        );
    }
}
