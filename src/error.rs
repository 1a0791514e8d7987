//! Failure taxonomy for the ingestion pipeline.
//!
//! Three severities exist: authentication failure at run start and
//! top-level unexpected errors abort the run; everything item-scoped is
//! recovered locally (the item goes to Quarantine, the failure is logged,
//! and the run continues). The hosting process never crashes for any of
//! these.

use thiserror::Error;

/// An item-scoped or run-scoped pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Could not authenticate to the remote store at run start.
    /// Fatal to the run; the run aborts before scanning.
    #[error("remote store authentication failed: {0}")]
    Auth(String),

    /// Transient remote I/O failure after the bounded retry budget was
    /// exhausted. Item-scoped.
    #[error("transient I/O failure after {attempts} attempts: {reason}")]
    TransientIo { attempts: u32, reason: String },

    /// The per-item wall-clock timeout elapsed. Item-scoped.
    #[error("Timeout")]
    Timeout,

    /// Extracted text was empty or below the minimum length. Item-scoped.
    #[error("empty or unreadable content")]
    Content,

    /// Item exceeds the configured size ceiling; extraction is never
    /// attempted. Item-scoped.
    #[error("size {size} exceeds ceiling {ceiling}")]
    SizeLimit { size: u64, ceiling: u64 },

    /// Relocation reported success but the item's parent set does not
    /// contain the target bucket. Item-scoped.
    #[error("move to {bucket} did not take effect")]
    MoveNotVerified { bucket: String },

    /// Unexpected top-level failure. Aborts the run.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl PipelineError {
    /// True for the severities that stop a run early.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, PipelineError::Auth(_) | PipelineError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_and_fatal_stop_the_run() {
        assert!(PipelineError::Auth("expired token".into()).is_run_fatal());
        assert!(PipelineError::Fatal("oops".into()).is_run_fatal());
        assert!(!PipelineError::Timeout.is_run_fatal());
        assert!(!PipelineError::Content.is_run_fatal());
        assert!(!PipelineError::SizeLimit {
            size: 100,
            ceiling: 10
        }
        .is_run_fatal());
        assert!(!PipelineError::TransientIo {
            attempts: 20,
            reason: "reset".into()
        }
        .is_run_fatal());
    }

    #[test]
    fn timeout_reason_matches_log_contract() {
        assert_eq!(PipelineError::Timeout.to_string(), "Timeout");
    }
}
