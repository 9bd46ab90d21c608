//! Engine error types.

use jury_core::CoreError;
use thiserror::Error;

/// Errors that can occur while completing and rebalancing an assignment.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("final audit failed: {0}")]
    AuditFailed(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
