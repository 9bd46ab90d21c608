//! Core error types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Which hard rule a rejected mutation would have broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The resource already sits on this task.
    AlreadyOnTask,
    /// The resource already holds another task in the same time slot.
    SlotOccupied,
    /// The task already has its two secondary entries.
    TaskFull,
    /// The resource is not a secondary on the task it should leave.
    NotOnTask,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::AlreadyOnTask => "already on task",
            ConflictKind::SlotOccupied => "slot occupied",
            ConflictKind::TaskFull => "task full",
            ConflictKind::NotOnTask => "not on task",
        };
        f.write_str(s)
    }
}

/// Errors raised by the assignment state and input validation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("hard conflict violation on task {task} for resource {resource}: {kind}")]
    HardConflictViolation {
        task: String,
        resource: String,
        kind: ConflictKind,
    },

    #[error("locked entry {resource} cannot be removed from task {task}")]
    LockedEntry { task: String, resource: String },

    #[error("task index out of range: {0}")]
    UnknownTask(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub(crate) fn conflict(task: &str, resource: &str, kind: ConflictKind) -> Self {
        CoreError::HardConflictViolation {
            task: task.to_string(),
            resource: resource.to_string(),
            kind,
        }
    }
}
