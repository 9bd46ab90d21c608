//! jury-core — shared types and state for the jury completion engine.
//!
//! - **`types`** — tasks, reviewers, rooms, slots, secondary entries
//! - **`assignment`** — the versioned, conflict-checked assignment state
//! - **`calendar`** — day-local slot adjacency
//! - **`problem`** — input bundle and its validation
//! - **`config`** — engine.toml tuning

pub mod assignment;
pub mod calendar;
pub mod config;
pub mod error;
pub mod problem;
pub mod types;

pub use assignment::Assignment;
pub use calendar::SlotCalendar;
pub use config::{EngineConfig, Margins, RebalanceConfig, ScoringWeights};
pub use error::{ConflictKind, CoreError, CoreResult};
pub use problem::Problem;
pub use types::*;
