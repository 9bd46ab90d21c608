//! jury-engine — completes and balances secondary-reviewer assignments.
//!
//! Takes the partial assignment left by the first phase (every task has its
//! primary, some secondaries are missing) and fills it so that:
//! - no reviewer holds two tasks in one time slot
//! - reviewers keep same-room streaks where possible
//! - workloads end up inside the fair-share band
//!
//! Pipeline:
//! - **`quota`** — fair-share band and per-resource quotas
//! - **`completion`** — greedy placement with a five-tier escalation ladder
//! - **`rebalance`** — donor/recipient swaps on movable entries
//! - **`finalize`** — placeholder fixation and the final audit
//! - **`engine`** — runs the above in order and collects stats

pub mod completion;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod finalize;
pub mod matrix;
pub mod quota;
pub mod rebalance;
pub mod report;
pub mod scope;
pub mod scorer;
pub mod workload;

pub use completion::{CompletionReport, OverflowRecord, TierCounts, complete};
pub use engine::{EngineStats, Outcome, SwapCounts, plan, run};
pub use error::{EngineError, EngineResult};
pub use evaluator::Evaluator;
pub use finalize::{Violation, audit, finalize};
pub use matrix::AssignabilityMatrix;
pub use quota::{FairShare, QuotaPlan, plan_quotas};
pub use rebalance::{RebalanceContext, RebalanceOutcome, RebalanceReport, SwapReason, SwapRecord, rebalance};
pub use report::format_report;
pub use scope::Scope;
pub use scorer::{Candidate, CandidateScore, Thresholds, Tier, rank_candidates, score_candidate};
pub use workload::{WorkloadSummary, workload};
