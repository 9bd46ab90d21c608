//! End-to-end run: validate, complete, rebalance, fix, audit.

use std::collections::BTreeMap;

use jury_core::{Assignment, EngineConfig, Problem, ResourceId, SlotCalendar, Task, TaskId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::completion::{OverflowRecord, TierCounts, complete};
use crate::error::{EngineError, EngineResult};
use crate::finalize::{audit, finalize};
use crate::quota::{FairShare, QuotaPlan, plan_quotas};
use crate::rebalance::{RebalanceContext, RebalanceReport, SwapRecord, rebalance};
use crate::scope::Scope;
use crate::workload::WorkloadSummary;

/// Swap counts per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCounts {
    pub quick: usize,
    pub relief: usize,
    pub final_pass: usize,
    pub total: usize,
}

/// Everything a caller may want to know about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub open_slots: usize,
    pub tier_counts: TierCounts,
    pub swaps: SwapCounts,
    pub final_rebalance: RebalanceReport,
    pub workload: WorkloadSummary,
    pub fair_share: FairShare,
    pub loads: BTreeMap<ResourceId, u32>,
    /// Tasks fixed with at least one placeholder.
    pub placeholder_tasks: Vec<TaskId>,
    pub unrelieved_overflows: Vec<OverflowRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub tasks: Vec<Task>,
    pub stats: EngineStats,
    pub swap_log: Vec<SwapRecord>,
}

/// Compute the quota plan for a problem without placing anything.
pub fn plan(problem: &Problem) -> EngineResult<QuotaPlan> {
    problem.validate()?;
    let resources = problem.resource_ids();
    let assignment = Assignment::from_phase_one(problem.tasks.clone());
    let loads = crate::workload::workload(&assignment, &resources);
    Ok(plan_quotas(&loads, open_slots_u32(&assignment)))
}

/// Complete and rebalance `problem`, returning fixed tasks and run stats.
pub fn run(problem: &Problem, config: &EngineConfig) -> EngineResult<Outcome> {
    problem.validate()?;

    let calendar = SlotCalendar::new(&problem.slots);
    let resources = problem.resource_ids();
    let scope = Scope::new(&calendar, &resources, config);
    let mut assignment = Assignment::from_phase_one(problem.tasks.clone());

    let open_slots = assignment.open_slot_count();
    let mut plan = plan_quotas(&scope.workload(&assignment), open_slots_u32(&assignment));
    info!(
        tasks = assignment.len(),
        resources = resources.len(),
        open_slots,
        lower = plan.fair_share.lower,
        target = plan.fair_share.target,
        upper = plan.fair_share.upper,
        "planned quotas"
    );

    let mut ctx = RebalanceContext::new(&config.rebalance, config.seed);
    let completion = complete(&scope, &mut assignment, &mut plan, &mut ctx)?;

    let final_rebalance = rebalance(&scope, &mut assignment, &mut ctx, config.rebalance.max_iterations)?;
    let placeholder_tasks = finalize(&mut assignment)?;

    let violations = audit(assignment.tasks());
    if !violations.is_empty() {
        let joined = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(EngineError::AuditFailed(joined));
    }

    let loads = scope.workload(&assignment);
    let workload = WorkloadSummary::of(&loads);
    let fair_share = FairShare::of(&loads);
    let swaps = SwapCounts {
        quick: completion.quick_swaps,
        relief: completion.relief_swaps,
        final_pass: final_rebalance.swaps,
        total: ctx.swaps(),
    };

    if !completion.unrelieved_overflows.is_empty() {
        warn!(count = completion.unrelieved_overflows.len(), "run finished with unrelieved overflows");
    }
    info!(
        min = workload.min,
        max = workload.max,
        spread = workload.spread,
        swaps = swaps.total,
        placeholders = placeholder_tasks.len(),
        outcome = ?final_rebalance.outcome,
        "run complete"
    );

    let swap_log = ctx.history().to_vec();
    Ok(Outcome {
        tasks: assignment.into_tasks(),
        stats: EngineStats {
            open_slots,
            tier_counts: completion.tier_counts,
            swaps,
            final_rebalance,
            workload,
            fair_share,
            loads,
            placeholder_tasks,
            unrelieved_overflows: completion.unrelieved_overflows,
        },
        swap_log,
    })
}

fn open_slots_u32(assignment: &Assignment) -> u32 {
    u32::try_from(assignment.open_slot_count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jury_core::{Resource, Room, TimeSlot};

    fn problem() -> Problem {
        Problem {
            resources: ["a", "b", "c", "d", "e"]
                .iter()
                .map(|id| Resource { id: id.to_string() })
                .collect(),
            slots: (1..=3)
                .map(|i| TimeSlot {
                    id: format!("s{i}"),
                    day: "mon".to_string(),
                    position: i,
                })
                .collect(),
            rooms: vec![Room { id: "A".to_string() }],
            tasks: vec![
                Task::phase_one("t1", "a", "A", "s1", &[]),
                Task::phase_one("t2", "b", "A", "s2", &["c"]),
                Task::phase_one("t3", "d", "A", "s3", &[]),
            ],
        }
    }

    #[test]
    fn run_completes_every_task() {
        let outcome = run(&problem(), &EngineConfig::default()).unwrap();
        assert_eq!(outcome.stats.open_slots, 5);
        assert_eq!(outcome.stats.tier_counts.total(), 5);
        assert!(outcome.stats.placeholder_tasks.is_empty());
        assert!(outcome.tasks.iter().all(|t| t.is_complete()));
        assert!(outcome.tasks[1].is_locked("c"));
    }

    #[test]
    fn plan_matches_open_slots() {
        let plan = plan(&problem()).unwrap();
        assert_eq!(plan.total(), 5);
    }

    #[test]
    fn invalid_problem_is_rejected() {
        let mut p = problem();
        p.tasks[0].slot = "nowhere".to_string();
        assert!(matches!(
            run(&p, &EngineConfig::default()),
            Err(EngineError::Core(_))
        ));
    }
}
