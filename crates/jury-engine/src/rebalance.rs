//! Swap-based rebalancing.
//!
//! Moves movable (non-locked) secondary slots from overloaded to
//! underloaded resources until the workload spread is at most 2 and every
//! resource sits inside the fair-share band, or a budget runs out.
//!
//! ```text
//! loop
//!   balanced?                      -> Balanced
//!   iteration budget spent?        -> BudgetExhausted
//!   max_stuck idle iterations?     -> Stuck
//!   someone below lower bound      -> lower-bound enforcement
//!   spread > aggressive_spread     -> aggressive pass (several swaps)
//!   otherwise                      -> one standard swap
//! ```
//!
//! All state a pass needs (counters, budgets, seeded RNG, swap history)
//! lives in [`RebalanceContext`], owned by the caller.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use jury_core::{Assignment, RebalanceConfig, ResourceId, TaskId};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::quota::FairShare;
use crate::scope::Scope;
use crate::workload::WorkloadSummary;

/// Why a swap was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapReason {
    Standard,
    LowerBound,
    Aggressive,
    Relief,
}

/// One secondary slot handed from one resource to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub task: TaskId,
    pub from: ResourceId,
    pub to: ResourceId,
    pub reason: SwapReason,
}

/// How a rebalancing pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceOutcome {
    Balanced,
    Stuck,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub outcome: RebalanceOutcome,
    pub iterations: u32,
    pub swaps: usize,
}

/// Counters, budgets and the seeded RNG threaded through every pass.
#[derive(Debug, Clone)]
pub struct RebalanceContext {
    pub iteration: u32,
    pub stuck: u32,
    pub max_iterations: u32,
    pub max_stuck: u32,
    pub candidate_scan: usize,
    pub aggressive_spread: u32,
    pub aggressive_swaps: usize,
    rng: ChaCha8Rng,
    history: Vec<SwapRecord>,
}

impl RebalanceContext {
    pub fn new(config: &RebalanceConfig, seed: u64) -> Self {
        Self {
            iteration: 0,
            stuck: 0,
            max_iterations: config.max_iterations,
            max_stuck: config.max_stuck,
            candidate_scan: config.candidate_scan.max(1),
            aggressive_spread: config.aggressive_spread,
            aggressive_swaps: config.aggressive_swaps.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
            history: Vec::new(),
        }
    }

    /// Reset the per-pass counters and set the iteration budget.
    pub fn begin_pass(&mut self, max_iterations: u32) {
        self.iteration = 0;
        self.stuck = 0;
        self.max_iterations = max_iterations;
    }

    pub fn history(&self) -> &[SwapRecord] {
        &self.history
    }

    pub fn swaps(&self) -> usize {
        self.history.len()
    }
}

/// Spread at most 2 with both extremes inside the band.
pub fn is_balanced(summary: &WorkloadSummary, fair: &FairShare) -> bool {
    summary.spread <= 2 && fair.contains(summary.min) && fair.contains(summary.max)
}

/// Run rebalancing iterations until balanced, stuck or out of budget.
pub fn rebalance(
    scope: &Scope<'_>,
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
    max_iterations: u32,
) -> EngineResult<RebalanceReport> {
    ctx.begin_pass(max_iterations);
    let swaps_before = ctx.swaps();

    let outcome = loop {
        let loads = scope.workload(assignment);
        let summary = WorkloadSummary::of(&loads);
        let fair = FairShare::of(&loads);

        if is_balanced(&summary, &fair) {
            break RebalanceOutcome::Balanced;
        }
        if ctx.iteration >= ctx.max_iterations {
            break RebalanceOutcome::BudgetExhausted;
        }
        if ctx.stuck >= ctx.max_stuck {
            break RebalanceOutcome::Stuck;
        }
        ctx.iteration += 1;

        let mut swapped = 0;
        if summary.min < fair.lower {
            swapped = enforce_lower_bound(scope, assignment, ctx, &fair)?;
        }
        if swapped == 0 {
            swapped = if summary.spread > ctx.aggressive_spread {
                aggressive_pass(scope, assignment, ctx)?
            } else {
                standard_swap(scope, assignment, ctx)?
            };
        }

        if swapped == 0 {
            ctx.stuck += 1;
        } else {
            ctx.stuck = 0;
        }
    };

    let report = RebalanceReport {
        outcome,
        iterations: ctx.iteration,
        swaps: ctx.swaps() - swaps_before,
    };
    debug!(
        outcome = ?report.outcome,
        iterations = report.iterations,
        swaps = report.swaps,
        "rebalance pass finished"
    );
    Ok(report)
}

fn swap(
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
    task: usize,
    from: &str,
    to: &str,
    reason: SwapReason,
) -> EngineResult<()> {
    assignment.replace_secondary(task, from, to)?;
    let task_id = assignment
        .task(task)
        .map(|t| t.id.clone())
        .unwrap_or_default();
    debug!(task = %task_id, from, to, ?reason, "swapped secondary");
    ctx.history.push(SwapRecord {
        task: task_id,
        from: from.to_string(),
        to: to.to_string(),
        reason,
    });
    Ok(())
}

/// Find the first slot (cheapest to give up) of `donor` that `recipient`
/// may take.
fn first_transferable(
    scope: &Scope<'_>,
    assignment: &Assignment,
    donor: &str,
    recipient: &str,
    exclude: Option<usize>,
) -> Option<usize> {
    scope
        .movable_slots(assignment, donor)
        .into_iter()
        .filter(|t| Some(*t) != exclude)
        .find(|&t| scope.evaluator.is_assignable(assignment, recipient, t))
}

/// Raise every resource below `fair.lower` by taking slots from donors
/// above it. Donors above `fair.upper` are drained first. A donor never
/// drops below the lower bound and a recipient never exceeds the upper one.
pub fn enforce_lower_bound(
    scope: &Scope<'_>,
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
    fair: &FairShare,
) -> EngineResult<usize> {
    let loads = scope.workload(assignment);
    let mut recipients: Vec<(u32, ResourceId)> = loads
        .iter()
        .filter(|(_, w)| **w < fair.lower)
        .map(|(r, w)| (*w, r.clone()))
        .collect();
    recipients.sort();

    let mut swaps = 0;
    for (_, recipient) in recipients {
        loop {
            let loads = scope.workload(assignment);
            let current = loads.get(&recipient).copied().unwrap_or(0);
            if current >= fair.lower || current + 1 > fair.upper {
                break;
            }

            let mut donors: Vec<(&ResourceId, u32)> = loads
                .iter()
                .filter(|(r, w)| **w > fair.lower && **r != recipient)
                .map(|(r, w)| (r, *w))
                .collect();
            donors.sort_by_key(|(r, w)| (Reverse(*w > fair.upper), Reverse(*w), *r));

            let found = donors.iter().find_map(|(donor, _)| {
                first_transferable(scope, assignment, donor, &recipient, None).map(|t| (donor.to_string(), t))
            });
            let Some((donor, task)) = found else {
                break;
            };
            swap(assignment, ctx, task, &donor, &recipient, SwapReason::LowerBound)?;
            swaps += 1;
        }
    }
    Ok(swaps)
}

fn sorted_by_load(loads: &BTreeMap<ResourceId, u32>, descending: bool) -> Vec<(ResourceId, u32)> {
    let mut list: Vec<(ResourceId, u32)> = loads.iter().map(|(r, w)| (r.clone(), *w)).collect();
    if descending {
        list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    } else {
        list.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    }
    list
}

/// Move one slot from the most overloaded resource (rotated while stuck)
/// to the most underloaded candidate that can take it.
fn standard_swap(
    scope: &Scope<'_>,
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
) -> EngineResult<usize> {
    let loads = scope.workload(assignment);
    let min = loads.values().copied().min().unwrap_or(0);
    let over: Vec<(ResourceId, u32)> = sorted_by_load(&loads, true)
        .into_iter()
        .filter(|(_, w)| *w >= min + 2)
        .collect();
    if over.is_empty() {
        return Ok(0);
    }
    let (donor, donor_load) = &over[ctx.stuck as usize % over.len()];

    let unders: Vec<ResourceId> = sorted_by_load(&loads, false)
        .into_iter()
        .filter(|(r, w)| r != donor && w + 2 <= *donor_load)
        .take(ctx.candidate_scan)
        .map(|(r, _)| r)
        .collect();

    for recipient in &unders {
        if let Some(task) = first_transferable(scope, assignment, donor, recipient, None) {
            swap(assignment, ctx, task, donor, recipient, SwapReason::Standard)?;
            return Ok(1);
        }
    }
    Ok(0)
}

/// Pair the most loaded resources with the least loaded ones and move one
/// slot per pair, taking the first transferable slot in shuffled order.
fn aggressive_pass(
    scope: &Scope<'_>,
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
) -> EngineResult<usize> {
    let loads = scope.workload(assignment);
    let pairs: Vec<(ResourceId, ResourceId)> = sorted_by_load(&loads, true)
        .into_iter()
        .zip(sorted_by_load(&loads, false))
        .take(ctx.aggressive_swaps)
        .map(|((donor, _), (recipient, _))| (donor, recipient))
        .collect();

    let mut swaps = 0;
    for (donor, recipient) in pairs {
        let live = scope.workload(assignment);
        let donor_load = live.get(&donor).copied().unwrap_or(0);
        let recipient_load = live.get(&recipient).copied().unwrap_or(0);
        if donor_load < recipient_load + 2 {
            continue;
        }

        let mut slots = scope.movable_slots(assignment, &donor);
        slots.shuffle(&mut ctx.rng);
        let target = slots
            .iter()
            .copied()
            .find(|&t| scope.evaluator.is_assignable(assignment, &recipient, t));
        if let Some(task) = target {
            swap(assignment, ctx, task, &donor, &recipient, SwapReason::Aggressive)?;
            swaps += 1;
        }
    }

    if swaps > 0 {
        info!(swaps, "aggressive rebalancing iteration");
    }
    Ok(swaps)
}

/// Give one of `resource`'s other movable slots to an underloaded resource
/// that stays within `fair.upper`. Used right after an overflow placement.
pub fn relieve(
    scope: &Scope<'_>,
    assignment: &mut Assignment,
    ctx: &mut RebalanceContext,
    resource: &str,
    keep_task: usize,
    fair: &FairShare,
) -> EngineResult<bool> {
    let loads = scope.workload(assignment);
    let own = loads.get(resource).copied().unwrap_or(0);
    let recipients: Vec<ResourceId> = sorted_by_load(&loads, false)
        .into_iter()
        .filter(|(r, w)| r != resource && w + 1 <= fair.upper && w + 2 <= own)
        .map(|(r, _)| r)
        .collect();

    for recipient in &recipients {
        if let Some(task) = first_transferable(scope, assignment, resource, recipient, Some(keep_task)) {
            swap(assignment, ctx, task, resource, recipient, SwapReason::Relief)?;
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jury_core::{EngineConfig, SecondaryAssignee, SlotCalendar, Task, TimeSlot};

    fn calendar(n: u32) -> SlotCalendar {
        let slots: Vec<TimeSlot> = (1..=n)
            .map(|i| TimeSlot {
                id: format!("s{i}"),
                day: "mon".to_string(),
                position: i,
            })
            .collect();
        SlotCalendar::new(&slots)
    }

    /// Task with one locked and one movable secondary.
    fn task(id: &str, primary: &str, slot: &str, locked: &str, added: SecondaryAssignee) -> Task {
        let mut t = Task::phase_one(id, primary, "A", slot, &[locked]);
        t.secondaries.push(added);
        t
    }

    fn resources(n: usize) -> Vec<ResourceId> {
        (1..=n).map(|i| format!("r{i}")).collect()
    }

    /// Workloads r1..r4 = [5, 5, 5, 2].
    fn skewed() -> Assignment {
        Assignment::new(vec![
            task("t1", "r4", "s1", "r1", SecondaryAssignee::real("r2")),
            task("t2", "r4", "s2", "r3", SecondaryAssignee::real("r1")),
            task("t3", "r1", "s3", "r2", SecondaryAssignee::real("r3")),
            task("t4", "r2", "s4", "r3", SecondaryAssignee::real("r1")),
            task("t5", "r3", "s5", "r1", SecondaryAssignee::real("r2")),
            task("t6", "r2", "s6", "r3", SecondaryAssignee::Placeholder),
        ])
    }

    #[test]
    fn lower_bound_enforcement_lifts_underloaded() {
        let cal = calendar(6);
        let res = resources(4);
        let config = EngineConfig::default();
        let scope = Scope::new(&cal, &res, &config);
        let mut a = skewed();

        let loads = scope.workload(&a);
        assert_eq!(loads.values().copied().collect::<Vec<_>>(), vec![5, 5, 5, 2]);
        let fair = FairShare::of(&loads);
        assert_eq!(fair.lower, 4);

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        let swaps = enforce_lower_bound(&scope, &mut a, &mut ctx, &fair).unwrap();
        assert_eq!(swaps, 2);

        let after = WorkloadSummary::of(&scope.workload(&a));
        assert!(after.spread <= 2);
        assert!(after.min >= fair.lower);
        assert!(ctx.history().iter().all(|s| s.reason == SwapReason::LowerBound));
    }

    #[test]
    fn rebalance_converges_and_keeps_locked_entries() {
        let cal = calendar(6);
        let res = resources(4);
        let config = EngineConfig::default();
        let scope = Scope::new(&cal, &res, &config);
        let mut a = skewed();
        let locked_before: Vec<_> = a.tasks().iter().map(|t| t.locked.clone()).collect();

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        let report = rebalance(&scope, &mut a, &mut ctx, 100).unwrap();
        assert_eq!(report.outcome, RebalanceOutcome::Balanced);
        assert!(report.swaps >= 2);

        for (task, locked) in a.tasks().iter().zip(locked_before) {
            for r in &locked {
                assert!(task.has_secondary(r), "locked {r} lost from {}", task.id);
            }
        }
    }

    #[test]
    fn balanced_assignment_needs_no_swaps() {
        let cal = calendar(6);
        let res = resources(4);
        let config = EngineConfig::default();
        let scope = Scope::new(&cal, &res, &config);
        let mut a = skewed();

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        rebalance(&scope, &mut a, &mut ctx, 100).unwrap();
        let version = a.version();

        let again = rebalance(&scope, &mut a, &mut ctx, 100).unwrap();
        assert_eq!(again.outcome, RebalanceOutcome::Balanced);
        assert_eq!(again.swaps, 0);
        assert_eq!(again.iterations, 0);
        assert_eq!(a.version(), version);
    }

    #[test]
    fn fully_locked_input_gets_stuck() {
        let cal = calendar(3);
        let res = resources(4);
        let mut config = EngineConfig::default();
        config.rebalance.max_stuck = 3;
        let scope = Scope::new(&cal, &res, &config);
        let mut a = Assignment::from_phase_one(vec![
            Task::phase_one("t1", "r1", "A", "s1", &["r2", "r3"]),
            Task::phase_one("t2", "r1", "A", "s2", &["r2", "r3"]),
            Task::phase_one("t3", "r1", "A", "s3", &["r2", "r3"]),
        ]);

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        let report = rebalance(&scope, &mut a, &mut ctx, 100).unwrap();
        assert_eq!(report.outcome, RebalanceOutcome::Stuck);
        assert_eq!(report.swaps, 0);
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn iteration_budget_is_respected() {
        let cal = calendar(6);
        let res = resources(4);
        let config = EngineConfig::default();
        let scope = Scope::new(&cal, &res, &config);
        let mut a = skewed();

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        let report = rebalance(&scope, &mut a, &mut ctx, 0).unwrap();
        assert_eq!(report.outcome, RebalanceOutcome::BudgetExhausted);
        assert_eq!(report.swaps, 0);
    }

    #[test]
    fn relieve_moves_a_different_slot() {
        let cal = calendar(6);
        let res = resources(4);
        let config = EngineConfig::default();
        let scope = Scope::new(&cal, &res, &config);
        let mut a = skewed();
        let fair = FairShare::of(&scope.workload(&a));

        let mut ctx = RebalanceContext::new(&config.rebalance, 1);
        // r1 holds movable slots on t2 (index 1) and t4 (index 3); keep t4.
        let relieved = relieve(&scope, &mut a, &mut ctx, "r1", 3, &fair).unwrap();
        // r4 is primary on t2, so nothing else can go to it.
        assert!(!relieved);

        let relieved = relieve(&scope, &mut a, &mut ctx, "r1", 1, &fair).unwrap();
        assert!(relieved);
        assert!(a.task(3).unwrap().has_secondary("r4"));
        assert_eq!(ctx.history()[0].reason, SwapReason::Relief);
    }

    /// Workloads r1..r8 = [6, 6, 2, 2, 2, 2, 2, 2]. Only r1's entry on t1 is
    /// locked; r1 and r2 are movable on t2..t6.
    fn lopsided() -> Assignment {
        let mut t1 = Task::phase_one("t1", "r3", "A", "s1", &["r1"]);
        t1.secondaries.push(SecondaryAssignee::real("r2"));
        let mut tasks = vec![t1];
        for (i, primary) in ["r4", "r5", "r6", "r7", "r8"].iter().enumerate() {
            let slot = format!("s{}", i + 2);
            let mut t = Task::phase_one(&format!("t{}", i + 2), *primary, "A", &slot, &[]);
            t.secondaries.push(SecondaryAssignee::real("r1"));
            t.secondaries.push(SecondaryAssignee::real("r2"));
            tasks.push(t);
        }
        tasks.push(Task::phase_one("t7", "r3", "A", "s7", &["r4", "r5"]));
        tasks.push(Task::phase_one("t8", "r6", "A", "s8", &["r7", "r8"]));
        Assignment::new(tasks)
    }

    #[test]
    fn wide_spread_triggers_several_swaps_per_iteration() {
        let cal = calendar(8);
        let res = resources(8);
        let mut config = EngineConfig::default();
        config.rebalance.aggressive_spread = 3;
        let scope = Scope::new(&cal, &res, &config);

        let mut a = lopsided();
        let loads = scope.workload(&a);
        assert_eq!(loads.values().copied().collect::<Vec<_>>(), vec![6, 6, 2, 2, 2, 2, 2, 2]);
        // Nobody under the lower bound, so the spread of 4 goes straight to the aggressive pass.
        assert_eq!(FairShare::of(&loads).lower, 2);

        let mut ctx = RebalanceContext::new(&config.rebalance, 9);
        let report = rebalance(&scope, &mut a, &mut ctx, 1).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.outcome, RebalanceOutcome::BudgetExhausted);
        assert_eq!(report.swaps, 2);
        assert!(ctx.history().iter().all(|s| s.reason == SwapReason::Aggressive));
        let pairs: Vec<(&str, &str)> = ctx
            .history()
            .iter()
            .map(|s| (s.from.as_str(), s.to.as_str()))
            .collect();
        assert_eq!(pairs, vec![("r1", "r3"), ("r2", "r4")]);

        let mut replay = lopsided();
        let mut replay_ctx = RebalanceContext::new(&config.rebalance, 9);
        rebalance(&scope, &mut replay, &mut replay_ctx, 1).unwrap();
        assert_eq!(replay_ctx.history(), ctx.history());

        let report = rebalance(&scope, &mut a, &mut ctx, 100).unwrap();
        assert_eq!(report.outcome, RebalanceOutcome::Balanced);
        assert!(a.task(0).unwrap().has_secondary("r1"));
        assert!(!ctx.history().iter().any(|s| s.task == "t1" && s.from == "r1"));
    }
}
