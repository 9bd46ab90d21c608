//! Human-readable run summary.

use crate::engine::EngineStats;
use crate::rebalance::RebalanceOutcome;
use crate::scorer::Tier;

fn outcome_label(outcome: RebalanceOutcome) -> &'static str {
    match outcome {
        RebalanceOutcome::Balanced => "balanced",
        RebalanceOutcome::Stuck => "stuck",
        RebalanceOutcome::BudgetExhausted => "budget exhausted",
    }
}

pub fn format_report(stats: &EngineStats) -> String {
    let mut out = String::new();
    let w = &stats.workload;
    let f = &stats.fair_share;

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Jury Completion Summary                 ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Open slots: {:<28}║\n", stats.open_slots));
    out.push_str(&format!(
        "║  Workload:   {:<28}║\n",
        format!("min {} / avg {:.2} / max {}", w.min, w.avg, w.max)
    ));
    out.push_str(&format!(
        "║  Band:       {:<28}║\n",
        format!("[{}, {}] target {}", f.lower, f.upper, f.target)
    ));
    out.push_str(&format!(
        "║  Rebalance:  {:<28}║\n",
        outcome_label(stats.final_rebalance.outcome)
    ));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    out.push_str(&format!("Placements ({} total):\n", stats.tier_counts.total()));
    for tier in Tier::LADDER {
        out.push_str(&format!("  {:<11} {}\n", tier.label(), stats.tier_counts.get(tier)));
    }
    out.push('\n');

    let s = &stats.swaps;
    out.push_str(&format!("Swaps ({} total):\n", s.total));
    out.push_str(&format!("  quick       {}\n", s.quick));
    out.push_str(&format!("  relief      {}\n", s.relief));
    out.push_str(&format!(
        "  final       {} in {} iterations\n\n",
        s.final_pass, stats.final_rebalance.iterations
    ));

    if !stats.placeholder_tasks.is_empty() {
        out.push_str("⚠️  FIXED WITH PLACEHOLDERS:\n\n");
        for task in &stats.placeholder_tasks {
            out.push_str(&format!("  • {task}\n"));
        }
        out.push('\n');
    }

    if !stats.unrelieved_overflows.is_empty() {
        out.push_str("❌ UNRELIEVED OVERFLOWS:\n\n");
        for (i, o) in stats.unrelieved_overflows.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {} on {} (workload {})\n",
                i + 1,
                o.resource,
                o.task,
                o.workload
            ));
        }
        out.push('\n');
    }

    out.push_str("Workload per resource:\n");
    for (resource, load) in &stats.loads {
        let marker = if f.contains(*load) { " " } else { "!" };
        out.push_str(&format!("  {marker} {resource:<16} {load}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{OverflowRecord, TierCounts};
    use crate::engine::SwapCounts;
    use crate::quota::FairShare;
    use crate::rebalance::RebalanceReport;
    use crate::workload::WorkloadSummary;
    use std::collections::BTreeMap;

    fn stats() -> EngineStats {
        let loads: BTreeMap<String, u32> = [("a", 4), ("b", 4), ("c", 9)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        EngineStats {
            open_slots: 6,
            tier_counts: TierCounts {
                normal: 4,
                overflow: 2,
                ..TierCounts::default()
            },
            swaps: SwapCounts {
                quick: 1,
                relief: 0,
                final_pass: 2,
                total: 3,
            },
            final_rebalance: RebalanceReport {
                outcome: RebalanceOutcome::Stuck,
                iterations: 20,
                swaps: 2,
            },
            workload: WorkloadSummary::of(&loads),
            fair_share: FairShare::of(&loads),
            loads,
            placeholder_tasks: vec!["t9".to_string()],
            unrelieved_overflows: vec![OverflowRecord {
                task: "t4".to_string(),
                resource: "c".to_string(),
                workload: 9,
            }],
        }
    }

    #[test]
    fn report_lists_problems() {
        let text = format_report(&stats());
        assert!(text.contains("Placements (6 total)"));
        assert!(text.contains("overflow    2"));
        assert!(text.contains("stuck"));
        assert!(text.contains("• t9"));
        assert!(text.contains("1. c on t4 (workload 9)"));
        assert!(text.contains("! c"));
    }
}
