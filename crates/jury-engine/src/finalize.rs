//! Fixation and final audit.
//!
//! Whatever completion could not staff is padded with placeholders so every
//! task leaves the engine with exactly two secondary entries. The audit then
//! re-checks the hard rules on the finished assignment.

use std::collections::BTreeMap;

use jury_core::{Assignment, SECONDARY_SLOTS, Task, TaskId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineResult;

/// Pad every short task with placeholders. Returns the ids of padded tasks.
pub fn finalize(assignment: &mut Assignment) -> EngineResult<Vec<TaskId>> {
    let mut padded = Vec::new();
    for idx in assignment.open_tasks() {
        let added = assignment.fill_placeholders(idx)?;
        if added > 0 {
            let id = assignment.tasks()[idx].id.clone();
            warn!(task = %id, placeholders = added, "task fixed with placeholder secondaries");
            padded.push(id);
        }
    }
    Ok(padded)
}

/// A hard rule broken in a finished assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub task: TaskId,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.task, self.message)
    }
}

/// Check finished tasks against the hard rules, including that every
/// locked secondary is still in place.
pub fn audit(tasks: &[Task]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut slot_holders: BTreeMap<(&str, &str), &str> = BTreeMap::new();

    for task in tasks {
        let mut flag = |message: String| {
            violations.push(Violation {
                task: task.id.clone(),
                message,
            })
        };

        if task.secondaries.len() != SECONDARY_SLOTS {
            flag(format!(
                "expected {SECONDARY_SLOTS} secondary entries, found {}",
                task.secondaries.len()
            ));
        }

        let reals: Vec<&str> = task.secondaries.iter().filter_map(|s| s.resource()).collect();
        for (i, r) in reals.iter().enumerate() {
            if *r == task.primary {
                flag(format!("{r} is both primary and secondary"));
            }
            if reals[..i].contains(r) {
                flag(format!("{r} appears twice"));
            }
        }

        for locked in &task.locked {
            if !task.has_secondary(locked) {
                flag(format!("locked secondary {locked} was removed"));
            }
        }

        for r in std::iter::once(task.primary.as_str()).chain(reals.iter().copied()) {
            if let Some(other) = slot_holders.insert((task.slot.as_str(), r), task.id.as_str()) {
                if other != task.id {
                    flag(format!("{r} is double-booked in slot {} with task {other}", task.slot));
                }
            }
        }
    }
    violations
}
