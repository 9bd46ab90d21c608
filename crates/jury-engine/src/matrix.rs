//! Precomputed assignability table over (resource, open task) pairs.
//!
//! A placement only changes feasibility inside its own time slot, so the
//! table is refreshed row by row: `sync` asks the assignment which slots
//! changed since the last seen version and recomputes just those tasks.

use std::collections::BTreeMap;

use jury_core::{Assignment, ResourceId};

use crate::evaluator::Evaluator;

#[derive(Debug, Clone)]
pub struct AssignabilityMatrix {
    resources: Vec<ResourceId>,
    /// task index -> row of per-resource flags
    rows: BTreeMap<usize, Vec<bool>>,
    seen_version: u64,
}

impl AssignabilityMatrix {
    pub fn build(
        evaluator: &Evaluator<'_>,
        assignment: &Assignment,
        resources: &[ResourceId],
        open_tasks: &[usize],
    ) -> Self {
        let mut matrix = Self {
            resources: resources.to_vec(),
            rows: BTreeMap::new(),
            seen_version: assignment.version(),
        };
        for &task in open_tasks {
            let row = matrix.compute_row(evaluator, assignment, task);
            matrix.rows.insert(task, row);
        }
        matrix
    }

    fn compute_row(&self, evaluator: &Evaluator<'_>, assignment: &Assignment, task: usize) -> Vec<bool> {
        self.resources
            .iter()
            .map(|r| evaluator.is_assignable(assignment, r, task))
            .collect()
    }

    pub fn is_stale(&self, assignment: &Assignment) -> bool {
        self.seen_version != assignment.version()
    }

    /// Recompute the rows of every task whose slot changed since the last
    /// sync. Returns how many rows were refreshed.
    pub fn sync(&mut self, evaluator: &Evaluator<'_>, assignment: &Assignment) -> usize {
        if !self.is_stale(assignment) {
            return 0;
        }
        let mut refreshed = 0;
        for slot in assignment.slots_touched_since(self.seen_version) {
            for &task in assignment.tasks_in_slot(slot) {
                if self.rows.contains_key(&task) {
                    let row = self.compute_row(evaluator, assignment, task);
                    self.rows.insert(task, row);
                    refreshed += 1;
                }
            }
        }
        self.seen_version = assignment.version();
        refreshed
    }

    pub fn is_assignable(&self, resource: &str, task: usize) -> bool {
        let Some(row) = self.rows.get(&task) else {
            return false;
        };
        self.resources
            .iter()
            .position(|r| r == resource)
            .is_some_and(|i| row[i])
    }

    /// Resources that may currently take `task`, in catalog order.
    pub fn feasible(&self, task: usize) -> Vec<&str> {
        let Some(row) = self.rows.get(&task) else {
            return Vec::new();
        };
        self.resources
            .iter()
            .zip(row)
            .filter(|(_, ok)| **ok)
            .map(|(r, _)| r.as_str())
            .collect()
    }
}
