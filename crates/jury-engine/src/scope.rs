//! Read-only inputs shared by every pass of a run.

use std::collections::BTreeMap;

use jury_core::{Assignment, EngineConfig, ResourceId, SlotCalendar};

use crate::evaluator::Evaluator;
use crate::workload::workload;

#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub evaluator: Evaluator<'a>,
    pub resources: &'a [ResourceId],
    pub config: &'a EngineConfig,
}

impl<'a> Scope<'a> {
    pub fn new(calendar: &'a SlotCalendar, resources: &'a [ResourceId], config: &'a EngineConfig) -> Self {
        Self {
            evaluator: Evaluator::new(calendar),
            resources,
            config,
        }
    }

    pub fn workload(&self, assignment: &Assignment) -> BTreeMap<ResourceId, u32> {
        workload(assignment, self.resources)
    }

    /// Tasks where `resource` holds a movable secondary, cheapest to give
    /// up first: least continuity lost, then shortest streak, then index.
    pub fn movable_slots(&self, assignment: &Assignment, resource: &str) -> Vec<usize> {
        let mut slots: Vec<(u32, u32, usize)> = assignment
            .tasks()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.movable_secondaries().any(|r| r == resource))
            .map(|(i, _)| {
                (
                    self.evaluator.continuity_score(assignment, resource, i),
                    self.evaluator.chain_extension(assignment, resource, i),
                    i,
                )
            })
            .collect();
        slots.sort();
        slots.into_iter().map(|(_, _, i)| i).collect()
    }
}
