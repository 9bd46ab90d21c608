//! Workload tracking.
//!
//! A resource's workload is the number of tasks it sits on, as primary or
//! real secondary. It is always derived from the live assignment and never
//! stored.

use std::collections::{BTreeMap, BTreeSet};

use jury_core::{Assignment, ResourceId};
use serde::{Deserialize, Serialize};

/// Count every slot each resource holds. Catalog resources without any
/// slot appear with zero.
pub fn workload(assignment: &Assignment, resources: &[ResourceId]) -> BTreeMap<ResourceId, u32> {
    let mut loads: BTreeMap<ResourceId, u32> =
        resources.iter().map(|r| (r.clone(), 0)).collect();

    for task in assignment.tasks() {
        let mut on_task: BTreeSet<&str> = BTreeSet::new();
        on_task.insert(task.primary.as_str());
        on_task.extend(task.secondaries.iter().filter_map(|s| s.resource()));
        for resource in on_task {
            *loads.entry(resource.to_string()).or_insert(0) += 1;
        }
    }

    loads
}

/// Min / average / max of a workload map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSummary {
    pub min: u32,
    pub avg: f64,
    pub max: u32,
    pub spread: u32,
}

impl WorkloadSummary {
    pub fn of(loads: &BTreeMap<ResourceId, u32>) -> Self {
        if loads.is_empty() {
            return Self::default();
        }
        let min = loads.values().copied().min().unwrap_or(0);
        let max = loads.values().copied().max().unwrap_or(0);
        let total: u32 = loads.values().sum();
        Self {
            min,
            avg: f64::from(total) / loads.len() as f64,
            max,
            spread: max - min,
        }
    }
}
