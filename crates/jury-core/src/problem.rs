//! Input bundle handed over by the first phase.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Resource, Room, SECONDARY_SLOTS, Task, TimeSlot};

/// Catalogs plus the partial assignment produced by the first phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Problem {
    pub resources: Vec<Resource>,
    pub slots: Vec<TimeSlot>,
    pub rooms: Vec<Room>,
    pub tasks: Vec<Task>,
}

impl Problem {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let problem: Problem = serde_json::from_str(&content)?;
        Ok(problem)
    }

    pub fn resource_ids(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.id.clone()).collect()
    }

    /// Check catalog references and the hard rules on the incoming tasks.
    pub fn validate(&self) -> CoreResult<()> {
        let resources = unique_ids("resource", self.resources.iter().map(|r| r.id.as_str()))?;
        let slots = unique_ids("slot", self.slots.iter().map(|s| s.id.as_str()))?;
        let rooms = unique_ids("room", self.rooms.iter().map(|r| r.id.as_str()))?;
        unique_ids("task", self.tasks.iter().map(|t| t.id.as_str()))?;

        let mut cells: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut held: BTreeMap<(&str, &str), &str> = BTreeMap::new();

        for task in &self.tasks {
            if !slots.contains(task.slot.as_str()) {
                return Err(invalid(format!("task {} references unknown slot {}", task.id, task.slot)));
            }
            if !rooms.contains(task.room.as_str()) {
                return Err(invalid(format!("task {} references unknown room {}", task.id, task.room)));
            }
            if !cells.insert((task.room.as_str(), task.slot.as_str())) {
                return Err(invalid(format!(
                    "room {} already hosts a task in slot {}",
                    task.room, task.slot
                )));
            }
            if task.secondaries.len() > SECONDARY_SLOTS {
                return Err(invalid(format!(
                    "task {} has {} secondaries",
                    task.id,
                    task.secondaries.len()
                )));
            }

            if task.secondaries.iter().any(|s| s.is_placeholder()) {
                return Err(invalid(format!(
                    "task {} carries a placeholder secondary; leave the entry out to mark it open",
                    task.id
                )));
            }
            if let Some(stray) = task.locked.iter().find(|r| !task.has_secondary(r)) {
                return Err(invalid(format!(
                    "task {} locks {stray}, which is not one of its secondaries",
                    task.id
                )));
            }

            let mut on_task = vec![task.primary.as_str()];
            on_task.extend(task.secondaries.iter().filter_map(|s| s.resource()));

            let mut seen = BTreeSet::new();
            for resource in on_task {
                if !resources.contains(resource) {
                    return Err(invalid(format!(
                        "task {} references unknown resource {resource}",
                        task.id
                    )));
                }
                if !seen.insert(resource) {
                    return Err(invalid(format!("resource {resource} appears twice on task {}", task.id)));
                }
                if let Some(other) = held.insert((resource, task.slot.as_str()), task.id.as_str()) {
                    return Err(invalid(format!(
                        "resource {resource} holds both {other} and {} in slot {}",
                        task.id, task.slot
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> CoreError {
    CoreError::InvalidInput(msg)
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> CoreResult<BTreeSet<&'a str>> {
    let mut set = BTreeSet::new();
    for id in ids {
        if !set.insert(id) {
            return Err(invalid(format!("duplicate {kind} id {id}")));
        }
    }
    Ok(set)
}
