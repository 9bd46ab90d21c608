//! The versioned, exclusively owned assignment state.
//!
//! Every component of the engine reads and writes the same `Assignment`.
//! Each mutation is checked against the hard rules before it is applied:
//! a resource appears at most once per task, and it holds at most one
//! task per time slot. Successful mutations bump `version` and log the
//! slot they touched, so derived tables know which rows went stale.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConflictKind, CoreError, CoreResult};
use crate::types::{RoomId, SecondaryAssignee, SlotId, Task};

#[derive(Debug, Clone)]
pub struct Assignment {
    tasks: Vec<Task>,
    by_slot: BTreeMap<SlotId, Vec<usize>>,
    by_cell: BTreeMap<(RoomId, SlotId), usize>,
    version: u64,
    /// `touched[v]` is the slot changed by the mutation that produced version `v + 1`.
    touched: Vec<SlotId>,
}

impl Assignment {
    /// Wrap tasks as-is; locked sets are taken from the tasks.
    pub fn new(tasks: Vec<Task>) -> Self {
        let mut by_slot: BTreeMap<SlotId, Vec<usize>> = BTreeMap::new();
        let mut by_cell = BTreeMap::new();
        for (i, task) in tasks.iter().enumerate() {
            by_slot.entry(task.slot.clone()).or_default().push(i);
            by_cell
                .entry((task.room.clone(), task.slot.clone()))
                .or_insert(i);
        }
        Self {
            tasks,
            by_slot,
            by_cell,
            version: 0,
            touched: Vec::new(),
        }
    }

    /// Wrap tasks handed over by the first phase: every real secondary
    /// already present becomes locked.
    pub fn from_phase_one(mut tasks: Vec<Task>) -> Self {
        for task in &mut tasks {
            let present: Vec<String> = task
                .secondaries
                .iter()
                .filter_map(|s| s.resource().map(str::to_string))
                .collect();
            task.locked.extend(present);
        }
        Self::new(tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, idx: usize) -> Option<&Task> {
        self.tasks.get(idx)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Slots touched by mutations after `version` was observed.
    pub fn slots_touched_since(&self, version: u64) -> BTreeSet<&str> {
        let from = usize::try_from(version).unwrap_or(usize::MAX);
        self.touched
            .get(from..)
            .unwrap_or(&[])
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// Indices of every task scheduled in `slot`.
    pub fn tasks_in_slot(&self, slot: &str) -> &[usize] {
        self.by_slot.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The task occupying a (room, slot) cell.
    pub fn task_at(&self, room: &str, slot: &str) -> Option<usize> {
        self.by_cell
            .get(&(room.to_string(), slot.to_string()))
            .copied()
    }

    /// The task `resource` holds in `slot`, in any role.
    pub fn held_in_slot(&self, resource: &str, slot: &str) -> Option<usize> {
        self.tasks_in_slot(slot)
            .iter()
            .copied()
            .find(|&i| self.tasks[i].holds(resource))
    }

    /// Indices of tasks that still miss secondary entries.
    pub fn open_tasks(&self) -> Vec<usize> {
        (0..self.tasks.len())
            .filter(|&i| !self.tasks[i].is_complete())
            .collect()
    }

    /// Total number of secondary entries still missing.
    pub fn open_slot_count(&self) -> usize {
        self.tasks.iter().map(Task::missing).sum()
    }

    fn get(&self, idx: usize) -> CoreResult<&Task> {
        self.tasks.get(idx).ok_or(CoreError::UnknownTask(idx))
    }

    fn check_addable(&self, idx: usize, resource: &str) -> CoreResult<()> {
        let task = self.get(idx)?;
        if task.is_complete() {
            return Err(CoreError::conflict(&task.id, resource, ConflictKind::TaskFull));
        }
        if task.holds(resource) {
            return Err(CoreError::conflict(&task.id, resource, ConflictKind::AlreadyOnTask));
        }
        if self.held_in_slot(resource, &task.slot).is_some() {
            return Err(CoreError::conflict(&task.id, resource, ConflictKind::SlotOccupied));
        }
        Ok(())
    }

    fn check_movable(&self, idx: usize, resource: &str) -> CoreResult<()> {
        let task = self.get(idx)?;
        if !task.has_secondary(resource) {
            return Err(CoreError::conflict(&task.id, resource, ConflictKind::NotOnTask));
        }
        if task.is_locked(resource) {
            return Err(CoreError::LockedEntry {
                task: task.id.clone(),
                resource: resource.to_string(),
            });
        }
        Ok(())
    }

    fn bump(&mut self, idx: usize) {
        self.version += 1;
        self.touched.push(self.tasks[idx].slot.clone());
    }

    /// Add `resource` as a new, unlocked secondary of task `idx`.
    pub fn add_secondary(&mut self, idx: usize, resource: &str) -> CoreResult<()> {
        self.check_addable(idx, resource)?;
        self.tasks[idx]
            .secondaries
            .push(SecondaryAssignee::real(resource));
        self.bump(idx);
        Ok(())
    }

    /// Remove an unlocked secondary from task `idx`.
    pub fn remove_secondary(&mut self, idx: usize, resource: &str) -> CoreResult<()> {
        self.check_movable(idx, resource)?;
        self.tasks[idx]
            .secondaries
            .retain(|s| s.resource() != Some(resource));
        self.bump(idx);
        Ok(())
    }

    /// Hand an unlocked secondary slot of task `idx` from `from` to `to`.
    pub fn replace_secondary(&mut self, idx: usize, from: &str, to: &str) -> CoreResult<()> {
        self.check_movable(idx, from)?;
        let task = &self.tasks[idx];
        if task.holds(to) {
            return Err(CoreError::conflict(&task.id, to, ConflictKind::AlreadyOnTask));
        }
        if self.held_in_slot(to, &task.slot).is_some() {
            return Err(CoreError::conflict(&task.id, to, ConflictKind::SlotOccupied));
        }
        for entry in &mut self.tasks[idx].secondaries {
            if entry.resource() == Some(from) {
                *entry = SecondaryAssignee::real(to);
            }
        }
        self.bump(idx);
        Ok(())
    }

    /// Move `moved` from `other` onto `open` and let `replacement` take
    /// its place on `other`. Both tasks must share a slot. Applied as one
    /// step; nothing changes if any rule would break.
    pub fn chain_swap(
        &mut self,
        open: usize,
        other: usize,
        moved: &str,
        replacement: &str,
    ) -> CoreResult<()> {
        let open_task = self.get(open)?;
        let other_task = self.get(other)?;
        if open == other || open_task.slot != other_task.slot {
            return Err(CoreError::InvalidInput(format!(
                "chain swap needs two distinct tasks in one slot, got {} and {}",
                open_task.id, other_task.id
            )));
        }
        if open_task.is_complete() {
            return Err(CoreError::conflict(&open_task.id, moved, ConflictKind::TaskFull));
        }
        if open_task.holds(moved) {
            return Err(CoreError::conflict(&open_task.id, moved, ConflictKind::AlreadyOnTask));
        }
        self.check_movable(other, moved)?;
        if moved == replacement || other_task.holds(replacement) {
            return Err(CoreError::conflict(
                &other_task.id,
                replacement,
                ConflictKind::AlreadyOnTask,
            ));
        }
        if self.held_in_slot(replacement, &other_task.slot).is_some() {
            return Err(CoreError::conflict(
                &other_task.id,
                replacement,
                ConflictKind::SlotOccupied,
            ));
        }

        for entry in &mut self.tasks[other].secondaries {
            if entry.resource() == Some(moved) {
                *entry = SecondaryAssignee::real(replacement);
            }
        }
        self.tasks[open]
            .secondaries
            .push(SecondaryAssignee::real(moved));
        self.bump(other);
        self.bump(open);
        Ok(())
    }

    /// Pad task `idx` with placeholders up to two secondaries. Returns how
    /// many were added.
    pub fn fill_placeholders(&mut self, idx: usize) -> CoreResult<usize> {
        let missing = self.get(idx)?.missing();
        if missing == 0 {
            return Ok(0);
        }
        let task = &mut self.tasks[idx];
        task.secondaries
            .extend(std::iter::repeat_n(SecondaryAssignee::Placeholder, missing));
        self.bump(idx);
        Ok(missing)
    }
}
