//! Conflict and continuity evaluation.
//!
//! The slot rule is the only hard constraint: a resource can take a task
//! unless it already holds some task in that time slot (which includes
//! sitting on the task itself). Continuity rewards placing a resource
//! next to a same-room slot it already holds on the same day.

use jury_core::{Assignment, SlotCalendar};

#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    calendar: &'a SlotCalendar,
}

impl<'a> Evaluator<'a> {
    pub fn new(calendar: &'a SlotCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &'a SlotCalendar {
        self.calendar
    }

    /// Can `resource` be added to task `task` without breaking a hard rule?
    pub fn is_assignable(&self, assignment: &Assignment, resource: &str, task: usize) -> bool {
        let Some(t) = assignment.task(task) else {
            return false;
        };
        !t.holds(resource) && assignment.held_in_slot(resource, &t.slot).is_none()
    }

    /// 1 if `resource` holds the same-room slot right before or after the
    /// task's slot, else 0.
    pub fn continuity_score(&self, assignment: &Assignment, resource: &str, task: usize) -> u32 {
        let Some(t) = assignment.task(task) else {
            return 0;
        };
        let before = self
            .calendar
            .prev(&t.slot)
            .is_some_and(|s| holds_cell(assignment, resource, &t.room, s));
        let after = self
            .calendar
            .next(&t.slot)
            .is_some_and(|s| holds_cell(assignment, resource, &t.room, s));
        u32::from(before || after)
    }

    /// Length of the unbroken same-room streak `resource` holds directly
    /// before plus directly after the task's slot.
    pub fn chain_extension(&self, assignment: &Assignment, resource: &str, task: usize) -> u32 {
        let Some(t) = assignment.task(task) else {
            return 0;
        };

        let mut streak = 0;
        let mut cursor = self.calendar.prev(&t.slot);
        while let Some(slot) = cursor {
            if !holds_cell(assignment, resource, &t.room, slot) {
                break;
            }
            streak += 1;
            cursor = self.calendar.prev(slot);
        }

        let mut cursor = self.calendar.next(&t.slot);
        while let Some(slot) = cursor {
            if !holds_cell(assignment, resource, &t.room, slot) {
                break;
            }
            streak += 1;
            cursor = self.calendar.next(slot);
        }

        streak
    }
}

fn holds_cell(assignment: &Assignment, resource: &str, room: &str, slot: &str) -> bool {
    assignment
        .task_at(room, slot)
        .and_then(|i| assignment.task(i))
        .is_some_and(|t| t.holds(resource))
}
