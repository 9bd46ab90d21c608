//! Domain types shared by the jury crates.
//!
//! A *task* is one presentation session sitting in a fixed room and time
//! slot. It has exactly one primary assignee and up to two secondary
//! reviewers. Identifiers are plain strings, as handed over by the calling
//! application.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unique identifier for a reviewer.
pub type ResourceId = String;

/// Unique identifier for a presentation session.
pub type TaskId = String;

/// Unique identifier for a room.
pub type RoomId = String;

/// Unique identifier for a time slot.
pub type SlotId = String;

/// Number of secondary reviewers every task must end with.
pub const SECONDARY_SLOTS: usize = 2;

/// A reviewer. Only identity matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
}

/// A room in the session grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
}

/// A time slot, positioned within its day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: SlotId,
    /// Day grouping key. Adjacency never crosses days.
    pub day: String,
    /// Ordinal position within the day (need not be contiguous).
    pub position: u32,
}

/// One entry in a task's secondary list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecondaryAssignee {
    /// A real reviewer.
    Real { resource: ResourceId },
    /// Marker for a slot that could not be staffed.
    Placeholder,
}

impl SecondaryAssignee {
    pub fn real(resource: impl Into<ResourceId>) -> Self {
        Self::Real {
            resource: resource.into(),
        }
    }

    /// The reviewer behind this entry, if it is not a placeholder.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Real { resource } => Some(resource),
            Self::Placeholder => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

/// A presentation session with its primary and secondary assignees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub primary: ResourceId,
    pub room: RoomId,
    pub slot: SlotId,
    #[serde(default)]
    pub secondaries: Vec<SecondaryAssignee>,
    /// Secondaries carried over from the prior phase. Never removed.
    #[serde(default)]
    pub locked: BTreeSet<ResourceId>,
}

impl Task {
    /// Build a task as handed over by the first phase. Every given
    /// secondary is locked.
    pub fn phase_one(
        id: impl Into<TaskId>,
        primary: impl Into<ResourceId>,
        room: impl Into<RoomId>,
        slot: impl Into<SlotId>,
        secondaries: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            primary: primary.into(),
            room: room.into(),
            slot: slot.into(),
            secondaries: secondaries.iter().map(|r| SecondaryAssignee::real(*r)).collect(),
            locked: secondaries.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Whether `resource` sits on this task in any role.
    pub fn holds(&self, resource: &str) -> bool {
        self.primary == resource || self.has_secondary(resource)
    }

    pub fn has_secondary(&self, resource: &str) -> bool {
        self.secondaries
            .iter()
            .any(|s| s.resource() == Some(resource))
    }

    pub fn is_locked(&self, resource: &str) -> bool {
        self.locked.contains(resource)
    }

    /// Real secondaries that this phase is allowed to move.
    pub fn movable_secondaries(&self) -> impl Iterator<Item = &str> {
        self.secondaries
            .iter()
            .filter_map(SecondaryAssignee::resource)
            .filter(|r| !self.locked.contains(*r))
    }

    /// How many secondary entries are still missing.
    pub fn missing(&self) -> usize {
        SECONDARY_SLOTS.saturating_sub(self.secondaries.len())
    }

    pub fn is_complete(&self) -> bool {
        self.missing() == 0
    }

    pub fn placeholder_count(&self) -> usize {
        self.secondaries.iter().filter(|s| s.is_placeholder()).count()
    }
}
