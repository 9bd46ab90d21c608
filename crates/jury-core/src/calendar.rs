//! Day-local ordering of time slots.
//!
//! Adjacency is defined by the position-sorted slot sequence of each day,
//! so slot ids and gaps in positions never matter.

use std::collections::BTreeMap;

use crate::types::{SlotId, TimeSlot};

#[derive(Debug, Clone, Default)]
pub struct SlotCalendar {
    /// slot id -> (day, index within the day's sorted sequence)
    index: BTreeMap<SlotId, (String, usize)>,
    days: BTreeMap<String, Vec<SlotId>>,
}

impl SlotCalendar {
    pub fn new(slots: &[TimeSlot]) -> Self {
        let mut by_day: BTreeMap<String, Vec<&TimeSlot>> = BTreeMap::new();
        for slot in slots {
            by_day.entry(slot.day.clone()).or_default().push(slot);
        }

        let mut index = BTreeMap::new();
        let mut days = BTreeMap::new();
        for (day, mut day_slots) in by_day {
            day_slots.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
            let ids: Vec<SlotId> = day_slots.iter().map(|s| s.id.clone()).collect();
            for (i, id) in ids.iter().enumerate() {
                index.insert(id.clone(), (day.clone(), i));
            }
            days.insert(day, ids);
        }

        Self { index, days }
    }

    /// The slot immediately before `slot` on the same day.
    pub fn prev(&self, slot: &str) -> Option<&str> {
        let (day, i) = self.index.get(slot)?;
        let i = i.checked_sub(1)?;
        self.days.get(day)?.get(i).map(String::as_str)
    }

    /// The slot immediately after `slot` on the same day.
    pub fn next(&self, slot: &str) -> Option<&str> {
        let (day, i) = self.index.get(slot)?;
        self.days.get(day)?.get(i + 1).map(String::as_str)
    }

    /// Sort key (day, position) used for stable task ordering.
    pub fn order_key(&self, slot: &str) -> Option<(&str, usize)> {
        self.index.get(slot).map(|(d, i)| (d.as_str(), *i))
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.index.contains_key(slot)
    }
}
