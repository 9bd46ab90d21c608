//! Fair-share quota planning.
//!
//! With `N` resources, current total workload `W` and `Y` open secondary
//! slots, the fair share is `X = (W + Y) / N` and the balanced band is
//! `[X-1, X+1]`. Open slots are handed out one unit at a time to the
//! least-loaded resource (ties by id), in four steps:
//!
//! ```text
//! 1. raise everyone toward lower  = ceil(X - 1)
//! 2. raise everyone toward target = floor(X)
//! 3. raise everyone toward upper  = floor(X + 1)
//! 4. anything left: least-loaded first, no ceiling
//! ```
//!
//! Unit-wise water-filling makes step 1 proportional when `Y` cannot lift
//! everyone, and step 4 spreads overflow instead of concentrating it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use jury_core::ResourceId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The fair-share target and its integer band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FairShare {
    pub mean: f64,
    pub lower: u32,
    pub target: u32,
    pub upper: u32,
}

impl FairShare {
    pub fn new(total: u32, resources: usize) -> Self {
        if resources == 0 {
            return Self::default();
        }
        let mean = f64::from(total) / resources as f64;
        Self {
            mean,
            lower: (mean - 1.0).ceil().max(0.0) as u32,
            target: mean.floor() as u32,
            upper: (mean + 1.0).floor() as u32,
        }
    }

    /// Fair share of an assignment with no open slots left.
    pub fn of(loads: &BTreeMap<ResourceId, u32>) -> Self {
        Self::new(loads.values().sum(), loads.len())
    }

    pub fn contains(&self, workload: u32) -> bool {
        (self.lower..=self.upper).contains(&workload)
    }
}

/// Planned number of new secondary slots per resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaPlan {
    pub fair_share: FairShare,
    quotas: BTreeMap<ResourceId, u32>,
}

impl QuotaPlan {
    pub fn remaining(&self, resource: &str) -> u32 {
        self.quotas.get(resource).copied().unwrap_or(0)
    }

    /// Consume one unit of `resource`'s quota. Returns false when the
    /// resource had none left; placements past the quota are still allowed.
    pub fn consume(&mut self, resource: &str) -> bool {
        match self.quotas.get_mut(resource) {
            Some(q) if *q > 0 => {
                *q -= 1;
                true
            }
            _ => false,
        }
    }

    /// Account for a swap that moved one slot from `donor` to `recipient`.
    /// The recipient pays one unit; the donor gets one back only while its
    /// live load sits below the target.
    pub fn settle_swap(&mut self, donor: &str, donor_load: u32, recipient: &str) {
        self.consume(recipient);
        if donor_load < self.fair_share.target {
            *self.quotas.entry(donor.to_string()).or_insert(0) += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.quotas.values().sum()
    }

    pub fn quotas(&self) -> &BTreeMap<ResourceId, u32> {
        &self.quotas
    }
}

/// Plan how `open_slots` new secondary slots should be spread.
pub fn plan_quotas(loads: &BTreeMap<ResourceId, u32>, open_slots: u32) -> QuotaPlan {
    let total: u32 = loads.values().sum::<u32>() + open_slots;
    let fair_share = FairShare::new(total, loads.len());

    let mut projected = loads.clone();
    let mut quotas: BTreeMap<ResourceId, u32> = loads.keys().map(|r| (r.clone(), 0)).collect();
    let mut remaining = open_slots;

    for level in [
        Some(fair_share.lower),
        Some(fair_share.target),
        Some(fair_share.upper),
        None,
    ] {
        if remaining == 0 {
            break;
        }
        let before = remaining;
        fill_toward(&mut projected, &mut quotas, &mut remaining, level);
        debug!(
            level = ?level,
            handed_out = before - remaining,
            remaining,
            "quota fill step"
        );
    }

    QuotaPlan { fair_share, quotas }
}

/// Hand out single units to the least-projected resource strictly below
/// `level` until none is left below it or the budget runs out.
fn fill_toward(
    projected: &mut BTreeMap<ResourceId, u32>,
    quotas: &mut BTreeMap<ResourceId, u32>,
    remaining: &mut u32,
    level: Option<u32>,
) {
    let below = |load: u32| level.is_none_or(|l| load < l);

    let mut heap: BinaryHeap<Reverse<(u32, ResourceId)>> = projected
        .iter()
        .filter(|(_, load)| below(**load))
        .map(|(r, load)| Reverse((*load, r.clone())))
        .collect();

    while *remaining > 0 {
        let Some(Reverse((load, resource))) = heap.pop() else {
            break;
        };
        let load = load + 1;
        projected.insert(resource.clone(), load);
        *quotas.entry(resource.clone()).or_insert(0) += 1;
        *remaining -= 1;
        if below(load) {
            heap.push(Reverse((load, resource)));
        }
    }
}
