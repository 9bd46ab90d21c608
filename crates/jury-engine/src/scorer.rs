//! Candidate scoring for secondary placements.
//!
//! Evaluates candidate reviewers for one open slot using a weighted
//! combination of:
//! - **Continuity**: an adjacent same-room slot is already held (dominant)
//! - **Quota**: remaining planned share from the fair-share model
//! - **Balance**: at or below the running average workload
//! - **Overload**: mild penalty above `average + overload margin`
//! - **Chain**: length of the same-room streak extended (tie-breaker)
//!
//! Each tier of the escalation ladder applies its own filters before
//! scoring; see [`Tier`].

use jury_core::{EngineConfig, Margins, ScoringWeights};
use serde::{Deserialize, Serialize};

use crate::quota::FairShare;

/// Escalation ladder, tried in order for every missing secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Quota left, below the band cap, not strictly overloaded.
    Normal,
    /// Quota and strict-overload filters dropped; band cap kept.
    Flexible,
    /// Ceiling loosened to `average + aggressive margin`, penalised above the band.
    Aggressive,
    /// Pull a movable reviewer over from a sibling task in the same slot.
    ChainSwap,
    /// Place above every ceiling, then try one relieving swap.
    Overflow,
}

impl Tier {
    pub const LADDER: [Tier; 5] = [
        Tier::Normal,
        Tier::Flexible,
        Tier::Aggressive,
        Tier::ChainSwap,
        Tier::Overflow,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Flexible => "flexible",
            Tier::Aggressive => "aggressive",
            Tier::ChainSwap => "chain-swap",
            Tier::Overflow => "overflow",
        }
    }
}

/// What the scorer needs to know about one candidate.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub resource: &'a str,
    pub workload: u32,
    pub quota: u32,
    pub continuity: u32,
    pub chain: u32,
}

/// Thresholds derived from the fair share and the running average.
#[derive(Debug, Clone)]
pub struct Thresholds {
    pub average: f64,
    pub upper: u32,
    pub weights: ScoringWeights,
    pub margins: Margins,
}

impl Thresholds {
    pub fn new(config: &EngineConfig, fair_share: &FairShare, average: f64) -> Self {
        Self {
            average,
            upper: fair_share.upper,
            weights: config.weights.clone(),
            margins: config.margins.clone(),
        }
    }

    /// Highest workload a resource may reach in the aggressive tier.
    pub fn aggressive_ceiling(&self) -> u32 {
        let loosened = (self.average + self.margins.aggressive).floor().max(0.0) as u32;
        self.upper.max(loosened)
    }

    fn overload_threshold(&self) -> f64 {
        self.average + self.margins.overload
    }

    fn strict_threshold(&self) -> f64 {
        self.average + self.margins.strict_overload
    }
}

/// Individual score components for debugging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub continuity: f64,
    pub quota: f64,
    pub balance: f64,
    pub overload: f64,
    pub chain: f64,
    pub ceiling: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.continuity + self.quota + self.balance + self.overload + self.chain + self.ceiling
    }
}

/// Scored candidate.
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub resource: String,
    pub score: f64,
    pub workload: u32,
    pub breakdown: ScoreBreakdown,
}

/// Quota units beyond this add nothing, so quota never outweighs continuity.
const QUOTA_UNIT_CAP: u32 = 5;

/// Score one candidate for `tier`. Returns `None` if the tier filters it out.
pub fn score_candidate(tier: Tier, candidate: &Candidate<'_>, th: &Thresholds) -> Option<CandidateScore> {
    let w = candidate.workload;
    let after = w + 1;

    match tier {
        Tier::Normal => {
            if candidate.quota == 0 || after > th.upper || f64::from(w) > th.strict_threshold() {
                return None;
            }
        }
        Tier::Flexible => {
            if after > th.upper {
                return None;
            }
        }
        Tier::Aggressive => {
            if after > th.aggressive_ceiling() {
                return None;
            }
        }
        Tier::ChainSwap | Tier::Overflow => {}
    }

    let weights = &th.weights;
    let quota = if candidate.quota > 0 {
        weights.quota + weights.quota_unit * f64::from(candidate.quota.min(QUOTA_UNIT_CAP))
    } else {
        0.0
    };
    let balance = if f64::from(w) <= th.average {
        weights.below_average
    } else {
        0.0
    };
    let overload = if f64::from(w) > th.overload_threshold() {
        -weights.overload_penalty * (f64::from(w) - th.overload_threshold())
    } else {
        0.0
    };
    let ceiling = if tier == Tier::Aggressive && after > th.upper {
        -weights.ceiling_penalty * f64::from(after - th.upper)
    } else {
        0.0
    };

    let breakdown = ScoreBreakdown {
        continuity: weights.continuity * f64::from(candidate.continuity),
        quota,
        balance,
        overload,
        chain: weights.chain_extension * f64::from(candidate.chain),
        ceiling,
    };

    Some(CandidateScore {
        resource: candidate.resource.to_string(),
        score: breakdown.total(),
        workload: w,
        breakdown,
    })
}

/// Score all candidates and return them best first. Ties go to the lower
/// workload, then to the smaller id.
pub fn rank_candidates(tier: Tier, candidates: &[Candidate<'_>], th: &Thresholds) -> Vec<CandidateScore> {
    let mut scores: Vec<CandidateScore> = candidates
        .iter()
        .filter_map(|c| score_candidate(tier, c, th))
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.workload.cmp(&b.workload))
            .then_with(|| a.resource.cmp(&b.resource))
    });
    scores
}
