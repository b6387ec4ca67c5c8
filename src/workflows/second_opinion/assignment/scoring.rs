use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::super::domain::{Physician, PhysicianId};
use super::config::AlgorithmConfig;

/// Tenure at which the seniority score saturates (about five years).
pub const SENIORITY_HORIZON_DAYS: f64 = 1825.0;

/// Sub-scores for one candidate. Lower `final_score` is the better candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub load: f64,
    pub seniority: f64,
    pub final_score: f64,
}

/// 0 = empty, 1 = at or above the physician's monthly cap.
pub fn load_score(physician: &Physician) -> f64 {
    let capacity = f64::from(physician.monthly_cap.max(1));
    (f64::from(physician.active_caseload) / capacity).min(1.0)
}

pub fn seniority_score(physician: &Physician) -> f64 {
    (f64::from(physician.tenure_days) / SENIORITY_HORIZON_DAYS).min(1.0)
}

pub fn score(physician: &Physician, config: &AlgorithmConfig) -> CandidateScore {
    let load = load_score(physician);
    let seniority = seniority_score(physician);
    let final_score = if config.strict_mode {
        -seniority
    } else {
        let weight = config.weight();
        weight * load - (1.0 - weight) * seniority
    };

    CandidateScore {
        load,
        seniority,
        final_score,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RankedCandidate {
    pub physician_id: PhysicianId,
    pub score: CandidateScore,
    /// Sequence of this member's last assignment in the committee; `None` if never assigned.
    pub last_assigned: Option<u64>,
}

/// Stable ascending sort by final score. Ties keep roster order, except in strict mode where
/// the least recently assigned member goes first so equal seniority rotates.
pub(crate) fn rank(candidates: &mut [RankedCandidate], strict_mode: bool) {
    candidates.sort_by(|left, right| {
        let by_score = left.score.final_score.total_cmp(&right.score.final_score);
        if strict_mode && by_score == Ordering::Equal {
            left.last_assigned.cmp(&right.last_assigned)
        } else {
            by_score
        }
    });
}
