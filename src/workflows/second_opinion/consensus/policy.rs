use std::fmt;

use serde::{Deserialize, Serialize};

use super::votes::VoteTally;

/// How unanimous the committee's decision was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceLevel {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "moderada")]
    Moderate,
    #[serde(rename = "baja")]
    Low,
}

impl EvidenceLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "alta",
            Self::Moderate => "moderada",
            Self::Low => "baja",
        }
    }

    /// Level for a vote closed as consensus. Dissent is always `Low`.
    pub fn for_consensus(tally: &VoteTally) -> Self {
        if tally.against == 0 && tally.abstentions == 0 {
            Self::High
        } else if tally.in_favor > tally.against {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for EvidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Informational quorum check; closing never blocks on it.
pub fn quorum_met(tally: &VoteTally, quorum: u32) -> bool {
    tally.total() >= quorum
}
