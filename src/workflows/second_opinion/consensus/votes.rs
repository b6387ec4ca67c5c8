use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{CaseId, PhysicianId};

/// Ballot options offered to committee members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteKind {
    #[serde(rename = "aprueba")]
    Approve,
    #[serde(rename = "aprueba_mod")]
    ApproveWithModifications,
    #[serde(rename = "alternativa")]
    Alternative,
    #[serde(rename = "contraindicado")]
    Contraindicated,
    #[serde(rename = "abstiene")]
    Abstain,
}

impl VoteKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approve => "aprueba",
            Self::ApproveWithModifications => "aprueba_mod",
            Self::Alternative => "alternativa",
            Self::Contraindicated => "contraindicado",
            Self::Abstain => "abstiene",
        }
    }

    pub const fn is_favorable(self) -> bool {
        matches!(self, Self::Approve | Self::ApproveWithModifications)
    }

    pub const fn is_against(self) -> bool {
        matches!(self, Self::Alternative | Self::Contraindicated)
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The current ballot of one physician; replaced, never accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub case_id: CaseId,
    pub physician_id: PhysicianId,
    pub vote: VoteKind,
    pub justification: String,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(rename = "votos_a_favor")]
    pub in_favor: u32,
    #[serde(rename = "votos_en_contra")]
    pub against: u32,
    #[serde(rename = "abstenciones")]
    pub abstentions: u32,
}

impl VoteTally {
    /// Recount from scratch over the full vote set.
    pub fn from_votes<'a, I>(votes: I) -> Self
    where
        I: IntoIterator<Item = &'a ConsensusVote>,
    {
        votes.into_iter().fold(Self::default(), |mut tally, ballot| {
            if ballot.vote.is_favorable() {
                tally.in_favor += 1;
            } else if ballot.vote.is_against() {
                tally.against += 1;
            } else {
                tally.abstentions += 1;
            }
            tally
        })
    }

    pub fn total(&self) -> u32 {
        self.in_favor + self.against + self.abstentions
    }
}
