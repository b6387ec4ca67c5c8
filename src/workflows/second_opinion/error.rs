use std::fmt;

use serde::Serialize;

use super::consensus::ConsensusPhase;
use super::domain::{ArtifactKind, CaseId, CaseStatus, CommitteeId, PhysicianId};
use super::lifecycle::TransitionKind;
use super::repository::RepositoryError;

/// Entity reference carried by `WorkflowError::NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Case(CaseId),
    Physician(PhysicianId),
    Committee(CommitteeId),
    ConsensusWorkflow(CaseId),
    AlgorithmConfig,
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Case(id) => write!(f, "case {id}"),
            EntityRef::Physician(id) => write!(f, "physician {id}"),
            EntityRef::Committee(id) => write!(f, "committee {id}"),
            EntityRef::ConsensusWorkflow(id) => write!(f, "consensus workflow for case {id}"),
            EntityRef::AlgorithmConfig => f.write_str("active algorithm config"),
        }
    }
}

/// Reasons a listed transition refused to run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardFailure {
    #[error("intake is missing {}", .0.join(", "))]
    IncompleteIntake(Vec<&'static str>),
    #[error("consensus workflow has not been started")]
    WorkflowMissing,
    #[error("deliberation still open (phase {phase}, locked: {locked})")]
    DeliberationOpen { phase: ConsensusPhase, locked: bool },
    #[error("artifact {0} has not been recorded")]
    MissingArtifact(ArtifactKind),
}

/// Error raised by the lifecycle, assignment, and consensus engines.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("case {case_id}: transition `{transition}` is not allowed from {from}")]
    InvalidTransition {
        case_id: CaseId,
        from: CaseStatus,
        transition: TransitionKind,
    },
    #[error("case {case_id}: transition `{transition}` rejected: {reason}")]
    GuardRejected {
        case_id: CaseId,
        transition: TransitionKind,
        reason: GuardFailure,
    },
    #[error("no eligible physician available in committee {committee_id}")]
    NoCandidate { committee_id: CommitteeId },
    #[error("case {case_id} has no committee to assign from")]
    NoCommittee { case_id: CaseId },
    #[error("manual assignment overrides are disabled by algorithm config v{config_version}")]
    OverrideNotAllowed { config_version: u32 },
    #[error("consensus workflow for case {case_id} is locked")]
    WorkflowLocked { case_id: CaseId },
    #[error("consensus workflow for case {case_id} is in phase {phase}; cannot {operation}")]
    PhaseMismatch {
        case_id: CaseId,
        phase: ConsensusPhase,
        operation: &'static str,
    },
    #[error("case {case_id} is {status}, not under MDT deliberation")]
    CaseNotInDeliberation { case_id: CaseId, status: CaseStatus },
    #[error("physician {physician_id} is not an active member of committee {committee_id}")]
    NotCommitteeMember {
        physician_id: PhysicianId,
        committee_id: CommitteeId,
    },
    #[error("physician {physician_id} may not vote in committee {committee_id}")]
    VoterNotEligible {
        physician_id: PhysicianId,
        committee_id: CommitteeId,
    },
    #[error("artifact {kind} cannot be recorded while case {case_id} is {status}")]
    ArtifactOutOfPhase {
        case_id: CaseId,
        kind: ArtifactKind,
        status: CaseStatus,
    },
    #[error("invalid algorithm configuration: {0}")]
    InvalidConfig(String),
    #[error("{0} not found")]
    NotFound(EntityRef),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    /// A locked workflow never unlocks; everything else may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WorkflowError::WorkflowLocked { .. })
    }
}
