//! Second-opinion case handling for multidisciplinary tumor boards.
//!
//! Cases move through an explicit lifecycle table, are assigned to a committee physician by a
//! weighted round-robin with a full audit trail, and are deliberated through a locked consensus
//! workflow. All state lives in a [`Registry`] behind a transactional [`Store`].

pub mod assignment;
pub mod audit;
pub mod consensus;
pub mod directory;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use assignment::{
    AlgorithmConfig, AlgorithmSettings, AssignmentEngine, AssignmentOutcome, AssignmentRequest,
    CandidateScore, ManualOverride,
};
pub use audit::{
    write_assignment_csv, AssignmentAuditEntry, AuditDecision, AuditLog, TransitionAuditEntry,
};
pub use consensus::{
    ConsensusPhase, ConsensusVersion, ConsensusVote, ConsensusWorkflow, DissentInput,
    DissentingOpinion, EvidenceLevel, VoteKind, VoteTally, VotingSummary,
};
pub use directory::{CommitteeDirectory, MemberView};
pub use domain::{
    ArtifactKind, Case, CaseArtifacts, CaseId, CaseIntake, CaseStatus, Committee, CommitteeId,
    Membership, MembershipRole, Physician, PhysicianId, PhysicianState,
};
pub use error::{EntityRef, GuardFailure, WorkflowError};
pub use lifecycle::{available_transitions, CaseTransition, TransitionKind, TransitionOutcome};
pub use registry::Registry;
pub use repository::{
    DomainEvent, EventPublisher, EventType, MemoryStore, PublishError, RepositoryError, Store,
};
pub use router::second_opinion_router;
pub use service::{AuditExportError, SecondOpinionService};
