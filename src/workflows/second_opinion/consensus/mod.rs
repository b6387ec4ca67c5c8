//! Formal committee deliberation attached one-to-one to a case.
//!
//! Phases move DISCUSION → PROPUESTA → VOTACION and end in CONSENSO or DISENSO, at which point
//! the workflow locks. BLOQUEADO parks the deliberation while more information is requested and
//! can be resumed. Every mutation here is expected to run inside a store transaction.

mod policy;
mod votes;

pub use policy::{quorum_met, EvidenceLevel};
pub use votes::{ConsensusVote, VoteKind, VoteTally};

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{CaseId, CaseStatus, CommitteeId, PhysicianId};
use super::error::WorkflowError;
use super::registry::Registry;
use super::repository::{DomainEvent, EventType};

/// Days a patient has to answer a request for more information.
pub const MORE_INFO_RESPONSE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusPhase {
    #[serde(rename = "DISCUSION")]
    Discussion,
    #[serde(rename = "PROPUESTA")]
    Proposal,
    #[serde(rename = "VOTACION")]
    Voting,
    #[serde(rename = "CONSENSO")]
    Consensus,
    #[serde(rename = "DISENSO")]
    Dissent,
    #[serde(rename = "BLOQUEADO")]
    Blocked,
}

impl ConsensusPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Discussion => "DISCUSION",
            Self::Proposal => "PROPUESTA",
            Self::Voting => "VOTACION",
            Self::Consensus => "CONSENSO",
            Self::Dissent => "DISENSO",
            Self::Blocked => "BLOQUEADO",
        }
    }

    /// Phases in which the case may leave MDT deliberation once locked.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Consensus | Self::Dissent | Self::Blocked)
    }
}

impl fmt::Display for ConsensusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusWorkflow {
    pub case_id: CaseId,
    pub committee_id: CommitteeId,
    pub phase: ConsensusPhase,
    pub proposal: String,
    #[serde(flatten)]
    pub tally: VoteTally,
    pub evidence_level: Option<EvidenceLevel>,
    pub requires_more_info: bool,
    pub more_info_description: Option<String>,
    pub more_info_deadline: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub consensus_at: Option<DateTime<Utc>>,
    pub locked: bool,
    pub closed_without_quorum: bool,
}

/// Append-only snapshot of the proposal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusVersion {
    pub case_id: CaseId,
    pub version: u32,
    pub text: String,
    pub author: PhysicianId,
    pub change_note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DissentInput {
    pub author: PhysicianId,
    pub opinion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DissentingOpinion {
    pub case_id: CaseId,
    pub author: PhysicianId,
    pub opinion: String,
    pub recorded_at: DateTime<Utc>,
}

/// Read model for coordinators deciding whether to close the vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingSummary {
    pub case_id: CaseId,
    pub phase: ConsensusPhase,
    #[serde(flatten)]
    pub tally: VoteTally,
    pub total_votes: u32,
    pub evidence_level: Option<EvidenceLevel>,
    pub quorum: u32,
    pub quorum_met: bool,
    pub locked: bool,
    pub votes: Vec<ConsensusVote>,
}

fn set_phase(
    registry: &mut Registry,
    case_id: &CaseId,
    to: ConsensusPhase,
) -> Result<(), WorkflowError> {
    let workflow = registry.workflow_mut(case_id)?;
    let from = workflow.phase;
    workflow.phase = to;
    if from != to {
        registry.push_event(DomainEvent::new(
            case_id.clone(),
            EventType::ConsensusPhaseChanged,
            json!({ "from": from, "to": to }),
        ));
    }
    Ok(())
}

/// Fail fast, before any write, unless the workflow accepts mutations.
fn ensure_mutable(registry: &Registry, case_id: &CaseId) -> Result<ConsensusPhase, WorkflowError> {
    let workflow = registry.workflow(case_id)?;
    if workflow.locked {
        return Err(WorkflowError::WorkflowLocked {
            case_id: case_id.clone(),
        });
    }

    let case = registry.case(case_id)?;
    if case.status != CaseStatus::MdtInProgress {
        return Err(WorkflowError::CaseNotInDeliberation {
            case_id: case_id.clone(),
            status: case.status,
        });
    }

    Ok(workflow.phase)
}

fn clear_more_info(workflow: &mut ConsensusWorkflow) {
    workflow.requires_more_info = false;
    workflow.more_info_description = None;
    workflow.more_info_deadline = None;
}

fn phase_mismatch(
    case_id: &CaseId,
    phase: ConsensusPhase,
    operation: &'static str,
) -> WorkflowError {
    WorkflowError::PhaseMismatch {
        case_id: case_id.clone(),
        phase,
        operation,
    }
}

fn recount(registry: &Registry, case_id: &CaseId) -> VoteTally {
    VoteTally::from_votes(
        registry
            .votes
            .iter()
            .filter(|((owner, _), _)| owner == case_id)
            .map(|(_, ballot)| ballot),
    )
}

/// Create-if-absent for a case already under deliberation.
pub(crate) fn start(
    registry: &mut Registry,
    case_id: &CaseId,
    now: DateTime<Utc>,
) -> Result<ConsensusWorkflow, WorkflowError> {
    let status = registry.case(case_id)?.status;
    if status != CaseStatus::MdtInProgress {
        return Err(WorkflowError::CaseNotInDeliberation {
            case_id: case_id.clone(),
            status,
        });
    }
    open(registry, case_id, now)
}

/// Create-if-absent without a status check. Only the `open_deliberation` effect calls this,
/// before the case status moves. The case must already have a committee.
pub(crate) fn open(
    registry: &mut Registry,
    case_id: &CaseId,
    now: DateTime<Utc>,
) -> Result<ConsensusWorkflow, WorkflowError> {
    if let Ok(existing) = registry.workflow(case_id) {
        return Ok(existing.clone());
    }

    let case = registry.case(case_id)?;
    let committee_id = case.committee.clone().ok_or_else(|| WorkflowError::NoCommittee {
        case_id: case_id.clone(),
    })?;

    let workflow = ConsensusWorkflow {
        case_id: case_id.clone(),
        committee_id,
        phase: ConsensusPhase::Discussion,
        proposal: String::new(),
        tally: VoteTally::default(),
        evidence_level: None,
        requires_more_info: false,
        more_info_description: None,
        more_info_deadline: None,
        started_at: now,
        consensus_at: None,
        locked: false,
        closed_without_quorum: false,
    };
    registry.workflows.insert(case_id.clone(), workflow.clone());
    registry.push_event(DomainEvent::new(
        case_id.clone(),
        EventType::ConsensusPhaseChanged,
        json!({ "from": null, "to": ConsensusPhase::Discussion }),
    ));

    Ok(workflow)
}

pub(crate) fn draft_proposal(
    registry: &mut Registry,
    case_id: &CaseId,
    author: &PhysicianId,
    text: &str,
    change_note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ConsensusVersion, WorkflowError> {
    ensure_mutable(registry, case_id)?;
    let committee_id = registry.workflow(case_id)?.committee_id.clone();
    if registry.committee(&committee_id)?.active_member(author).is_none() {
        return Err(WorkflowError::NotCommitteeMember {
            physician_id: author.clone(),
            committee_id,
        });
    }

    let version = registry
        .versions
        .iter()
        .filter(|existing| &existing.case_id == case_id)
        .map(|existing| existing.version)
        .max()
        .unwrap_or(0)
        + 1;
    let snapshot = ConsensusVersion {
        case_id: case_id.clone(),
        version,
        text: text.to_string(),
        author: author.clone(),
        change_note: change_note.map(str::to_string),
        recorded_at: now,
    };
    registry.versions.push(snapshot.clone());

    let workflow = registry.workflow_mut(case_id)?;
    workflow.proposal = text.to_string();
    clear_more_info(workflow);
    set_phase(registry, case_id, ConsensusPhase::Proposal)?;

    Ok(snapshot)
}

pub(crate) fn open_voting(
    registry: &mut Registry,
    case_id: &CaseId,
) -> Result<ConsensusWorkflow, WorkflowError> {
    let phase = ensure_mutable(registry, case_id)?;
    if phase != ConsensusPhase::Proposal {
        return Err(phase_mismatch(case_id, phase, "open voting"));
    }

    set_phase(registry, case_id, ConsensusPhase::Voting)?;
    Ok(registry.workflow(case_id)?.clone())
}

/// Upsert the physician's ballot and recount every ballot of the workflow. Accepted in any
/// unlocked phase; the first ballot in DISCUSION or PROPUESTA opens voting, BLOQUEADO stays put.
pub(crate) fn cast_vote(
    registry: &mut Registry,
    case_id: &CaseId,
    physician: &PhysicianId,
    vote: VoteKind,
    justification: &str,
    now: DateTime<Utc>,
) -> Result<VoteTally, WorkflowError> {
    let phase = ensure_mutable(registry, case_id)?;
    let committee_id = registry.workflow(case_id)?.committee_id.clone();
    let eligible = registry
        .committee(&committee_id)?
        .active_member(physician)
        .is_some_and(|membership| membership.can_vote);
    if !eligible {
        return Err(WorkflowError::VoterNotEligible {
            physician_id: physician.clone(),
            committee_id,
        });
    }
    registry.votes.insert(
        (case_id.clone(), physician.clone()),
        ConsensusVote {
            case_id: case_id.clone(),
            physician_id: physician.clone(),
            vote,
            justification: justification.to_string(),
            cast_at: now,
        },
    );

    let tally = recount(registry, case_id);
    registry.workflow_mut(case_id)?.tally = tally;
    if matches!(phase, ConsensusPhase::Discussion | ConsensusPhase::Proposal) {
        set_phase(registry, case_id, ConsensusPhase::Voting)?;
    }

    Ok(tally)
}

pub(crate) fn close_voting(
    registry: &mut Registry,
    case_id: &CaseId,
    is_consensus: bool,
    dissent: &[DissentInput],
    now: DateTime<Utc>,
) -> Result<ConsensusWorkflow, WorkflowError> {
    let phase = ensure_mutable(registry, case_id)?;
    if !matches!(phase, ConsensusPhase::Voting | ConsensusPhase::Blocked) {
        return Err(phase_mismatch(case_id, phase, "close voting"));
    }

    let committee_id = registry.workflow(case_id)?.committee_id.clone();
    let quorum = registry.committee(&committee_id)?.quorum;
    let tally = recount(registry, case_id);

    let (target, evidence) = if is_consensus {
        (ConsensusPhase::Consensus, EvidenceLevel::for_consensus(&tally))
    } else {
        for input in dissent {
            registry.physician(&input.author)?;
        }
        for input in dissent {
            registry.dissents.push(DissentingOpinion {
                case_id: case_id.clone(),
                author: input.author.clone(),
                opinion: input.opinion.clone(),
                recorded_at: now,
            });
        }
        (ConsensusPhase::Dissent, EvidenceLevel::Low)
    };

    let workflow = registry.workflow_mut(case_id)?;
    workflow.tally = tally;
    workflow.evidence_level = Some(evidence);
    workflow.consensus_at = Some(now);
    workflow.locked = true;
    workflow.closed_without_quorum = !quorum_met(&tally, quorum);
    set_phase(registry, case_id, target)?;

    Ok(registry.workflow(case_id)?.clone())
}

pub(crate) fn request_more_info(
    registry: &mut Registry,
    case_id: &CaseId,
    description: &str,
    now: DateTime<Utc>,
) -> Result<ConsensusWorkflow, WorkflowError> {
    ensure_mutable(registry, case_id)?;

    let workflow = registry.workflow_mut(case_id)?;
    workflow.requires_more_info = true;
    workflow.more_info_description = Some(description.to_string());
    workflow.more_info_deadline = Some(now + Duration::days(MORE_INFO_RESPONSE_DAYS));
    set_phase(registry, case_id, ConsensusPhase::Blocked)?;

    Ok(registry.workflow(case_id)?.clone())
}

/// Leave BLOQUEADO: back to the proposal if one exists, otherwise to discussion.
pub(crate) fn resume(
    registry: &mut Registry,
    case_id: &CaseId,
) -> Result<ConsensusWorkflow, WorkflowError> {
    let phase = ensure_mutable(registry, case_id)?;
    if phase != ConsensusPhase::Blocked {
        return Err(phase_mismatch(case_id, phase, "resume deliberation"));
    }

    let workflow = registry.workflow_mut(case_id)?;
    clear_more_info(workflow);
    let target = if workflow.proposal.is_empty() {
        ConsensusPhase::Discussion
    } else {
        ConsensusPhase::Proposal
    };
    set_phase(registry, case_id, target)?;

    Ok(registry.workflow(case_id)?.clone())
}

pub(crate) fn summary(
    registry: &Registry,
    case_id: &CaseId,
) -> Result<VotingSummary, WorkflowError> {
    let workflow = registry.workflow(case_id)?;
    let quorum = registry.committee(&workflow.committee_id)?.quorum;
    let votes: Vec<ConsensusVote> = registry
        .votes
        .iter()
        .filter(|((owner, _), _)| owner == case_id)
        .map(|(_, ballot)| ballot.clone())
        .collect();

    Ok(VotingSummary {
        case_id: case_id.clone(),
        phase: workflow.phase,
        tally: workflow.tally,
        total_votes: workflow.tally.total(),
        evidence_level: workflow.evidence_level,
        quorum,
        quorum_met: quorum_met(&workflow.tally, quorum),
        locked: workflow.locked,
        votes,
    })
}

pub(crate) fn versions(
    registry: &Registry,
    case_id: &CaseId,
) -> Result<Vec<ConsensusVersion>, WorkflowError> {
    registry.workflow(case_id)?;
    let mut history: Vec<ConsensusVersion> = registry
        .versions
        .iter()
        .filter(|snapshot| &snapshot.case_id == case_id)
        .cloned()
        .collect();
    history.sort_by_key(|snapshot| snapshot.version);
    Ok(history)
}

pub(crate) fn dissenting_opinions(
    registry: &Registry,
    case_id: &CaseId,
) -> Result<Vec<DissentingOpinion>, WorkflowError> {
    registry.workflow(case_id)?;
    Ok(registry
        .dissents
        .iter()
        .filter(|opinion| &opinion.case_id == case_id)
        .cloned()
        .collect())
}
