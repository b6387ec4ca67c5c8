//! Case lifecycle as an explicit transition table.
//!
//! Each row names the statuses a transition may start from, the status it lands on, an optional
//! guard over the current registry, and an optional side effect. `apply` is the only code path
//! that writes `Case::status`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::assignment::{self, AssignmentOutcome, AssignmentRequest};
use super::audit::TransitionAuditEntry;
use super::consensus;
use super::domain::{ArtifactKind, Case, CaseId, CaseStatus};
use super::error::{GuardFailure, WorkflowError};
use super::registry::Registry;
use super::repository::{DomainEvent, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Submit,
    Assign,
    ConfirmReview,
    OpenDeliberation,
    CloseDeliberation,
    StartReport,
    CompleteReport,
    Close,
    Cancel,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 9] = [
        Self::Submit,
        Self::Assign,
        Self::ConfirmReview,
        Self::OpenDeliberation,
        Self::CloseDeliberation,
        Self::StartReport,
        Self::CompleteReport,
        Self::Close,
        Self::Cancel,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Assign => "assign",
            Self::ConfirmReview => "confirm_review",
            Self::OpenDeliberation => "open_deliberation",
            Self::CloseDeliberation => "close_deliberation",
            Self::StartReport => "start_report",
            Self::CompleteReport => "complete_report",
            Self::Close => "close",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == value)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A requested transition together with the data its side effect needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum CaseTransition {
    Submit,
    Assign(AssignmentRequest),
    ConfirmReview,
    OpenDeliberation,
    CloseDeliberation,
    StartReport,
    CompleteReport,
    Close,
    Cancel { reason: Option<String> },
}

impl CaseTransition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Submit => TransitionKind::Submit,
            Self::Assign(_) => TransitionKind::Assign,
            Self::ConfirmReview => TransitionKind::ConfirmReview,
            Self::OpenDeliberation => TransitionKind::OpenDeliberation,
            Self::CloseDeliberation => TransitionKind::CloseDeliberation,
            Self::StartReport => TransitionKind::StartReport,
            Self::CompleteReport => TransitionKind::CompleteReport,
            Self::Close => TransitionKind::Close,
            Self::Cancel { .. } => TransitionKind::Cancel,
        }
    }

    /// Data-less form of a transition; `assign` runs the automatic path.
    pub fn from_kind(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::Submit => Self::Submit,
            TransitionKind::Assign => Self::Assign(AssignmentRequest::automatic()),
            TransitionKind::ConfirmReview => Self::ConfirmReview,
            TransitionKind::OpenDeliberation => Self::OpenDeliberation,
            TransitionKind::CloseDeliberation => Self::CloseDeliberation,
            TransitionKind::StartReport => Self::StartReport,
            TransitionKind::CompleteReport => Self::CompleteReport,
            TransitionKind::Close => Self::Close,
            TransitionKind::Cancel => Self::Cancel { reason: None },
        }
    }

    fn note(&self) -> Option<&str> {
        match self {
            Self::Cancel { reason } => reason.as_deref(),
            _ => None,
        }
    }
}

type Guard = fn(&Registry, &Case) -> Result<(), GuardFailure>;
type Effect = fn(
    &mut Registry,
    &CaseId,
    &CaseTransition,
    DateTime<Utc>,
) -> Result<Option<AssignmentOutcome>, WorkflowError>;

struct TransitionRule {
    kind: TransitionKind,
    sources: &'static [CaseStatus],
    target: CaseStatus,
    guard: Option<Guard>,
    effect: Option<Effect>,
}

const NON_TERMINAL: &[CaseStatus] = &[
    CaseStatus::Draft,
    CaseStatus::Submitted,
    CaseStatus::Assigned,
    CaseStatus::Processing,
    CaseStatus::MdtInProgress,
    CaseStatus::MdtCompleted,
    CaseStatus::ReportDraft,
    CaseStatus::ReportCompleted,
];

static TRANSITION_TABLE: &[TransitionRule] = &[
    TransitionRule {
        kind: TransitionKind::Submit,
        sources: &[CaseStatus::Draft],
        target: CaseStatus::Submitted,
        guard: Some(intake_complete),
        effect: None,
    },
    TransitionRule {
        kind: TransitionKind::Assign,
        sources: &[CaseStatus::Submitted],
        target: CaseStatus::Assigned,
        guard: None,
        effect: Some(run_assignment),
    },
    TransitionRule {
        kind: TransitionKind::ConfirmReview,
        sources: &[CaseStatus::Assigned],
        target: CaseStatus::Processing,
        guard: None,
        effect: None,
    },
    TransitionRule {
        kind: TransitionKind::OpenDeliberation,
        sources: &[CaseStatus::Processing],
        target: CaseStatus::MdtInProgress,
        guard: None,
        effect: Some(start_consensus),
    },
    TransitionRule {
        kind: TransitionKind::CloseDeliberation,
        sources: &[CaseStatus::MdtInProgress],
        target: CaseStatus::MdtCompleted,
        guard: Some(deliberation_closed),
        effect: None,
    },
    TransitionRule {
        kind: TransitionKind::StartReport,
        sources: &[CaseStatus::MdtCompleted],
        target: CaseStatus::ReportDraft,
        guard: Some(summary_recorded),
        effect: None,
    },
    TransitionRule {
        kind: TransitionKind::CompleteReport,
        sources: &[CaseStatus::ReportDraft],
        target: CaseStatus::ReportCompleted,
        guard: Some(signed_report_recorded),
        effect: None,
    },
    TransitionRule {
        kind: TransitionKind::Close,
        sources: &[CaseStatus::ReportCompleted],
        target: CaseStatus::Closed,
        guard: Some(signed_report_recorded),
        effect: Some(release_caseload),
    },
    TransitionRule {
        kind: TransitionKind::Cancel,
        sources: NON_TERMINAL,
        target: CaseStatus::Cancelled,
        guard: None,
        effect: Some(release_caseload),
    },
];

fn rule_for(kind: TransitionKind) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE.iter().find(|rule| rule.kind == kind)
}

/// Transitions listed for `status`, guards not evaluated.
pub fn available_transitions(status: CaseStatus) -> Vec<TransitionKind> {
    TRANSITION_TABLE
        .iter()
        .filter(|rule| rule.sources.contains(&status))
        .map(|rule| rule.kind)
        .collect()
}

fn intake_complete(_: &Registry, case: &Case) -> Result<(), GuardFailure> {
    let missing = case.missing_intake_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GuardFailure::IncompleteIntake(missing))
    }
}

fn deliberation_closed(registry: &Registry, case: &Case) -> Result<(), GuardFailure> {
    let workflow = registry
        .workflow(&case.id)
        .map_err(|_| GuardFailure::WorkflowMissing)?;
    if workflow.locked && workflow.phase.is_terminal() {
        Ok(())
    } else {
        Err(GuardFailure::DeliberationOpen {
            phase: workflow.phase,
            locked: workflow.locked,
        })
    }
}

fn artifact_recorded(case: &Case, kind: ArtifactKind) -> Result<(), GuardFailure> {
    match case.artifacts.get(kind) {
        Some(_) => Ok(()),
        None => Err(GuardFailure::MissingArtifact(kind)),
    }
}

fn summary_recorded(_: &Registry, case: &Case) -> Result<(), GuardFailure> {
    artifact_recorded(case, ArtifactKind::MdtSummary)
}

fn signed_report_recorded(_: &Registry, case: &Case) -> Result<(), GuardFailure> {
    artifact_recorded(case, ArtifactKind::SignedReport)
}

fn run_assignment(
    registry: &mut Registry,
    case_id: &CaseId,
    transition: &CaseTransition,
    now: DateTime<Utc>,
) -> Result<Option<AssignmentOutcome>, WorkflowError> {
    let automatic = AssignmentRequest::automatic();
    let request = match transition {
        CaseTransition::Assign(request) => request,
        _ => &automatic,
    };
    assignment::assign(registry, case_id, request, now).map(Some)
}

fn start_consensus(
    registry: &mut Registry,
    case_id: &CaseId,
    _: &CaseTransition,
    now: DateTime<Utc>,
) -> Result<Option<AssignmentOutcome>, WorkflowError> {
    consensus::open(registry, case_id, now).map(|_| None)
}

fn release_caseload(
    registry: &mut Registry,
    case_id: &CaseId,
    _: &CaseTransition,
    _: DateTime<Utc>,
) -> Result<Option<AssignmentOutcome>, WorkflowError> {
    if let Some(physician_id) = registry.case(case_id)?.physician.clone() {
        let physician = registry.physician_mut(&physician_id)?;
        physician.active_caseload = physician.active_caseload.saturating_sub(1);
    }
    Ok(None)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub case: Case,
    pub entry: TransitionAuditEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentOutcome>,
}

/// Run one transition against the registry. Any error leaves the caller's transaction to roll
/// back, so a rejected transition never changes the case.
pub(crate) fn apply(
    registry: &mut Registry,
    case_id: &CaseId,
    transition: &CaseTransition,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    let kind = transition.kind();
    let case = registry.case(case_id)?;
    let from = case.status;

    let Some(rule) = rule_for(kind).filter(|rule| rule.sources.contains(&from)) else {
        return Err(WorkflowError::InvalidTransition {
            case_id: case_id.clone(),
            from,
            transition: kind,
        });
    };

    if let Some(guard) = rule.guard {
        guard(registry, case).map_err(|reason| WorkflowError::GuardRejected {
            case_id: case_id.clone(),
            transition: kind,
            reason,
        })?;
    }

    let assignment = match rule.effect {
        Some(effect) => effect(registry, case_id, transition, now)?,
        None => None,
    };

    let case = registry.case_mut(case_id)?;
    case.status = rule.target;
    case.updated_at = now;
    match kind {
        TransitionKind::Assign => case.assigned_at = Some(now),
        TransitionKind::Close => case.completed_at = Some(now),
        _ => {}
    }
    let case = case.clone();

    let entry = registry.audit.record_transition(
        case_id,
        kind,
        from,
        rule.target,
        actor,
        transition.note(),
        now,
    );
    registry.push_event(DomainEvent::new(
        case_id.clone(),
        EventType::CaseTransitioned,
        json!({
            "transition": kind,
            "from": from,
            "to": rule.target,
            "actor": actor,
        }),
    ));

    Ok(TransitionOutcome {
        case,
        entry,
        assignment,
    })
}

/// Attach an externally stored document reference to the case.
pub(crate) fn record_artifact(
    registry: &mut Registry,
    case_id: &CaseId,
    kind: ArtifactKind,
    reference: &str,
    now: DateTime<Utc>,
) -> Result<Case, WorkflowError> {
    let case = registry.case_mut(case_id)?;
    let expected = match kind {
        ArtifactKind::MdtSummary => CaseStatus::MdtCompleted,
        ArtifactKind::SignedReport => CaseStatus::ReportDraft,
    };
    if case.status != expected {
        return Err(WorkflowError::ArtifactOutOfPhase {
            case_id: case_id.clone(),
            kind,
            status: case.status,
        });
    }

    case.artifacts.set(kind, reference.to_string());
    case.updated_at = now;
    Ok(case.clone())
}
