mod config;
mod eligibility;
mod scoring;

pub use config::{AlgorithmConfig, AlgorithmSettings, DEFAULT_LOAD_WEIGHT, DEFAULT_MONTHLY_CAP};
pub use scoring::{load_score, seniority_score, CandidateScore, SENIORITY_HORIZON_DAYS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::audit::{AssignmentAuditEntry, AuditDecision, AuditDraft};
use super::domain::{CaseId, CommitteeId, PhysicianId};
use super::error::{EntityRef, WorkflowError};
use super::registry::Registry;
use super::repository::{DomainEvent, EventType};
use scoring::RankedCandidate;

/// Manual selection supplied by an authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub physician: PhysicianId,
    pub actor: String,
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    /// Falls back to the case's committee hint, then to the committee for its cancer type.
    pub committee: Option<CommitteeId>,
    pub manual: Option<ManualOverride>,
}

impl AssignmentRequest {
    pub fn automatic() -> Self {
        Self::default()
    }

    pub fn to_committee(committee: CommitteeId) -> Self {
        Self {
            committee: Some(committee),
            manual: None,
        }
    }

    pub fn manual(
        physician: PhysicianId,
        actor: impl Into<String>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            committee: None,
            manual: Some(ManualOverride {
                physician,
                actor: actor.into(),
                justification: justification.into(),
            }),
        }
    }
}

/// Committed result of one assignment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentOutcome {
    pub case_id: CaseId,
    pub committee_id: CommitteeId,
    pub physician_id: PhysicianId,
    pub config_version: u32,
    pub trail: Vec<AssignmentAuditEntry>,
}

/// Selection computed against a registry snapshot, not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssignmentPlan {
    pub selected: PhysicianId,
    pub entries: Vec<AuditDraft>,
}

/// Stateless selector that applies one configuration version to a committee roster.
pub struct AssignmentEngine {
    config: AlgorithmConfig,
}

impl AssignmentEngine {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlgorithmConfig {
        &self.config
    }

    pub(crate) fn plan(
        &self,
        registry: &Registry,
        committee_id: &CommitteeId,
    ) -> Result<AssignmentPlan, WorkflowError> {
        let members = registry.directory().members(committee_id)?;

        let mut candidates = Vec::new();
        let mut excluded = Vec::new();
        for member in &members {
            match eligibility::screen(member, &self.config) {
                Ok(()) => candidates.push(RankedCandidate {
                    physician_id: member.physician.id.clone(),
                    score: scoring::score(member.physician, &self.config),
                    last_assigned: registry
                        .audit
                        .last_assigned(committee_id, &member.physician.id),
                }),
                Err(exclusion) => excluded.push(AuditDraft {
                    physician_id: member.physician.id.clone(),
                    decision: AuditDecision::Unavailable,
                    reason: exclusion.reason(),
                    score: None,
                    manual: None,
                }),
            }
        }

        scoring::rank(&mut candidates, self.config.strict_mode);

        let Some(best) = candidates.first() else {
            return Err(WorkflowError::NoCandidate {
                committee_id: committee_id.clone(),
            });
        };
        let selected = best.physician_id.clone();

        let mut entries = Vec::with_capacity(members.len());
        for (position, candidate) in candidates.iter().enumerate() {
            let (decision, reason) = if position == 0 {
                (
                    AuditDecision::Assigned,
                    format!(
                        "lowest score: load={:.2}, seniority={:.2}",
                        candidate.score.load, candidate.score.seniority
                    ),
                )
            } else {
                (
                    AuditDecision::Skipped,
                    format!("higher score: {:.2}", candidate.score.final_score),
                )
            };
            entries.push(AuditDraft {
                physician_id: candidate.physician_id.clone(),
                decision,
                reason,
                score: Some(candidate.score),
                manual: None,
            });
        }
        entries.extend(excluded);

        Ok(AssignmentPlan { selected, entries })
    }

    pub(crate) fn plan_override(
        &self,
        registry: &Registry,
        manual: &ManualOverride,
    ) -> Result<AssignmentPlan, WorkflowError> {
        if !self.config.allow_overrides {
            return Err(WorkflowError::OverrideNotAllowed {
                config_version: self.config.version,
            });
        }
        registry.physician(&manual.physician)?;

        Ok(AssignmentPlan {
            selected: manual.physician.clone(),
            entries: vec![AuditDraft {
                physician_id: manual.physician.clone(),
                decision: AuditDecision::Assigned,
                reason: format!("manual override by {}", manual.actor),
                score: None,
                manual: Some((manual.actor.clone(), manual.justification.clone())),
            }],
        })
    }
}

fn resolve_committee(
    registry: &Registry,
    case_id: &CaseId,
    requested: Option<&CommitteeId>,
) -> Result<CommitteeId, WorkflowError> {
    let case = registry.case(case_id)?;
    if let Some(id) = requested.or(case.committee_hint.as_ref()) {
        return registry.committee(id).map(|committee| committee.id.clone());
    }

    registry
        .directory()
        .committee_for_cancer_type(&case.cancer_type)
        .map(|committee| committee.id.clone())
        .ok_or_else(|| WorkflowError::NoCommittee {
            case_id: case_id.clone(),
        })
}

/// Select, audit, and book a physician for the case. Must run inside a store transaction:
/// the caseload increment and the audit rows are only durable together.
pub(crate) fn assign(
    registry: &mut Registry,
    case_id: &CaseId,
    request: &AssignmentRequest,
    now: DateTime<Utc>,
) -> Result<AssignmentOutcome, WorkflowError> {
    let config = registry
        .active_config()
        .cloned()
        .ok_or(WorkflowError::NotFound(EntityRef::AlgorithmConfig))?;
    let committee_id = resolve_committee(registry, case_id, request.committee.as_ref())?;

    let engine = AssignmentEngine::new(config);
    let plan = match &request.manual {
        Some(manual) => engine.plan_override(registry, manual)?,
        None => engine.plan(registry, &committee_id)?,
    };
    let config_version = engine.config().version;

    registry.physician_mut(&plan.selected)?.active_caseload += 1;

    let trail: Vec<AssignmentAuditEntry> = plan
        .entries
        .into_iter()
        .map(|draft| {
            registry
                .audit
                .record_assignment(case_id, &committee_id, config_version, draft, now)
        })
        .collect();

    let case = registry.case_mut(case_id)?;
    case.committee = Some(committee_id.clone());
    case.physician = Some(plan.selected.clone());

    registry.push_event(DomainEvent::new(
        case_id.clone(),
        EventType::AssignmentCompleted,
        json!({
            "committee_id": committee_id,
            "physician_id": plan.selected,
            "config_version": config_version,
            "manual_override": request.manual.is_some(),
        }),
    ));

    Ok(AssignmentOutcome {
        case_id: case_id.clone(),
        committee_id,
        physician_id: plan.selected,
        config_version,
        trail,
    })
}
