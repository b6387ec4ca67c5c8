use std::io;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::assignment::{AlgorithmConfig, AlgorithmSettings, AssignmentRequest};
use super::audit::{self, AssignmentAuditEntry, TransitionAuditEntry};
use super::consensus::{
    self, ConsensusVersion, ConsensusWorkflow, DissentInput, DissentingOpinion, VoteKind, VoteTally,
    VotingSummary,
};
use super::domain::{ArtifactKind, Case, CaseId, CaseIntake, Committee, Physician, PhysicianId};
use super::error::{EntityRef, WorkflowError};
use super::lifecycle::{self, CaseTransition, TransitionKind, TransitionOutcome};
use super::registry::Registry;
use super::repository::{DomainEvent, EventPublisher, EventType, RepositoryError, Store};

/// Service composing the lifecycle table, the assignment engine, and the consensus workflow
/// over one transactional store.
pub struct SecondOpinionService<S, P> {
    store: Arc<S>,
    events: Arc<P>,
}

impl<S, P> SecondOpinionService<S, P>
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<P>) -> Self {
        Self { store, events }
    }

    /// Run `work` in one transaction and publish whatever events it queued once committed.
    fn commit<T, F>(&self, work: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut Registry) -> Result<T, WorkflowError>,
    {
        let (value, events) = self.store.transaction(|registry| {
            let value = work(registry)?;
            Ok::<_, WorkflowError>((value, registry.drain_events()))
        })?;
        self.dispatch(events);
        Ok(value)
    }

    fn query<T, F>(&self, view: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&Registry) -> Result<T, WorkflowError>,
    {
        self.store.read(view)?
    }

    fn dispatch(&self, events: Vec<DomainEvent>) {
        for event in events {
            let case_id = event.case_id.clone();
            let event_type = event.event_type;
            match self.events.publish(event) {
                Ok(()) => debug!(case_id = %case_id, ?event_type, "domain event published"),
                Err(error) => warn!(
                    case_id = %case_id,
                    ?event_type,
                    error = %error,
                    "failed to publish domain event"
                ),
            }
        }
    }

    /// Publish a new immutable algorithm configuration version.
    pub fn publish_config(
        &self,
        settings: AlgorithmSettings,
    ) -> Result<AlgorithmConfig, WorkflowError> {
        let config = self.commit(|registry| registry.publish_config(settings, Utc::now()))?;
        info!(
            version = config.version,
            load_weight = config.load_weight,
            strict_mode = config.strict_mode,
            "algorithm config published"
        );
        Ok(config)
    }

    pub fn active_config(&self) -> Result<AlgorithmConfig, WorkflowError> {
        self.query(|registry| {
            registry
                .active_config()
                .cloned()
                .ok_or(WorkflowError::NotFound(EntityRef::AlgorithmConfig))
        })
    }

    pub fn config_history(&self) -> Result<Vec<AlgorithmConfig>, WorkflowError> {
        self.query(|registry| Ok(registry.config_history().to_vec()))
    }

    pub fn register_physician(&self, physician: Physician) -> Result<Physician, WorkflowError> {
        self.commit(|registry| {
            registry.upsert_physician(physician.clone());
            Ok(physician)
        })
    }

    pub fn register_committee(&self, committee: Committee) -> Result<Committee, WorkflowError> {
        self.commit(|registry| {
            registry.upsert_committee(committee.clone())?;
            Ok(committee)
        })
    }

    pub fn physician(&self, id: &PhysicianId) -> Result<Physician, WorkflowError> {
        self.query(|registry| registry.physician(id).cloned())
    }

    /// Register intake data as a new `DRAFT` case.
    pub fn open_case(&self, intake: CaseIntake) -> Result<Case, WorkflowError> {
        let case = self.commit(|registry| Ok(registry.open_case(intake, Utc::now())))?;
        info!(case_id = %case.id, cancer_type = %case.cancer_type, "case opened");
        Ok(case)
    }

    pub fn case(&self, id: &CaseId) -> Result<Case, WorkflowError> {
        self.query(|registry| registry.case(id).cloned())
    }

    /// Apply one lifecycle transition. A failed assignment is announced even though nothing
    /// is committed.
    pub fn transition(
        &self,
        case_id: &CaseId,
        transition: CaseTransition,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let kind = transition.kind();
        let result = self.commit(|registry| {
            lifecycle::apply(registry, case_id, &transition, actor, Utc::now())
        });

        match &result {
            Ok(outcome) => info!(
                case_id = %case_id,
                transition = %kind,
                from = %outcome.entry.from,
                to = %outcome.entry.to,
                "case transitioned"
            ),
            Err(error) => {
                warn!(
                    case_id = %case_id,
                    transition = %kind,
                    error = %error,
                    "case transition rejected"
                );
                if kind == TransitionKind::Assign
                    && matches!(
                        error,
                        WorkflowError::NoCandidate { .. } | WorkflowError::NoCommittee { .. }
                    )
                {
                    self.dispatch(vec![DomainEvent::new(
                        case_id.clone(),
                        EventType::AssignmentFailed,
                        json!({ "reason": error.to_string() }),
                    )]);
                }
            }
        }

        result
    }

    /// Run the `assign` transition. Manual overrides are attributed to their actor.
    pub fn assign(
        &self,
        case_id: &CaseId,
        request: AssignmentRequest,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let actor = request.manual.as_ref().map(|manual| manual.actor.clone());
        let outcome = self.transition(case_id, CaseTransition::Assign(request), actor.as_deref())?;
        if let Some(assignment) = &outcome.assignment {
            info!(
                case_id = %case_id,
                physician_id = %assignment.physician_id,
                committee_id = %assignment.committee_id,
                config_version = assignment.config_version,
                candidates = assignment.trail.len(),
                "case assigned"
            );
        }
        Ok(outcome)
    }

    pub fn record_artifact(
        &self,
        case_id: &CaseId,
        kind: ArtifactKind,
        reference: &str,
    ) -> Result<Case, WorkflowError> {
        let case = self.commit(|registry| {
            lifecycle::record_artifact(registry, case_id, kind, reference, Utc::now())
        })?;
        info!(case_id = %case_id, artifact = %kind, "artifact recorded");
        Ok(case)
    }

    pub fn start_consensus(&self, case_id: &CaseId) -> Result<ConsensusWorkflow, WorkflowError> {
        self.commit(|registry| consensus::start(registry, case_id, Utc::now()))
    }

    pub fn consensus(&self, case_id: &CaseId) -> Result<ConsensusWorkflow, WorkflowError> {
        self.query(|registry| registry.workflow(case_id).cloned())
    }

    pub fn draft_proposal(
        &self,
        case_id: &CaseId,
        author: &PhysicianId,
        text: &str,
        change_note: Option<&str>,
    ) -> Result<ConsensusVersion, WorkflowError> {
        let version = self.commit(|registry| {
            consensus::draft_proposal(registry, case_id, author, text, change_note, Utc::now())
        })?;
        info!(
            case_id = %case_id,
            author = %author,
            version = version.version,
            "proposal drafted"
        );
        Ok(version)
    }

    pub fn open_voting(&self, case_id: &CaseId) -> Result<ConsensusWorkflow, WorkflowError> {
        self.commit(|registry| consensus::open_voting(registry, case_id))
    }

    /// Upsert a ballot; repeated calls replace the physician's previous vote.
    pub fn cast_vote(
        &self,
        case_id: &CaseId,
        physician: &PhysicianId,
        vote: VoteKind,
        justification: &str,
    ) -> Result<VoteTally, WorkflowError> {
        let tally = self.commit(|registry| {
            consensus::cast_vote(registry, case_id, physician, vote, justification, Utc::now())
        })?;
        info!(
            case_id = %case_id,
            physician_id = %physician,
            vote = %vote,
            in_favor = tally.in_favor,
            against = tally.against,
            abstentions = tally.abstentions,
            "vote recorded"
        );
        Ok(tally)
    }

    pub fn close_voting(
        &self,
        case_id: &CaseId,
        is_consensus: bool,
        dissent: &[DissentInput],
    ) -> Result<ConsensusWorkflow, WorkflowError> {
        let workflow = self.commit(|registry| {
            consensus::close_voting(registry, case_id, is_consensus, dissent, Utc::now())
        })?;
        info!(
            case_id = %case_id,
            phase = %workflow.phase,
            evidence_level = ?workflow.evidence_level,
            closed_without_quorum = workflow.closed_without_quorum,
            "voting closed"
        );
        Ok(workflow)
    }

    pub fn request_more_info(
        &self,
        case_id: &CaseId,
        description: &str,
    ) -> Result<ConsensusWorkflow, WorkflowError> {
        let workflow = self.commit(|registry| {
            consensus::request_more_info(registry, case_id, description, Utc::now())
        })?;
        info!(
            case_id = %case_id,
            deadline = ?workflow.more_info_deadline,
            "deliberation blocked pending information"
        );
        Ok(workflow)
    }

    pub fn resume_deliberation(
        &self,
        case_id: &CaseId,
    ) -> Result<ConsensusWorkflow, WorkflowError> {
        self.commit(|registry| consensus::resume(registry, case_id))
    }

    pub fn voting_summary(&self, case_id: &CaseId) -> Result<VotingSummary, WorkflowError> {
        self.query(|registry| consensus::summary(registry, case_id))
    }

    pub fn consensus_versions(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<ConsensusVersion>, WorkflowError> {
        self.query(|registry| consensus::versions(registry, case_id))
    }

    pub fn dissenting_opinions(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<DissentingOpinion>, WorkflowError> {
        self.query(|registry| consensus::dissenting_opinions(registry, case_id))
    }

    pub fn assignment_audit(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<AssignmentAuditEntry>, WorkflowError> {
        self.query(|registry| {
            registry.case(case_id)?;
            Ok(registry.audit().assignments_for(case_id))
        })
    }

    pub fn transition_log(
        &self,
        case_id: &CaseId,
    ) -> Result<Vec<TransitionAuditEntry>, WorkflowError> {
        self.query(|registry| {
            registry.case(case_id)?;
            Ok(registry.audit().transitions_for(case_id))
        })
    }

    /// Write the whole assignment audit trail as CSV, returning the number of rows.
    pub fn export_assignment_audit<W: io::Write>(
        &self,
        writer: W,
    ) -> Result<usize, AuditExportError> {
        let entries = self.store.read(|registry| registry.audit().assignments().to_vec())?;
        audit::write_assignment_csv(&entries, writer)?;
        Ok(entries.len())
    }
}

/// Error raised while exporting the audit trail.
#[derive(Debug, thiserror::Error)]
pub enum AuditExportError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to write audit CSV: {0}")]
    Csv(#[from] csv::Error),
}
