use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::assignment::{AlgorithmConfig, AlgorithmSettings};
use super::audit::AuditLog;
use super::consensus::{ConsensusVersion, ConsensusVote, ConsensusWorkflow, DissentingOpinion};
use super::directory::CommitteeDirectory;
use super::domain::{Case, CaseId, CaseIntake, Committee, CommitteeId, Physician, PhysicianId};
use super::error::{EntityRef, WorkflowError};
use super::repository::DomainEvent;

/// Flat entity tables. Relationships are expressed through ids only.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub(crate) cases: BTreeMap<CaseId, Case>,
    pub(crate) physicians: BTreeMap<PhysicianId, Physician>,
    pub(crate) committees: BTreeMap<CommitteeId, Committee>,
    pub(crate) configs: Vec<AlgorithmConfig>,
    pub(crate) audit: AuditLog,
    pub(crate) workflows: BTreeMap<CaseId, ConsensusWorkflow>,
    pub(crate) versions: Vec<ConsensusVersion>,
    pub(crate) votes: BTreeMap<(CaseId, PhysicianId), ConsensusVote>,
    pub(crate) dissents: Vec<DissentingOpinion>,
    case_sequence: u64,
    outbox: Vec<DomainEvent>,
}

impl Registry {
    pub fn case(&self, id: &CaseId) -> Result<&Case, WorkflowError> {
        self.cases
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::Case(id.clone())))
    }

    pub(crate) fn case_mut(&mut self, id: &CaseId) -> Result<&mut Case, WorkflowError> {
        self.cases
            .get_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::Case(id.clone())))
    }

    pub fn physician(&self, id: &PhysicianId) -> Result<&Physician, WorkflowError> {
        self.physicians
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::Physician(id.clone())))
    }

    pub(crate) fn physician_mut(
        &mut self,
        id: &PhysicianId,
    ) -> Result<&mut Physician, WorkflowError> {
        self.physicians
            .get_mut(id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::Physician(id.clone())))
    }

    pub fn committee(&self, id: &CommitteeId) -> Result<&Committee, WorkflowError> {
        self.committees
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::Committee(id.clone())))
    }

    pub fn workflow(&self, case_id: &CaseId) -> Result<&ConsensusWorkflow, WorkflowError> {
        self.workflows
            .get(case_id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::ConsensusWorkflow(case_id.clone())))
    }

    pub(crate) fn workflow_mut(
        &mut self,
        case_id: &CaseId,
    ) -> Result<&mut ConsensusWorkflow, WorkflowError> {
        self.workflows
            .get_mut(case_id)
            .ok_or_else(|| WorkflowError::NotFound(EntityRef::ConsensusWorkflow(case_id.clone())))
    }

    pub fn directory(&self) -> CommitteeDirectory<'_> {
        CommitteeDirectory::new(self)
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn open_case(&mut self, intake: CaseIntake, now: DateTime<Utc>) -> Case {
        self.case_sequence += 1;
        let id = CaseId(format!("case-{:06}", self.case_sequence));
        let case = Case::from_intake(id.clone(), intake, now);
        self.cases.insert(id, case.clone());
        case
    }

    pub(crate) fn upsert_physician(&mut self, physician: Physician) {
        self.physicians.insert(physician.id.clone(), physician);
    }

    /// Roster physicians must already be registered.
    pub(crate) fn upsert_committee(&mut self, committee: Committee) -> Result<(), WorkflowError> {
        for membership in &committee.roster {
            self.physician(&membership.physician)?;
        }
        self.committees.insert(committee.id.clone(), committee);
        Ok(())
    }

    /// Newest published configuration; versions are never edited in place.
    pub fn active_config(&self) -> Option<&AlgorithmConfig> {
        self.configs.last()
    }

    pub fn config_history(&self) -> &[AlgorithmConfig] {
        &self.configs
    }

    pub(crate) fn publish_config(
        &mut self,
        settings: AlgorithmSettings,
        now: DateTime<Utc>,
    ) -> Result<AlgorithmConfig, WorkflowError> {
        settings.validate().map_err(WorkflowError::InvalidConfig)?;
        let version = self.configs.last().map_or(1, |config| config.version + 1);
        let config = AlgorithmConfig::from_settings(version, settings, now);
        self.configs.push(config.clone());
        Ok(config)
    }

    pub(crate) fn push_event(&mut self, event: DomainEvent) {
        self.outbox.push(event);
    }

    pub(crate) fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.outbox)
    }
}
