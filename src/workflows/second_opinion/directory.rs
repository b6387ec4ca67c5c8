use serde::Serialize;

use super::domain::{Committee, CommitteeId, Membership, Physician};
use super::error::WorkflowError;
use super::registry::Registry;

/// Read-only view over committees, rosters, and member caseloads.
pub struct CommitteeDirectory<'a> {
    registry: &'a Registry,
}

/// A roster row joined with the physician it references.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemberView<'a> {
    pub membership: &'a Membership,
    pub physician: &'a Physician,
}

impl<'a> CommitteeDirectory<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    pub fn committee(&self, id: &CommitteeId) -> Result<&'a Committee, WorkflowError> {
        self.registry.committee(id)
    }

    /// First active committee (by id) handling the given cancer type.
    pub fn committee_for_cancer_type(&self, cancer_type: &str) -> Option<&'a Committee> {
        let wanted = cancer_type.trim();
        self.registry
            .committees
            .values()
            .find(|committee| {
                committee.active && committee.cancer_type.eq_ignore_ascii_case(wanted)
            })
    }

    /// Roster in insertion order. Rows pointing at unknown physicians are skipped.
    pub fn members(&self, id: &CommitteeId) -> Result<Vec<MemberView<'a>>, WorkflowError> {
        let committee = self.registry.committee(id)?;
        Ok(committee
            .roster
            .iter()
            .filter_map(|membership| {
                self.registry
                    .physicians
                    .get(&membership.physician)
                    .map(|physician| MemberView {
                        membership,
                        physician,
                    })
            })
            .collect())
    }
}
