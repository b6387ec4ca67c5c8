use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for second-opinion cases.
    CaseId
);
identifier!(
    /// Identifier wrapper for committee physicians.
    PhysicianId
);
identifier!(
    /// Identifier wrapper for multidisciplinary committees.
    CommitteeId
);

/// Lifecycle status of a case. Only the transition table in `lifecycle` mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Draft,
    Submitted,
    Assigned,
    Processing,
    MdtInProgress,
    MdtCompleted,
    ReportDraft,
    ReportCompleted,
    Closed,
    Cancelled,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::Assigned => "ASSIGNED",
            Self::Processing => "PROCESSING",
            Self::MdtInProgress => "MDT_IN_PROGRESS",
            Self::MdtCompleted => "MDT_COMPLETED",
            Self::ReportDraft => "REPORT_DRAFT",
            Self::ReportCompleted => "REPORT_COMPLETED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Intake data handed over by the document intake collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseIntake {
    pub patient_ref: String,
    pub specialty: String,
    pub cancer_type: String,
    #[serde(default)]
    pub committee_hint: Option<CommitteeId>,
}

/// Externally stored documents a case must reference before the report stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    MdtSummary,
    SignedReport,
}

impl ArtifactKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MdtSummary => "mdt_summary",
            Self::SignedReport => "signed_report",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArtifacts {
    pub mdt_summary: Option<String>,
    pub signed_report: Option<String>,
}

impl CaseArtifacts {
    pub fn get(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::MdtSummary => self.mdt_summary.as_deref(),
            ArtifactKind::SignedReport => self.signed_report.as_deref(),
        }
    }

    pub(crate) fn set(&mut self, kind: ArtifactKind, reference: String) {
        match kind {
            ArtifactKind::MdtSummary => self.mdt_summary = Some(reference),
            ArtifactKind::SignedReport => self.signed_report = Some(reference),
        }
    }
}

/// A second-opinion request moving through the committee workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub patient_ref: String,
    pub specialty: String,
    pub cancer_type: String,
    pub committee_hint: Option<CommitteeId>,
    pub status: CaseStatus,
    pub committee: Option<CommitteeId>,
    pub physician: Option<PhysicianId>,
    pub artifacts: CaseArtifacts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Case {
    pub(crate) fn from_intake(id: CaseId, intake: CaseIntake, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_ref: intake.patient_ref,
            specialty: intake.specialty,
            cancer_type: intake.cancer_type,
            committee_hint: intake.committee_hint,
            status: CaseStatus::Draft,
            committee: None,
            physician: None,
            artifacts: CaseArtifacts::default(),
            created_at: now,
            updated_at: now,
            assigned_at: None,
            completed_at: None,
        }
    }

    /// Intake fields still blank, in a stable order for error messages.
    pub fn missing_intake_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.patient_ref.trim().is_empty() {
            missing.push("patient_ref");
        }
        if self.specialty.trim().is_empty() {
            missing.push("specialty");
        }
        if self.cancer_type.trim().is_empty() {
            missing.push("cancer_type");
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicianState {
    Active,
    Suspended,
}

/// Committee physician with the caseload counters the assignment engine balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Physician {
    pub id: PhysicianId,
    pub name: String,
    pub active_caseload: u32,
    pub monthly_cap: u32,
    pub tenure_days: u32,
    pub available: bool,
    pub state: PhysicianState,
}

impl Physician {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: PhysicianId::new(id),
            name: name.into(),
            active_caseload: 0,
            monthly_cap: 10,
            tenure_days: 0,
            available: true,
            state: PhysicianState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == PhysicianState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Coordinator,
    Senior,
    Regular,
}

/// One roster row. Roster order is the tie-breaker for assignment scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub physician: PhysicianId,
    pub role: MembershipRole,
    pub responsible_by_default: bool,
    pub can_vote: bool,
    pub auto_assignable: bool,
    pub active: bool,
}

impl Membership {
    pub fn new(physician: PhysicianId, role: MembershipRole) -> Self {
        Self {
            physician,
            role,
            responsible_by_default: false,
            can_vote: true,
            auto_assignable: true,
            active: true,
        }
    }
}

/// Multidisciplinary committee (tumor board) for one cancer type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub id: CommitteeId,
    pub name: String,
    pub cancer_type: String,
    pub quorum: u32,
    pub active: bool,
    pub roster: Vec<Membership>,
}

impl Committee {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cancer_type: impl Into<String>,
    ) -> Self {
        Self {
            id: CommitteeId::new(id),
            name: name.into(),
            cancer_type: cancer_type.into(),
            quorum: 3,
            active: true,
            roster: Vec::new(),
        }
    }

    pub fn with_member(mut self, membership: Membership) -> Self {
        self.roster.push(membership);
        self
    }

    pub fn active_member(&self, physician: &PhysicianId) -> Option<&Membership> {
        self.roster
            .iter()
            .find(|membership| membership.active && &membership.physician == physician)
    }
}
