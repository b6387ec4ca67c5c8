//! Append-only audit trail for assignment runs and lifecycle transitions.
//!
//! Entries are only ever pushed; nothing in the crate exposes a mutable handle to a stored
//! entry. Sequence numbers are shared between both logs so a reader can interleave them.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assignment::CandidateScore;
use super::domain::{CaseId, CaseStatus, CommitteeId, PhysicianId};
use super::lifecycle::TransitionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Assigned,
    Skipped,
    Unavailable,
}

/// One candidate evaluated during one assignment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentAuditEntry {
    pub sequence: u64,
    pub case_id: CaseId,
    pub committee_id: CommitteeId,
    pub physician_id: PhysicianId,
    pub decision: AuditDecision,
    pub reason: String,
    pub load_score: Option<f64>,
    pub seniority_score: Option<f64>,
    pub final_score: Option<f64>,
    pub config_version: u32,
    pub is_override: bool,
    pub override_justification: Option<String>,
    pub override_actor: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Unsequenced entry produced by the assignment engine before commit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AuditDraft {
    pub physician_id: PhysicianId,
    pub decision: AuditDecision,
    pub reason: String,
    pub score: Option<CandidateScore>,
    pub manual: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAuditEntry {
    pub sequence: u64,
    pub case_id: CaseId,
    pub transition: TransitionKind,
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub actor: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    assignments: Vec<AssignmentAuditEntry>,
    transitions: Vec<TransitionAuditEntry>,
    next_sequence: u64,
}

impl AuditLog {
    fn next(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    pub(crate) fn record_assignment(
        &mut self,
        case_id: &CaseId,
        committee_id: &CommitteeId,
        config_version: u32,
        draft: AuditDraft,
        now: DateTime<Utc>,
    ) -> AssignmentAuditEntry {
        let (override_actor, override_justification) = match draft.manual {
            Some((actor, justification)) => (Some(actor), Some(justification)),
            None => (None, None),
        };
        let entry = AssignmentAuditEntry {
            sequence: self.next(),
            case_id: case_id.clone(),
            committee_id: committee_id.clone(),
            physician_id: draft.physician_id,
            decision: draft.decision,
            reason: draft.reason,
            load_score: draft.score.map(|score| score.load),
            seniority_score: draft.score.map(|score| score.seniority),
            final_score: draft.score.map(|score| score.final_score),
            config_version,
            is_override: override_actor.is_some(),
            override_justification,
            override_actor,
            recorded_at: now,
        };
        self.assignments.push(entry.clone());
        entry
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record_transition(
        &mut self,
        case_id: &CaseId,
        transition: TransitionKind,
        from: CaseStatus,
        to: CaseStatus,
        actor: Option<&str>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> TransitionAuditEntry {
        let entry = TransitionAuditEntry {
            sequence: self.next(),
            case_id: case_id.clone(),
            transition,
            from,
            to,
            actor: actor.map(str::to_string),
            note: note.map(str::to_string),
            recorded_at: now,
        };
        self.transitions.push(entry.clone());
        entry
    }

    pub fn assignments(&self) -> &[AssignmentAuditEntry] {
        &self.assignments
    }

    pub fn assignments_for(&self, case_id: &CaseId) -> Vec<AssignmentAuditEntry> {
        self.assignments
            .iter()
            .filter(|entry| &entry.case_id == case_id)
            .cloned()
            .collect()
    }

    pub fn transitions_for(&self, case_id: &CaseId) -> Vec<TransitionAuditEntry> {
        self.transitions
            .iter()
            .filter(|entry| &entry.case_id == case_id)
            .cloned()
            .collect()
    }

    /// Sequence of the most recent `assigned` entry for this physician in this committee.
    pub fn last_assigned(
        &self,
        committee_id: &CommitteeId,
        physician_id: &PhysicianId,
    ) -> Option<u64> {
        self.assignments
            .iter()
            .rev()
            .find(|entry| {
                entry.decision == AuditDecision::Assigned
                    && &entry.committee_id == committee_id
                    && &entry.physician_id == physician_id
            })
            .map(|entry| entry.sequence)
    }
}

/// Write assignment entries as CSV for reporting screens.
pub fn write_assignment_csv<W: io::Write>(
    entries: &[AssignmentAuditEntry],
    writer: W,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for entry in entries {
        csv_writer.serialize(entry)?;
    }
    csv_writer.flush()?;
    Ok(())
}
