use super::super::directory::MemberView;
use super::config::AlgorithmConfig;

/// Why a roster member was left out of the candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Exclusion {
    MembershipInactive,
    NotAutoAssignable,
    Suspended,
    Unavailable,
    AtCapacity { caseload: u32, cap: u32 },
}

impl Exclusion {
    pub(crate) fn reason(&self) -> String {
        match self {
            Exclusion::MembershipInactive => "membership inactive".to_string(),
            Exclusion::NotAutoAssignable => "excluded from automatic assignment".to_string(),
            Exclusion::Suspended => "physician suspended".to_string(),
            Exclusion::Unavailable => "marked unavailable for second opinions".to_string(),
            Exclusion::AtCapacity { caseload, cap } => {
                format!("at capacity ({caseload}/{cap} active cases)")
            }
        }
    }
}

/// The stricter of the physician's own cap and the configured monthly cap.
pub(crate) fn effective_cap(member: &MemberView<'_>, config: &AlgorithmConfig) -> u32 {
    member.physician.monthly_cap.min(config.monthly_cap)
}

pub(crate) fn screen(member: &MemberView<'_>, config: &AlgorithmConfig) -> Result<(), Exclusion> {
    if !member.membership.active {
        return Err(Exclusion::MembershipInactive);
    }
    if !member.membership.auto_assignable {
        return Err(Exclusion::NotAutoAssignable);
    }
    if !member.physician.is_active() {
        return Err(Exclusion::Suspended);
    }
    if config.respect_availability && !member.physician.available {
        return Err(Exclusion::Unavailable);
    }

    let cap = effective_cap(member, config);
    if member.physician.active_caseload >= cap {
        return Err(Exclusion::AtCapacity {
            caseload: member.physician.active_caseload,
            cap,
        });
    }

    Ok(())
}
