use crate::infra::{seed_sample_directory, InMemoryEventPublisher};
use clap::Args;
use mdt_engine::error::AppError;
use mdt_engine::workflows::second_opinion::{
    AlgorithmSettings, ArtifactKind, AssignmentRequest, CaseId, CaseIntake, CaseTransition,
    EventType, MemoryStore, PhysicianId, SecondOpinionService, VoteKind,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of breast cases to submit and assign before deliberating the first one
    #[arg(long, default_value_t = 3)]
    pub(crate) cases: usize,
    /// Rank candidates by seniority with round-robin rotation instead of weighted load
    #[arg(long)]
    pub(crate) strict: bool,
    /// Weight given to caseload versus seniority (0-100)
    #[arg(long, default_value_t = 50)]
    pub(crate) load_weight: u8,
    /// Write the assignment audit trail to this CSV file
    #[arg(long)]
    pub(crate) audit_csv: Option<PathBuf>,
}

type DemoService = SecondOpinionService<MemoryStore, InMemoryEventPublisher>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        cases,
        strict,
        load_weight,
        audit_csv,
    } = args;

    let events = Arc::new(InMemoryEventPublisher::default());
    let service = SecondOpinionService::new(Arc::new(MemoryStore::default()), events.clone());
    let config = service.publish_config(AlgorithmSettings {
        name: "demo".to_string(),
        load_weight,
        strict_mode: strict,
        ..AlgorithmSettings::default()
    })?;
    seed_sample_directory(&service)?;

    println!("MDT second-opinion demo");
    println!(
        "- Algorithm config v{} | load weight {} | strict mode {}",
        config.version, config.load_weight, config.strict_mode
    );

    let mut opened = Vec::with_capacity(cases);
    for index in 0..cases.max(1) {
        let case = service.open_case(CaseIntake {
            patient_ref: format!("PAT-{:04}", index + 1),
            specialty: "oncology".to_string(),
            cancer_type: "breast".to_string(),
            committee_hint: None,
        })?;
        service.transition(&case.id, CaseTransition::Submit, Some("intake"))?;

        match service.assign(&case.id, AssignmentRequest::automatic()) {
            Ok(outcome) => {
                if let Some(assignment) = outcome.assignment {
                    println!(
                        "- {} -> {} (committee {})",
                        case.id, assignment.physician_id, assignment.committee_id
                    );
                    for entry in &assignment.trail {
                        println!(
                            "    {:<10} {:<11} {}",
                            entry.physician_id.as_str(),
                            format!("{:?}", entry.decision).to_lowercase(),
                            entry.reason
                        );
                    }
                }
                opened.push(case.id);
            }
            Err(err) => println!("- {} could not be assigned: {}", case.id, err),
        }
    }

    if let Some(case_id) = opened.first() {
        deliberate(&service, case_id)?;
    }

    println!(
        "\nDomain events: {} assignments | {} failed assignments | {} transitions | \
         {} phase changes",
        events.count(EventType::AssignmentCompleted),
        events.count(EventType::AssignmentFailed),
        events.count(EventType::CaseTransitioned),
        events.count(EventType::ConsensusPhaseChanged)
    );

    if let Some(path) = audit_csv {
        let writer = BufWriter::new(File::create(&path)?);
        let rows = service.export_assignment_audit(writer)?;
        println!("Assignment audit: {} rows written to {}", rows, path.display());
    }

    Ok(())
}

fn deliberate(service: &DemoService, case_id: &CaseId) -> Result<(), AppError> {
    println!("\nDeliberation for {}", case_id);
    service.transition(case_id, CaseTransition::ConfirmReview, None)?;
    service.transition(case_id, CaseTransition::OpenDeliberation, None)?;

    let coordinator = PhysicianId::new("dr-ortega");
    let version = service.draft_proposal(
        case_id,
        &coordinator,
        "Neoadjuvant chemotherapy followed by breast-conserving surgery",
        None,
    )?;
    println!("- Proposal v{} by {}", version.version, version.author);
    service.open_voting(case_id)?;

    let ballots = [
        ("dr-ortega", VoteKind::Approve, "Consistent with guidelines"),
        ("dr-ramos", VoteKind::ApproveWithModifications, "Add genomic profiling"),
        ("dr-vidal", VoteKind::Abstain, "Defer to senior members"),
    ];
    for (physician, vote, justification) in ballots {
        let tally = service.cast_vote(case_id, &PhysicianId::new(physician), vote, justification)?;
        println!(
            "  - {} voted {} -> {} for / {} against / {} abstained",
            physician, vote, tally.in_favor, tally.against, tally.abstentions
        );
    }

    let workflow = service.close_voting(case_id, true, &[])?;
    let summary = service.voting_summary(case_id)?;
    println!(
        "- Closed as {} | evidence {} | quorum {}/{} met: {}",
        workflow.phase,
        workflow
            .evidence_level
            .map(|level| level.label())
            .unwrap_or("n/a"),
        summary.total_votes,
        summary.quorum,
        summary.quorum_met
    );

    service.transition(case_id, CaseTransition::CloseDeliberation, None)?;
    service.record_artifact(case_id, ArtifactKind::MdtSummary, "docs/mdt-summary.pdf")?;
    service.transition(case_id, CaseTransition::StartReport, None)?;
    service.record_artifact(case_id, ArtifactKind::SignedReport, "docs/signed-report.pdf")?;
    service.transition(case_id, CaseTransition::CompleteReport, None)?;
    let closed = service.transition(case_id, CaseTransition::Close, Some("dr-ortega"))?;

    println!("- Final status {}", closed.case.status);
    for entry in service.transition_log(case_id)? {
        println!("    {:>3} {} {} -> {}", entry.sequence, entry.transition, entry.from, entry.to);
    }

    Ok(())
}
