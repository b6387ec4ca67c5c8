use std::sync::Arc;

use super::common::*;
use crate::workflows::second_opinion::assignment::{AlgorithmSettings, AssignmentRequest};
use crate::workflows::second_opinion::audit::AuditDecision;
use crate::workflows::second_opinion::domain::CaseId;
use crate::workflows::second_opinion::error::WorkflowError;
use crate::workflows::second_opinion::lifecycle::CaseTransition;
use crate::workflows::second_opinion::registry::Registry;
use crate::workflows::second_opinion::repository::{EventType, MemoryStore, Store};
use crate::workflows::second_opinion::service::SecondOpinionService;

fn submitted(service: &TestService) -> CaseId {
    let case = service.open_case(intake()).expect("case opens");
    service
        .transition(&case.id, CaseTransition::Submit, None)
        .expect("submit succeeds");
    case.id
}

#[test]
fn events_follow_committed_assignment() {
    let (service, _, events) = build_service();
    let case_id = submitted(&service);

    service
        .assign(&case_id, AssignmentRequest::automatic())
        .expect("assignment succeeds");

    let completed = events.of_type(EventType::AssignmentCompleted);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].case_id, case_id);
    assert_eq!(completed[0].payload["physician_id"], "c");
    assert_eq!(events.of_type(EventType::CaseTransitioned).len(), 2);
}

#[test]
fn publisher_failure_does_not_fail_the_operation() {
    let store = Arc::new(MemoryStore::new(registry_with(
        vec![physician("a", 0, 365)],
        settings(),
    )));
    let service = SecondOpinionService::new(store.clone(), Arc::new(FailingPublisher));

    let case = service.open_case(intake()).expect("case opens");
    service
        .transition(&case.id, CaseTransition::Submit, None)
        .expect("submit commits despite the dead queue");
    let outcome = service
        .assign(&case.id, AssignmentRequest::automatic())
        .expect("assignment commits despite the dead queue");

    assert_eq!(outcome.case.physician.as_ref(), Some(&pid("a")));
    let caseload = store
        .read(|registry: &Registry| registry.physician(&pid("a")).map(|p| p.active_caseload))
        .expect("store readable")
        .expect("physician present");
    assert_eq!(caseload, 1);
}

#[test]
fn rejected_operation_publishes_nothing_and_changes_nothing() {
    let (service, store, events) = build_service();
    let case = service.open_case(intake()).expect("case opens");
    let before = events.events().len();

    let error = service
        .transition(&case.id, CaseTransition::StartReport, Some("someone"))
        .expect_err("out of order");
    assert!(matches!(error, WorkflowError::InvalidTransition { .. }));

    assert_eq!(events.events().len(), before);
    let log_len = store
        .read(|registry: &Registry| registry.audit().transitions_for(&case.id).len())
        .expect("store readable");
    assert_eq!(log_len, 0);
}

#[test]
fn failed_assignment_rolls_back_and_announces_failure() {
    let mut full = physician("solo", 15, 365);
    full.monthly_cap = 15;
    let (service, _, events) = build_service_with(vec![full], settings());
    let case_id = submitted(&service);

    let error = service
        .assign(&case_id, AssignmentRequest::automatic())
        .expect_err("nobody has capacity");
    assert!(matches!(error, WorkflowError::NoCandidate { .. }));

    assert!(service.assignment_audit(&case_id).unwrap().is_empty());
    assert_eq!(service.case(&case_id).unwrap().physician, None);
    let failed = events.of_type(EventType::AssignmentFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].case_id, case_id);
}

#[test]
fn config_versions_accumulate() {
    let (service, _, _) = build_service();
    let first = service.active_config().expect("initial config");
    assert_eq!(first.version, 1);

    let second = service
        .publish_config(AlgorithmSettings {
            name: "strict".to_string(),
            strict_mode: true,
            ..AlgorithmSettings::default()
        })
        .expect("publishes");
    assert_eq!(second.version, 2);

    let error = service
        .publish_config(AlgorithmSettings {
            monthly_cap: 0,
            ..AlgorithmSettings::default()
        })
        .expect_err("zero cap rejected");
    assert!(matches!(error, WorkflowError::InvalidConfig(_)));

    let history = service.config_history().expect("history");
    assert_eq!(history.iter().map(|c| c.version).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(service.active_config().unwrap().name, "strict");
}

#[test]
fn audit_export_writes_every_entry() {
    let (service, _, _) = build_service();
    let case_id = submitted(&service);
    service
        .assign(&case_id, AssignmentRequest::automatic())
        .expect("assignment succeeds");

    let mut buffer = Vec::new();
    let rows = service
        .export_assignment_audit(&mut buffer)
        .expect("export succeeds");
    let text = String::from_utf8(buffer).expect("utf8 csv");
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(rows, 3);
    assert_eq!(lines.len(), rows + 1);
    assert!(lines[0].starts_with("sequence,case_id,committee_id,physician_id,decision"));
    assert_eq!(
        lines.iter().skip(1).filter(|line| line.contains(",c,")).count(),
        1
    );

    let trail = service.assignment_audit(&case_id).unwrap();
    assert_eq!(
        trail
            .iter()
            .filter(|entry| entry.decision == AuditDecision::Assigned)
            .count(),
        1
    );
}

#[test]
fn concurrent_assignments_never_exceed_capacity() {
    let mut only = physician("solo", 0, 365);
    only.monthly_cap = 3;
    let (service, store, _) = build_service_with(vec![only], settings());
    let cases: Vec<CaseId> = (0..8).map(|_| submitted(&service)).collect();

    let results: Vec<Result<_, WorkflowError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = cases
            .iter()
            .map(|case_id| {
                let service = &service;
                scope.spawn(move || service.assign(case_id, AssignmentRequest::automatic()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect()
    });

    let assigned = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(assigned, 3);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|error| matches!(error, WorkflowError::NoCandidate { .. })));

    let caseload = store
        .read(|registry: &Registry| registry.physician(&pid("solo")).map(|p| p.active_caseload))
        .expect("store readable")
        .expect("physician present");
    assert_eq!(caseload, 3);
}

#[test]
fn store_outage_is_reported_and_publishes_nothing() {
    let events = Arc::new(RecordingPublisher::default());
    let service = SecondOpinionService::new(Arc::new(UnavailableStore), events.clone());

    let error = service.open_case(intake()).expect_err("store offline");
    assert!(matches!(error, WorkflowError::Repository(_)));
    assert!(error.is_retryable());

    let error = service.case(&CaseId::new("case-000001")).expect_err("store offline");
    assert!(matches!(error, WorkflowError::Repository(_)));
    assert!(events.events().is_empty());
}
