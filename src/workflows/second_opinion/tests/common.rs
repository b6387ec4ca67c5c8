use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::second_opinion::assignment::{AlgorithmSettings, AssignmentRequest};
use crate::workflows::second_opinion::domain::{
    CaseId, CaseIntake, Committee, Membership, MembershipRole, Physician, PhysicianId,
};
use crate::workflows::second_opinion::lifecycle::{self, CaseTransition};
use crate::workflows::second_opinion::registry::Registry;
use crate::workflows::second_opinion::repository::{
    DomainEvent, EventPublisher, EventType, MemoryStore, PublishError, RepositoryError, Store,
};
use crate::workflows::second_opinion::service::SecondOpinionService;

pub(super) const COMMITTEE: &str = "cmt-breast";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn physician(id: &str, caseload: u32, tenure_days: u32) -> Physician {
    let mut physician = Physician::new(id, format!("Dr. {id}"));
    physician.active_caseload = caseload;
    physician.tenure_days = tenure_days;
    physician
}

pub(super) fn pid(id: &str) -> PhysicianId {
    PhysicianId::new(id)
}

pub(super) fn committee(members: &[&str]) -> Committee {
    members.iter().enumerate().fold(
        Committee::new(COMMITTEE, "Breast tumor board", "breast"),
        |committee, (position, id)| {
            let role = if position == 0 {
                MembershipRole::Coordinator
            } else {
                MembershipRole::Regular
            };
            committee.with_member(Membership::new(pid(id), role))
        },
    )
}

pub(super) fn settings() -> AlgorithmSettings {
    AlgorithmSettings {
        name: "test".to_string(),
        ..AlgorithmSettings::default()
    }
}

pub(super) fn intake() -> CaseIntake {
    CaseIntake {
        patient_ref: "PAT-0001".to_string(),
        specialty: "oncology".to_string(),
        cancer_type: "breast".to_string(),
        committee_hint: None,
    }
}

/// Registry holding the given physicians in one breast committee and config version 1.
pub(super) fn registry_with(physicians: Vec<Physician>, settings: AlgorithmSettings) -> Registry {
    let mut registry = Registry::default();
    let ids: Vec<String> = physicians.iter().map(|p| p.id.to_string()).collect();
    for physician in physicians {
        registry.upsert_physician(physician);
    }
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    registry
        .upsert_committee(committee(&ids))
        .expect("committee registers");
    registry
        .publish_config(settings, now())
        .expect("config publishes");
    registry
}

pub(super) fn submitted_case(registry: &mut Registry) -> CaseId {
    let case = registry.open_case(intake(), now());
    lifecycle::apply(registry, &case.id, &CaseTransition::Submit, None, now())
        .expect("submit succeeds");
    case.id
}

pub(super) fn advance(registry: &mut Registry, case_id: &CaseId, transitions: &[CaseTransition]) {
    for transition in transitions {
        lifecycle::apply(registry, case_id, transition, None, now())
            .unwrap_or_else(|error| panic!("{:?} failed: {error}", transition.kind()));
    }
}

/// Case sitting in `MDT_IN_PROGRESS` with a fresh workflow in `DISCUSION`.
pub(super) fn deliberating(members: &[&str]) -> (Registry, CaseId) {
    let physicians = members.iter().map(|id| physician(id, 0, 365)).collect();
    let mut registry = registry_with(physicians, settings());
    let case_id = submitted_case(&mut registry);
    advance(
        &mut registry,
        &case_id,
        &[
            CaseTransition::Assign(AssignmentRequest::automatic()),
            CaseTransition::ConfirmReview,
            CaseTransition::OpenDeliberation,
        ],
    );
    (registry, case_id)
}

#[derive(Default, Clone)]
pub(super) struct RecordingPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub(super) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("publisher mutex poisoned").clone()
    }

    pub(super) fn of_type(&self, event_type: EventType) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("publisher mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingPublisher;

impl EventPublisher for FailingPublisher {
    fn publish(&self, _event: DomainEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("queue offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl Store for UnavailableStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Registry) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn read<T, F>(&self, _view: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Registry) -> T,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) type TestService = SecondOpinionService<MemoryStore, RecordingPublisher>;

/// Service with physicians `a`, `b`, `c` (caseloads 2, 5, 0) in one breast committee.
pub(super) fn build_service() -> (TestService, Arc<MemoryStore>, Arc<RecordingPublisher>) {
    build_service_with(
        vec![physician("a", 2, 365), physician("b", 5, 365), physician("c", 0, 365)],
        settings(),
    )
}

pub(super) fn build_service_with(
    physicians: Vec<Physician>,
    settings: AlgorithmSettings,
) -> (TestService, Arc<MemoryStore>, Arc<RecordingPublisher>) {
    let store = Arc::new(MemoryStore::new(registry_with(physicians, settings)));
    let events = Arc::new(RecordingPublisher::default());
    let service = SecondOpinionService::new(store.clone(), events.clone());
    (service, store, events)
}

/// Drive a case through intake, assignment, and document review into deliberation.
pub(super) fn service_case_in_deliberation(service: &TestService) -> CaseId {
    let case = service.open_case(intake()).expect("case opens");
    service
        .transition(&case.id, CaseTransition::Submit, None)
        .expect("submit succeeds");
    service
        .assign(&case.id, AssignmentRequest::automatic())
        .expect("assignment succeeds");
    service
        .transition(&case.id, CaseTransition::ConfirmReview, None)
        .expect("review confirmed");
    service
        .transition(&case.id, CaseTransition::OpenDeliberation, None)
        .expect("deliberation opens");
    case.id
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
