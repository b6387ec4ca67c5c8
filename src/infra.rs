use metrics_exporter_prometheus::PrometheusHandle;
use mdt_engine::workflows::second_opinion::{
    Committee, DomainEvent, EventPublisher, EventType, Membership, MembershipRole, Physician,
    PhysicianId, PublishError, SecondOpinionService, Store, WorkflowError,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Keeps published events in memory and mirrors them to the log.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEventPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        info!(case_id = %event.case_id, event_type = ?event.event_type, "domain event");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

impl InMemoryEventPublisher {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn count(&self, event_type: EventType) -> usize {
        self.events()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

fn physician(id: &str, name: &str, caseload: u32, tenure_days: u32) -> Physician {
    let mut physician = Physician::new(id, name);
    physician.active_caseload = caseload;
    physician.tenure_days = tenure_days;
    physician
}

/// Register a small breast and lung tumor board roster for local runs.
pub(crate) fn seed_sample_directory<S, P>(
    service: &SecondOpinionService<S, P>,
) -> Result<Vec<Committee>, WorkflowError>
where
    S: Store + 'static,
    P: EventPublisher + 'static,
{
    let roster = [
        physician("dr-ortega", "Dra. Lucia Ortega", 2, 2900),
        physician("dr-ramos", "Dr. Tomas Ramos", 5, 1400),
        physician("dr-vidal", "Dra. Elena Vidal", 0, 420),
        physician("dr-moreno", "Dr. Pablo Moreno", 1, 3650),
        physician("dr-santos", "Dra. Irene Santos", 0, 900),
    ];
    for member in roster {
        service.register_physician(member)?;
    }

    let mut coordinator =
        Membership::new(PhysicianId::new("dr-ortega"), MembershipRole::Coordinator);
    coordinator.responsible_by_default = true;
    let breast = Committee::new("cmt-breast", "Comite de Mama", "breast")
        .with_member(coordinator)
        .with_member(Membership::new(PhysicianId::new("dr-ramos"), MembershipRole::Senior))
        .with_member(Membership::new(PhysicianId::new("dr-vidal"), MembershipRole::Regular));

    let lung = Committee::new("cmt-lung", "Comite de Pulmon", "lung")
        .with_member(Membership::new(PhysicianId::new("dr-moreno"), MembershipRole::Coordinator))
        .with_member(Membership::new(PhysicianId::new("dr-santos"), MembershipRole::Regular));

    Ok(vec![
        service.register_committee(breast)?,
        service.register_committee(lung)?,
    ])
}
