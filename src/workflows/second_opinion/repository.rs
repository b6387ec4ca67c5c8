use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::CaseId;
use super::registry::Registry;

/// Storage abstraction. Every mutation runs inside one serializable transaction.
pub trait Store: Send + Sync {
    /// Run `work` against the registry and commit only if it returns `Ok`.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Registry) -> Result<T, E>,
        E: From<RepositoryError>;

    /// Run a read-only view against the latest committed registry.
    fn read<T, F>(&self, view: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Registry) -> T;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// In-process store. The mutex is held for the whole transaction and the work is applied to a
/// snapshot that replaces the live registry on success.
///
/// Every transaction clones the full registry, history tables included, so a mutation costs time
/// proportional to everything recorded so far. Stores backed by a database should use its native
/// transactions instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registry: Mutex<Registry>,
}

impl MemoryStore {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Mutex::new(registry),
        }
    }
}

impl Store for MemoryStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Registry) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        // panics inside `work` only ever touch the snapshot
        let mut live = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = live.clone();
        let value = work(&mut snapshot)?;
        *live = snapshot;
        Ok(value)
    }

    fn read<T, F>(&self, view: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Registry) -> T,
    {
        let live = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(view(&live))
    }
}

/// Kinds of domain events emitted for the outbound notification queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AssignmentCompleted,
    AssignmentFailed,
    CaseTransitioned,
    ConsensusPhaseChanged,
}

/// Domain event payload, published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub case_id: CaseId,
    pub event_type: EventType,
    pub payload: Value,
}

impl DomainEvent {
    pub fn new(case_id: CaseId, event_type: EventType, payload: Value) -> Self {
        Self {
            case_id,
            event_type,
            payload,
        }
    }
}

/// Outbound notification hook (queue, e-mail fan-out, websocket bridge).
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;
}

/// Event dispatch error. Logged by the service, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}
