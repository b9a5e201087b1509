//! Process-wide index of live sessions by id and join pin.

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{error::ServiceError, services::session_worker::Command};

/// Upper bound on pin sampling before giving up, to stay responsive when the
/// pin space is nearly exhausted.
const MAX_PIN_ATTEMPTS: u32 = 10_000;

/// Cheap handle to a running session worker.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session identifier.
    pub id: Uuid,
    /// Join pin while the session is registered.
    pub pin: String,
    /// Command queue of the session's worker task.
    pub commands: mpsc::UnboundedSender<Command>,
}

/// Registry mapping session ids and pins to worker handles.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    pins: DashMap<String, Uuid>,
    pin_length: u32,
}

impl SessionRegistry {
    /// Create a registry issuing pins of `pin_length` digits.
    pub fn new(pin_length: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            pins: DashMap::new(),
            pin_length,
        }
    }

    /// Reserve a pin not currently in use, by rejection sampling.
    ///
    /// The reservation is atomic through the map entry, so two concurrent
    /// allocations can never hand out the same pin.
    pub fn allocate_pin(&self, session_id: Uuid) -> Result<String, ServiceError> {
        let upper = 10u64.pow(self.pin_length);
        let width = self.pin_length as usize;
        let mut rng = rand::rng();

        for _ in 0..MAX_PIN_ATTEMPTS {
            let candidate = format!("{:0width$}", rng.random_range(0..upper));
            if let Entry::Vacant(slot) = self.pins.entry(candidate.clone()) {
                slot.insert(session_id);
                return Ok(candidate);
            }
        }

        Err(ServiceError::InvalidInput(
            "no free session pin available".to_string(),
        ))
    }

    /// Register a session under its id; its pin must already be reserved.
    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    /// Look up a session by join pin.
    pub fn lookup_by_pin(&self, pin: &str) -> Option<SessionHandle> {
        let session_id = *self.pins.get(pin)?;
        self.lookup_by_id(session_id)
    }

    /// Look up a session by id.
    pub fn lookup_by_id(&self, session_id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
    }

    /// Deregister a session and free its pin for reuse.
    pub fn remove(&self, session_id: Uuid) {
        if let Some((_, handle)) = self.sessions.remove(&session_id) {
            self.pins
                .remove_if(&handle.pin, |_, owner| *owner == session_id);
        }
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
