//! Registry audit trail (for testing and verification).

use core_types::DeviceType;
use serde::{Deserialize, Serialize};

/// Registry audit event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Root-level device inserted
    Registered { name: String, device_type: DeviceType },
    /// Layered device inserted over a parent
    Attached { name: String, parent: String },
    /// Init hook ran successfully
    Initialized { name: String },
    /// Detach decremented the count
    Detached { name: String, remaining: u32 },
    /// Device removed and its payloads released
    Released { name: String },
    /// Registration refused; nothing was inserted
    Rejected { name: String, reason: String },
}

/// Audit log for registry operations.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuditLog {
    events: Vec<RegistryEvent>,
}

impl RegistryAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&RegistryEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RegistryEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}
