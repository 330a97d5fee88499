//! Shared controller state: five independently locked regions.
//!
//! No method here touches more than one region. Callers that need two regions
//! release the first before acquiring the second.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ControllerConfig;
use crate::core::clock::SimClock;
use crate::core::fleet::{FleetTable, Odometer};
use crate::core::schedule::ScheduleQueue;
use crate::core::sessions::SessionRegistry;
use crate::util::types::ServiceId;

/// Process-wide controller state, shared by reference with every task.
pub struct ControllerState {
    /// Logged-in clients.
    pub sessions: SessionRegistry,
    /// Vehicle slots.
    pub fleet: FleetTable,
    /// Pending service requests.
    pub schedule: ScheduleQueue,
    /// Aggregate distance travelled.
    pub odometer: Odometer,
    /// Simulated time.
    pub clock: SimClock,
    next_service_id: AtomicU64,
}

impl ControllerState {
    /// Build empty regions sized from `config`.
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            sessions: SessionRegistry::new(config.max_clients),
            fleet: FleetTable::new(config.max_vehicles),
            schedule: ScheduleQueue::new(config.max_schedule),
            odometer: Odometer::new(),
            clock: SimClock::new(0),
            next_service_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh service id. Ids start at 1 and are never reused.
    pub fn next_service_id(&self) -> ServiceId {
        self.next_service_id.fetch_add(1, Ordering::Relaxed)
    }
}
