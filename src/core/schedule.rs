//! Schedule queue: bounded table of pending service requests.
//!
//! Entries are never physically removed; a dispatched, cancelled or rejected
//! entry is marked inactive and its position becomes reusable.
//!
//! The reconciliation pass claims an entry before it reserves a fleet slot for
//! it. A claimed entry is hidden from listings, so a service shows up either
//! as pending here or as running in the fleet, never both.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::DispatchError;
use crate::util::types::{ClientPid, Km, ServiceId, Tick};

/// A pending service request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Service identifier assigned at admission.
    pub service_id: ServiceId,
    /// Owning client's name.
    pub username: String,
    /// Owning client.
    pub owner_pid: ClientPid,
    /// Tick at which the entry becomes due.
    pub trigger_tick: Tick,
    /// Requested distance.
    pub distance: Km,
    /// Trip destination.
    pub destination: String,
    /// Inactive entries are logically deleted.
    pub active: bool,
    /// Waiting for the owner to accept or reject an offer.
    pub awaiting_confirmation: bool,
    /// Tick offered in the last renegotiation.
    pub proposed_tick: Option<Tick>,
    /// Tick of the last offer sent, for throttling.
    pub last_notice_tick: Option<Tick>,
    /// Number of offers made so far.
    pub offers: u32,
    /// Claimed by the reconciliation pass while its vehicle starts.
    pub dispatching: bool,
}

impl ScheduleEntry {
    /// Create an active, non-awaiting entry.
    #[must_use]
    pub fn new(
        service_id: ServiceId,
        username: impl Into<String>,
        owner_pid: ClientPid,
        trigger_tick: Tick,
        distance: Km,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            service_id,
            username: username.into(),
            owner_pid,
            trigger_tick,
            distance,
            destination: destination.into(),
            active: true,
            awaiting_confirmation: false,
            proposed_tick: None,
            last_notice_tick: None,
            offers: 0,
            dispatching: false,
        }
    }

    /// Mark the entry as carrying an offer made at `now`.
    #[must_use]
    pub fn with_offer(mut self, offer: Tick, now: Tick) -> Self {
        self.awaiting_confirmation = true;
        self.proposed_tick = Some(offer);
        self.last_notice_tick = Some(now);
        self.offers += 1;
        self
    }

    /// Whether a new offer may be sent at `now` given the throttle interval.
    #[must_use]
    pub fn notice_allowed(&self, now: Tick, interval: Tick) -> bool {
        self.last_notice_tick
            .is_none_or(|last| now.saturating_sub(last) >= interval)
    }
}

/// Outcome of a client's reply to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Offer accepted; the entry is now due at this tick.
    Accepted(Tick),
    /// Offer rejected; the entry was deactivated.
    Rejected,
}

/// Bounded list of pending service requests.
pub struct ScheduleQueue {
    capacity: usize,
    entries: Mutex<Vec<ScheduleEntry>>,
}

impl ScheduleQueue {
    /// Create a queue holding at most `capacity` active entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Maximum number of active entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store an entry in the first reusable position.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if every position holds an active entry.
    pub fn insert(&self, entry: ScheduleEntry) -> Result<usize, DispatchError> {
        let mut entries = self.entries.lock();
        if let Some(index) = entries.iter().position(|e| !e.active) {
            entries[index] = entry;
            return Ok(index);
        }
        if entries.len() >= self.capacity {
            return Err(DispatchError::CapacityExceeded("schedule list full".into()));
        }
        entries.push(entry);
        Ok(entries.len() - 1)
    }

    /// Active, non-awaiting entries due at `now`, in table order.
    #[must_use]
    pub fn due(&self, now: Tick) -> Vec<ScheduleEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| {
                e.active && !e.awaiting_confirmation && !e.dispatching && e.trigger_tick <= now
            })
            .cloned()
            .collect()
    }

    /// Claim a due entry for dispatch. Returns it unless it is gone, awaiting
    /// an answer or already claimed.
    pub fn claim(&self, service_id: ServiceId) -> Option<ScheduleEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.iter_mut().find(|e| {
            e.active && !e.awaiting_confirmation && !e.dispatching && e.service_id == service_id
        })?;
        entry.dispatching = true;
        Some(entry.clone())
    }

    /// Hand a claimed entry back after a failed dispatch.
    ///
    /// Returns `false` if it was cancelled while claimed.
    pub fn unclaim(&self, service_id: ServiceId) -> bool {
        let mut entries = self.entries.lock();
        entries
            .iter_mut()
            .find(|e| e.active && e.dispatching && e.service_id == service_id)
            .is_some_and(|e| {
                e.dispatching = false;
                true
            })
    }

    /// Retire a claimed entry whose vehicle is now running.
    ///
    /// Returns `false` if it was cancelled while claimed.
    pub fn complete(&self, service_id: ServiceId) -> bool {
        let mut entries = self.entries.lock();
        entries
            .iter_mut()
            .find(|e| e.active && e.dispatching && e.service_id == service_id)
            .is_some_and(|e| {
                e.active = false;
                e.dispatching = false;
                true
            })
    }

    /// Deactivate an entry. Returns it if it was still active.
    pub fn deactivate(&self, service_id: ServiceId) -> Option<ScheduleEntry> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.active && e.service_id == service_id)?;
        entry.active = false;
        Some(entry.clone())
    }

    /// Attach a renegotiation offer to an active, non-awaiting entry.
    ///
    /// Returns the updated entry, or `None` if it is gone or already awaiting.
    pub fn propose(&self, service_id: ServiceId, offer: Tick, now: Tick) -> Option<ScheduleEntry> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.active && !e.awaiting_confirmation && e.service_id == service_id)?;
        *entry = entry.clone().with_offer(offer, now);
        Some(entry.clone())
    }

    /// Apply an owner's decision on an awaiting entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the entry exists, is active, belongs to
    /// `owner` and is awaiting confirmation.
    pub fn decide(
        &self,
        owner: ClientPid,
        service_id: ServiceId,
        accept: bool,
    ) -> Result<Decision, DispatchError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| {
                e.active
                    && e.awaiting_confirmation
                    && e.owner_pid == owner
                    && e.service_id == service_id
            })
            .ok_or_else(|| DispatchError::NotFound(format!("no offer pending for service {service_id}")))?;

        if !accept {
            entry.active = false;
            entry.awaiting_confirmation = false;
            return Ok(Decision::Rejected);
        }
        let committed = entry.proposed_tick.unwrap_or(entry.trigger_tick);
        entry.trigger_tick = committed;
        entry.awaiting_confirmation = false;
        Ok(Decision::Accepted(committed))
    }

    /// Deactivate every active entry matching the filters and return them.
    ///
    /// `owner` restricts to one client; `service` restricts to one id. Claimed
    /// entries are included with `dispatching` set; the pass that claimed them
    /// preempts their vehicle.
    pub fn cancel(&self, owner: Option<ClientPid>, service: Option<ServiceId>) -> Vec<ScheduleEntry> {
        let mut entries = self.entries.lock();
        entries
            .iter_mut()
            .filter(|e| {
                e.active
                    && owner.is_none_or(|pid| pid == e.owner_pid)
                    && service.is_none_or(|id| id == e.service_id)
            })
            .map(|e| {
                e.active = false;
                e.clone()
            })
            .collect()
    }

    /// Active entries owned by `owner`, in table order.
    #[must_use]
    pub fn pending_for(&self, owner: ClientPid) -> Vec<ScheduleEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.active && !e.dispatching && e.owner_pid == owner)
            .cloned()
            .collect()
    }

    /// All active, unclaimed entries, in table order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScheduleEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.active && !e.dispatching)
            .cloned()
            .collect()
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.active).count()
    }

    /// Whether there is no active entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
