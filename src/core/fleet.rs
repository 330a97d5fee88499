//! Fleet table: fixed-capacity vehicle slots and the aggregate distance counter.
//!
//! A slot moves `Free → Reserved → Running → Finished → Free`. It is reserved
//! before the worker exists so two dispatch attempts never claim the same
//! slot, and it is only returned to `Free` by the reconciliation loop once its
//! monitor task has seen end-of-stream.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::util::types::{ClientPid, Km, ServiceId, Tick, VehicleId};

/// Lifecycle state of a fleet slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Available for a new dispatch.
    Free,
    /// Claimed for a dispatch whose worker is not attached yet.
    Reserved,
    /// Worker running with its monitor task attached.
    Running,
    /// Monitor observed end-of-stream; waiting to be reaped.
    Finished,
}

/// Service linkage recorded when a slot is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim {
    /// Service occupying the slot.
    pub service_id: ServiceId,
    /// Owning client.
    pub owner_pid: ClientPid,
    /// Owning client's name.
    pub username: String,
    /// Trip destination.
    pub destination: String,
    /// Requested trip distance.
    pub distance: Km,
    /// `dispatch tick + distance`.
    pub estimated_completion: Tick,
}

/// Handles of a launched worker, attached to a reserved slot.
#[derive(Debug)]
pub struct RunningVehicle {
    /// Worker identity.
    pub vehicle_id: VehicleId,
    /// Preemption token observed by the worker's step loop.
    pub preempt: CancellationToken,
    /// Worker task.
    pub worker: JoinHandle<()>,
    /// Monitor task reading the worker's output stream.
    pub monitor: JoinHandle<()>,
}

/// Handles taken out of a finished slot for joining outside the lock.
#[derive(Debug)]
pub struct FinishedSlot {
    /// Slot index.
    pub index: usize,
    /// Service that ran in the slot.
    pub service_id: ServiceId,
    /// Owning client.
    pub owner_pid: ClientPid,
    /// Owning client's name.
    pub username: String,
    /// Worker identity, if one was attached.
    pub vehicle_id: Option<VehicleId>,
    /// Worker task handle.
    pub worker: Option<JoinHandle<()>>,
    /// Monitor task handle.
    pub monitor: Option<JoinHandle<()>>,
}

/// Read-only view of an occupied slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Slot index.
    pub index: usize,
    /// Lifecycle state.
    pub state: SlotState,
    /// Worker identity, once attached.
    pub vehicle_id: Option<VehicleId>,
    /// Service occupying the slot.
    pub service_id: ServiceId,
    /// Owning client.
    pub owner_pid: ClientPid,
    /// Owning client's name.
    pub username: String,
    /// Trip destination.
    pub destination: String,
    /// Requested trip distance.
    pub distance: Km,
    /// Estimated completion tick.
    pub estimated_completion: Tick,
    /// Last status line reported by the worker.
    pub status: String,
}

/// Earliest moment a slot is expected to become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectedFree {
    /// A slot is free right now.
    Now,
    /// No slot is free; the earliest estimate is this tick.
    At(Tick),
}

#[derive(Debug)]
struct VehicleSlot {
    state: SlotState,
    claim: Option<SlotClaim>,
    vehicle_id: Option<VehicleId>,
    status: String,
    monitor_done: bool,
    preempt_requested: bool,
    preempt: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl VehicleSlot {
    const fn free() -> Self {
        Self {
            state: SlotState::Free,
            claim: None,
            vehicle_id: None,
            status: String::new(),
            monitor_done: false,
            preempt_requested: false,
            preempt: None,
            worker: None,
            monitor: None,
        }
    }

    fn snapshot(&self, index: usize) -> Option<SlotSnapshot> {
        let claim = self.claim.as_ref()?;
        Some(SlotSnapshot {
            index,
            state: self.state,
            vehicle_id: self.vehicle_id,
            service_id: claim.service_id,
            owner_pid: claim.owner_pid,
            username: claim.username.clone(),
            destination: claim.destination.clone(),
            distance: claim.distance,
            estimated_completion: claim.estimated_completion,
            status: self.status.clone(),
        })
    }

    fn is_occupied(&self) -> bool {
        self.state != SlotState::Free
    }
}

/// Fixed-capacity table of vehicle slots behind a single lock.
pub struct FleetTable {
    slots: Mutex<Vec<VehicleSlot>>,
}

impl FleetTable {
    /// Create a fleet with `capacity` slots, all free.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| VehicleSlot::free()).collect()),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Claim the first free slot for `claim`, in one atomic step.
    pub fn reserve_free_slot(&self, claim: SlotClaim) -> Option<usize> {
        let mut slots = self.slots.lock();
        let (index, slot) = slots.iter_mut().enumerate().find(|(_, s)| !s.is_occupied())?;
        *slot = VehicleSlot::free();
        slot.state = SlotState::Reserved;
        slot.status = "starting".into();
        slot.claim = Some(claim);
        Some(index)
    }

    /// Attach a launched worker to a reserved slot.
    ///
    /// If the monitor already finished, the slot goes straight to `Finished`.
    /// A preemption requested while reserved is forwarded to the worker now.
    pub fn attach(&self, index: usize, vehicle: RunningVehicle) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(index) else {
            return;
        };
        if slot.preempt_requested {
            vehicle.preempt.cancel();
        }
        slot.vehicle_id = Some(vehicle.vehicle_id);
        slot.preempt = Some(vehicle.preempt);
        slot.worker = Some(vehicle.worker);
        slot.monitor = Some(vehicle.monitor);
        slot.state = if slot.monitor_done {
            SlotState::Finished
        } else {
            SlotState::Running
        };
    }

    /// Record that the slot's monitor task has seen end-of-stream.
    pub fn mark_monitor_done(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(index) {
            slot.monitor_done = true;
            if slot.state == SlotState::Running {
                slot.state = SlotState::Finished;
            }
        }
    }

    /// Replace the slot's last known status line.
    pub fn update_status(&self, index: usize, text: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(index) {
            text.trim_end_matches(['\r', '\n']).clone_into(&mut slot.status);
        }
    }

    /// Return a slot to `Free`, clearing service linkage and the monitor flag.
    pub fn release(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(index) {
            *slot = VehicleSlot::free();
        }
    }

    /// Take the task handles out of every finished slot not yet taken.
    ///
    /// Slots stay `Finished` (and occupied) until [`release`](Self::release).
    pub fn take_finished(&self) -> Vec<FinishedSlot> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Finished && s.monitor_done && s.monitor.is_some())
            .map(|(index, s)| FinishedSlot {
                index,
                service_id: s.claim.as_ref().map_or(0, |c| c.service_id),
                owner_pid: s.claim.as_ref().map_or(0, |c| c.owner_pid),
                username: s.claim.as_ref().map(|c| c.username.clone()).unwrap_or_default(),
                vehicle_id: s.vehicle_id,
                worker: s.worker.take(),
                monitor: s.monitor.take(),
            })
            .collect()
    }

    /// Signal preemption to every occupied slot matching the filters.
    ///
    /// `owner` restricts to one client; `service` restricts to one id. Returns
    /// the `(service_id, owner_pid)` pairs that were signalled.
    pub fn preempt(
        &self,
        owner: Option<ClientPid>,
        service: Option<ServiceId>,
    ) -> Vec<(ServiceId, ClientPid)> {
        let mut slots = self.slots.lock();
        let mut signalled = Vec::new();
        for slot in slots.iter_mut().filter(|s| matches!(s.state, SlotState::Reserved | SlotState::Running)) {
            let Some(claim) = slot.claim.as_ref() else {
                continue;
            };
            if owner.is_some_and(|pid| pid != claim.owner_pid)
                || service.is_some_and(|id| id != claim.service_id)
            {
                continue;
            }
            signalled.push((claim.service_id, claim.owner_pid));
            slot.preempt_requested = true;
            if let Some(token) = slot.preempt.as_ref() {
                token.cancel();
            }
        }
        signalled
    }

    /// Preempt every worker and take all task handles for forced termination.
    pub fn terminate_all(&self) -> Vec<FinishedSlot> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.is_occupied())
            .map(|(index, s)| {
                if let Some(token) = s.preempt.as_ref() {
                    token.cancel();
                }
                s.preempt_requested = true;
                FinishedSlot {
                    index,
                    service_id: s.claim.as_ref().map_or(0, |c| c.service_id),
                    owner_pid: s.claim.as_ref().map_or(0, |c| c.owner_pid),
                    username: s.claim.as_ref().map(|c| c.username.clone()).unwrap_or_default(),
                    vehicle_id: s.vehicle_id,
                    worker: s.worker.take(),
                    monitor: s.monitor.take(),
                }
            })
            .collect()
    }

    /// Earliest tick at which a slot is expected to be available.
    ///
    /// Used only to build renegotiation offers, never for admission.
    #[must_use]
    pub fn projected_free_tick(&self, now: Tick, default_horizon: Tick) -> ProjectedFree {
        let slots = self.slots.lock();
        if slots.iter().any(|s| !s.is_occupied()) {
            return ProjectedFree::Now;
        }
        let earliest = slots
            .iter()
            .filter_map(|s| s.claim.as_ref().map(|c| c.estimated_completion))
            .min();
        ProjectedFree::At(earliest.unwrap_or(now + default_horizon))
    }

    /// Whether every slot is occupied by a service estimated to run past `tick`.
    #[must_use]
    pub fn saturated_at(&self, tick: Tick) -> bool {
        let slots = self.slots.lock();
        slots.iter().all(|s| {
            s.is_occupied()
                && s.claim
                    .as_ref()
                    .is_some_and(|c| c.estimated_completion > tick)
        })
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_occupied()).count()
    }

    /// Snapshot of every occupied slot in slot order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.snapshot(i))
            .collect()
    }

    /// Snapshot of the slots serving `owner`.
    #[must_use]
    pub fn running_for(&self, owner: ClientPid) -> Vec<SlotSnapshot> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.owner_pid == owner && s.state != SlotState::Finished)
            .collect()
    }

    /// Whether `owner` has a service in any occupied slot.
    #[must_use]
    pub fn owner_has_running(&self, owner: ClientPid) -> bool {
        self.slots
            .lock()
            .iter()
            .filter(|s| s.is_occupied())
            .any(|s| s.claim.as_ref().is_some_and(|c| c.owner_pid == owner))
    }
}

/// Aggregate distance travelled by the whole fleet.
///
/// Only increases, and only from a worker's own report line.
#[derive(Debug, Default)]
pub struct Odometer {
    total: Mutex<Km>,
}

impl Odometer {
    /// Create a zeroed odometer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reported distance and return the new total.
    pub fn record(&self, km: Km) -> Km {
        let mut total = self.total.lock();
        *total = total.saturating_add(km);
        *total
    }

    /// Total distance so far.
    #[must_use]
    pub fn total(&self) -> Km {
        *self.total.lock()
    }
}
