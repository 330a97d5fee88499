//! Vehicle worker lifecycle: dispatch, monitor, reap, preempt, terminate.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::fleet::{FinishedSlot, RunningVehicle, SlotClaim};
use crate::core::state::ControllerState;
use crate::core::vehicle::{TripLine, TripOrder, TripOutput, VehicleLauncher};
use crate::core::DispatchError;
use crate::util::types::{ClientPid, ServiceId, VehicleId};

/// Time a preempted worker gets to report before it is aborted at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Where a service was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    /// Fleet slot index.
    pub slot: usize,
    /// Worker identity.
    pub vehicle_id: VehicleId,
}

/// Starts workers into fleet slots and recycles the slots afterwards.
pub struct LifecycleManager {
    state: Arc<ControllerState>,
    launcher: Arc<dyn VehicleLauncher>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl LifecycleManager {
    /// Create a manager over shared state.
    pub fn new(
        state: Arc<ControllerState>,
        launcher: Arc<dyn VehicleLauncher>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            state,
            launcher,
            audit,
        }
    }

    /// Reserve a slot, start a worker for `order`, and attach its monitor.
    ///
    /// The slot is released again on any failure after reservation.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` if no slot is free
    /// - `SpawnFailure` if the worker or its monitor cannot be started
    pub fn dispatch(&self, order: &TripOrder) -> Result<Dispatched, DispatchError> {
        let now = self.state.clock.now();
        let claim = SlotClaim {
            service_id: order.service_id,
            owner_pid: order.owner_pid,
            username: order.username.clone(),
            destination: order.destination.clone(),
            distance: order.distance,
            estimated_completion: now.saturating_add(order.distance),
        };
        let slot = self
            .state
            .fleet
            .reserve_free_slot(claim)
            .ok_or_else(|| DispatchError::CapacityExceeded("fleet full".into()))?;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.state.fleet.release(slot);
                return Err(DispatchError::SpawnFailure(e.to_string()));
            }
        };
        let launched = match self.launcher.launch(order) {
            Ok(launched) => launched,
            Err(e) => {
                self.state.fleet.release(slot);
                warn!(service_id = order.service_id, slot, error = %e, "vehicle launch failed");
                return Err(e);
            }
        };

        let vehicle_id = launched.vehicle_id;
        let monitor = runtime.spawn(monitor(
            Arc::clone(&self.state),
            slot,
            vehicle_id,
            launched.output,
        ));
        self.state.fleet.attach(
            slot,
            RunningVehicle {
                vehicle_id,
                preempt: launched.preempt,
                worker: launched.worker,
                monitor,
            },
        );

        info!(
            tick = now,
            service_id = order.service_id,
            slot,
            vehicle_id,
            username = %order.username,
            active = self.state.fleet.occupied_count(),
            "vehicle dispatched"
        );
        self.record(
            order.service_id,
            &order.username,
            AuditAction::Dispatch,
            Some(format!("slot {slot} vehicle {vehicle_id}")),
        );
        Ok(Dispatched { slot, vehicle_id })
    }

    /// Join and release every slot whose monitor has seen end-of-stream.
    ///
    /// Returns the number of slots recycled.
    pub async fn reap_finished(&self) -> usize {
        let finished = self.state.fleet.take_finished();
        let count = finished.len();
        for slot in finished {
            let FinishedSlot {
                index,
                service_id,
                owner_pid,
                username,
                vehicle_id,
                worker,
                monitor,
            } = slot;
            if let Some(monitor) = monitor {
                if let Err(e) = monitor.await {
                    warn!(slot = index, error = %e, "monitor task failed");
                }
            }
            if let Some(worker) = worker {
                if let Err(e) = worker.await {
                    warn!(slot = index, error = %e, "vehicle task failed");
                }
            }
            self.state.fleet.release(index);
            info!(
                tick = self.state.clock.now(),
                service_id,
                slot = index,
                vehicle_id = ?vehicle_id,
                pid = owner_pid,
                active = self.state.fleet.occupied_count(),
                "vehicle reaped"
            );
            self.record(service_id, &username, AuditAction::Reap, None);
        }
        count
    }

    /// Signal preemption to running services matching the filters.
    ///
    /// Returns the `(service_id, owner_pid)` pairs signalled. The reply only
    /// confirms the signal; the worker reports and exits on its own.
    pub fn preempt(
        &self,
        owner: Option<ClientPid>,
        service: Option<ServiceId>,
    ) -> Vec<(ServiceId, ClientPid)> {
        let signalled = self.state.fleet.preempt(owner, service);
        for (service_id, pid) in &signalled {
            info!(service_id, pid, "preemption signalled");
        }
        signalled
    }

    /// Preempt every worker, abort whatever is still running after a short
    /// grace period, and abort all monitors.
    pub async fn terminate_all(&self) {
        let slots = self.state.fleet.terminate_all();
        let count = slots.len();
        for slot in slots {
            if let Some(mut worker) = slot.worker {
                if tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await.is_err() {
                    debug!(slot = slot.index, "vehicle did not stop in time, aborting");
                    worker.abort();
                }
            }
            if let Some(monitor) = slot.monitor {
                monitor.abort();
            }
        }
        info!(count, "all vehicles terminated");
    }

    fn record(&self, service_id: ServiceId, username: &str, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            let tick = self.state.clock.now();
            sink.record(build_audit_event(service_id, username, action, tick, detail));
        }
    }
}

/// Read a worker's output until end-of-stream, then flag the slot finished.
///
/// Never releases the slot itself.
async fn monitor(state: Arc<ControllerState>, slot: usize, vehicle_id: VehicleId, output: TripOutput) {
    let mut lines = BufReader::new(output).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                info!(vehicle_id, slot, "{line}");
                match TripLine::parse(&line) {
                    TripLine::Report(km) => {
                        let total = state.odometer.record(km);
                        debug!(vehicle_id, km, total, "distance reported");
                    }
                    TripLine::Start(text) | TripLine::Progress(text) => {
                        state.fleet.update_status(slot, text);
                    }
                    TripLine::Completed(_) | TripLine::Cancelled(_) | TripLine::Other(_) => {}
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(vehicle_id, slot, error = %e, "vehicle stream lost");
                break;
            }
        }
    }
    state.fleet.mark_monitor_done(slot);
}
