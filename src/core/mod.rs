//! Controller core: state regions, vehicle lifecycle, dispatch and request processing.

pub mod audit;
pub mod clock;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod lifecycle;
pub mod schedule;
pub mod sessions;
pub mod state;
pub mod vehicle;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use clock::SimClock;
pub use controller::{CancelSummary, Controller};
pub use dispatcher::{Admission, Dispatcher, PassReport, ServiceRequest};
pub use error::{AppResult, DispatchError};
pub use fleet::{FleetTable, Odometer, ProjectedFree, SlotSnapshot, SlotState};
pub use lifecycle::{Dispatched, LifecycleManager};
pub use schedule::{Decision, ScheduleEntry, ScheduleQueue};
pub use sessions::{ClientSession, SessionRegistry};
pub use state::ControllerState;
pub use vehicle::{LaunchedVehicle, SimulatedVehicle, TripLine, TripOrder, VehicleLauncher};
