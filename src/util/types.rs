//! Shared identifier and quantity types.

/// Process identity of a client, as carried in the message record.
pub type ClientPid = i32;

/// Monotonically increasing service identifier; never reused.
pub type ServiceId = u64;

/// Identifier of a launched vehicle worker.
pub type VehicleId = u32;

/// Distance in kilometres. One km costs one tick of simulated time.
pub type Km = u64;

/// One unit of simulated time.
pub type Tick = u64;
