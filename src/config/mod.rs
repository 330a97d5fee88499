//! Configuration models for the controller.

pub mod controller;

pub use controller::{ChannelConfig, ControllerConfig, RenegotiationConfig};
