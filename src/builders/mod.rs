//! Builders to construct a controller from configuration.

pub mod controller_builder;

pub use controller_builder::ControllerBuilder;
