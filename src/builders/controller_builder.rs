//! Builder assembling a [`Controller`] from configuration and backends.

use std::sync::Arc;

use crate::config::ControllerConfig;
use crate::core::{AuditSink, Controller, DispatchError, SimulatedVehicle, VehicleLauncher};
use crate::infra::outbox::{InMemoryOutbox, Outbox};

/// Collects the controller's collaborators; unset ones get defaults.
///
/// Defaults: an [`InMemoryOutbox`], a [`SimulatedVehicle`] launcher stepping
/// one km per tick, and no audit sink.
#[derive(Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
    outbox: Option<Arc<dyn Outbox>>,
    launcher: Option<Arc<dyn VehicleLauncher>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ControllerBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Deliver client messages through `outbox`.
    #[must_use]
    pub fn with_outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Start workers through `launcher`.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn VehicleLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Record lifecycle transitions into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Validate the configuration and build the controller.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if the configuration is invalid.
    pub fn build(self) -> Result<Arc<Controller>, DispatchError> {
        self.config
            .validate()
            .map_err(|e| DispatchError::PreconditionFailed(format!("config invalid: {e}")))?;

        let outbox = self
            .outbox
            .unwrap_or_else(|| Arc::new(InMemoryOutbox::new()));
        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(SimulatedVehicle::new(
                Arc::clone(&outbox),
                self.config.tick(),
                self.config.progress_step_percent,
            ))
        });
        Ok(Arc::new(Controller::new(self.config, outbox, launcher, self.audit)))
    }
}
