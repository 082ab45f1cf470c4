//! Per-device connection lifecycle
//!
//! `Unconnected → Connected → ModelIdentified → RegistersFinalized → BatchesReady`,
//! with `Unavailable` when the device does not answer its probe. Every
//! [`Device::connect`] call runs the whole sequence from scratch.

use std::fmt;

use tracing::{info, warn};

use crate::core::device::Device;
use crate::core::planner::BankPlan;
use crate::core::types::{RegisterCategory, Value};
use crate::error::{RegSrvError, Result};

/// Where a device is in its connection sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Unconnected,
    Connected,
    ModelIdentified,
    RegistersFinalized,
    BatchesReady,
    /// Probe read failed after connecting
    Unavailable,
}

impl LifecycleState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::BatchesReady)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unconnected => "Unconnected",
            LifecycleState::Connected => "Connected",
            LifecycleState::ModelIdentified => "ModelIdentified",
            LifecycleState::RegistersFinalized => "RegistersFinalized",
            LifecycleState::BatchesReady => "BatchesReady",
            LifecycleState::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}

impl Device {
    /// Run the connection sequence up to `BatchesReady`
    ///
    /// Connection failures, an unanswered probe and an unsupported model all
    /// end the attempt with an error; the device keeps the state it reached.
    pub async fn connect(&mut self) -> Result<()> {
        self.lifecycle = LifecycleState::Unconnected;
        self.model = None;
        self.holding = Default::default();
        self.input = Default::default();

        self.transport.connect().await.map_err(|e| match e {
            RegSrvError::ConnectionError(_) => e,
            other => RegSrvError::connection(other.to_string()),
        })?;
        self.lifecycle = LifecycleState::Connected;

        if !self.is_available(None).await {
            self.lifecycle = LifecycleState::Unavailable;
            return Err(RegSrvError::unavailable(format!(
                "{} did not answer '{}' on slave {}",
                self.name(),
                self.family.probe_parameter(),
                self.slave_id()
            )));
        }

        let model = self.read_model().await?;
        if !self.family.is_supported(&model) {
            return Err(RegSrvError::model(format!(
                "{}: model '{}' is not supported by {} (supported: {})",
                self.name(),
                model,
                self.family.manufacturer(),
                self.family.supported_models().join(", ")
            )));
        }
        info!(device = %self.name(), "Model identified as {}", model);
        self.model = Some(model);
        self.lifecycle = LifecycleState::ModelIdentified;

        self.check_serial().await;
        self.setup_valid_registers_for_model()?;
        self.plan_batches()?;

        info!(
            device = %self.name(),
            "Ready: {} parameters, {} write parameters, {} holding / {} input batches",
            self.parameters.len(),
            self.write_parameters.len(),
            self.holding.plan.batches.len(),
            self.input.plan.batches.len()
        );
        Ok(())
    }

    /// Reset the parameter set to the family defaults and apply the model's delta
    pub fn setup_valid_registers_for_model(&mut self) -> Result<()> {
        if self.lifecycle != LifecycleState::ModelIdentified {
            return Err(RegSrvError::state(format!(
                "{}: parameters are finalized after model identification, device is {}",
                self.name(),
                self.lifecycle
            )));
        }
        let model = self
            .model
            .as_deref()
            .ok_or_else(|| RegSrvError::state(format!("{}: model not identified", self.name())))?;

        self.parameters = self.family.default_parameters();
        self.write_parameters = self.family.default_write_parameters();
        let delta = self.family.model_delta(model);
        delta.apply(&mut self.parameters, &mut self.write_parameters);

        info!(
            device = %self.name(),
            "Registers finalized for {}: +{} parameters, -{} write parameters",
            model,
            delta.add.len(),
            delta.remove_write.len()
        );
        self.lifecycle = LifecycleState::RegistersFinalized;
        Ok(())
    }

    /// Compute extents and batches for both banks from the finalized set
    pub fn plan_batches(&mut self) -> Result<()> {
        if self.lifecycle != LifecycleState::RegistersFinalized {
            return Err(RegSrvError::state(format!(
                "{}: batches are planned after registers are finalized, device is {}",
                self.name(),
                self.lifecycle
            )));
        }

        let registers = || {
            self.parameters
                .values()
                .chain(self.write_parameters.values().map(|w| &w.register))
        };
        let holding = BankPlan::for_category(registers(), RegisterCategory::Holding);
        let input = BankPlan::for_category(registers(), RegisterCategory::Input);

        self.holding.plan = holding;
        self.input.plan = input;
        self.holding.state.clear();
        self.input.state.clear();
        self.lifecycle = LifecycleState::BatchesReady;
        Ok(())
    }

    /// Compare the configured serial with the device's, when both are known
    async fn check_serial(&self) {
        let (Some(expected), Some(param)) =
            (self.identity.serial.as_deref(), self.family.serial_parameter())
        else {
            return;
        };

        match self.read_parameter(param).await {
            Ok(Value::Text(text)) => {
                let actual = text.trim_end_matches(['\0', ' ']);
                if actual != expected {
                    warn!(
                        device = %self.name(),
                        "Serial mismatch: configured {}, device reports {}",
                        expected, actual
                    );
                }
            },
            Ok(other) => warn!(device = %self.name(), "Unexpected serial value {}", other),
            Err(e) => warn!(device = %self.name(), "Could not read serial: {}", e),
        }
    }

    /// Forget the connection; the next [`Device::connect`] starts over
    pub fn mark_disconnected(&mut self) {
        self.lifecycle = LifecycleState::Unconnected;
    }
}
