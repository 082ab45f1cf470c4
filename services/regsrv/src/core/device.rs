//! Device read/write orchestration
//!
//! A [`Device`] owns its parameter tables and the raw state buffers of both
//! register banks. Reads are planned once per connection (see
//! [`crate::core::lifecycle`]) and then refreshed wholesale, batch by batch,
//! on every poll cycle.

use tracing::{debug, error, info, warn};

use crate::core::lifecycle::LifecycleState;
use crate::core::planner::BankPlan;
use crate::core::slug::slugify;
use crate::core::types::{
    Parameter, ParameterMap, RegisterCategory, Value, WriteKind, WriteParameterMap,
};
use crate::error::{RegSrvError, Result};
use crate::profiles::DeviceFamily;
use crate::runtime::retry::{RetryError, RetryHelper, RetryPolicy};
use crate::transport::SharedTransport;

/// Attempts for one register write before it is given up
pub const WRITE_ATTEMPTS: u32 = 3;

/// Who a device is on its line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Unique within a run
    pub name: String,
    /// Expected serial number, if configured
    pub serial: Option<String>,
    pub slave_id: u8,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, slave_id: u8) -> Self {
        Self {
            name: name.into(),
            serial: None,
            slave_id,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }
}

/// Read plan and last committed raw words for one register bank
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    pub(crate) plan: BankPlan,
    pub(crate) state: Vec<u16>,
}

impl RegisterBank {
    pub fn plan(&self) -> &BankPlan {
        &self.plan
    }

    /// Raw words for `[extent.min, extent.max]`; empty before the first read
    pub fn state(&self) -> &[u16] {
        &self.state
    }
}

/// A field unit behind a shared transport
#[derive(Debug)]
pub struct Device {
    pub(crate) identity: DeviceIdentity,
    pub(crate) family: DeviceFamily,
    pub(crate) model: Option<String>,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) parameters: ParameterMap,
    pub(crate) write_parameters: WriteParameterMap,
    pub(crate) holding: RegisterBank,
    pub(crate) input: RegisterBank,
    pub(crate) transport: SharedTransport,
}

/// Integer literal with optional sign and `0x`/`0o`/`0b` prefix
pub fn parse_int_literal(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let lower = body.to_ascii_lowercase();
    let (radix, digits) = if let Some(d) = lower.strip_prefix("0x") {
        (16, d)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (8, d)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (2, d)
    } else {
        (10, lower.as_str())
    };

    let digits = digits.replace('_', "");
    let magnitude = i64::from_str_radix(&digits, radix)
        .map_err(|e| RegSrvError::validation(format!("invalid integer '{}': {}", raw, e)))?;

    Ok(if negative { -magnitude } else { magnitude })
}

impl Device {
    /// Device with the family's default parameter tables, not yet connected
    pub fn new(identity: DeviceIdentity, family: DeviceFamily, transport: SharedTransport) -> Self {
        Self {
            identity,
            family,
            model: None,
            lifecycle: LifecycleState::Unconnected,
            parameters: family.default_parameters(),
            write_parameters: family.default_write_parameters(),
            holding: RegisterBank::default(),
            input: RegisterBank::default(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn slave_id(&self) -> u8 {
        self.identity.slave_id
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    pub fn write_parameters(&self) -> &WriteParameterMap {
        &self.write_parameters
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn bank(&self, category: RegisterCategory) -> &RegisterBank {
        match category {
            RegisterCategory::Holding => &self.holding,
            RegisterCategory::Input => &self.input,
        }
    }

    /// Read parameters first, then the register of a write parameter
    fn lookup(&self, name: &str) -> Result<&Parameter> {
        self.parameters
            .get(name)
            .or_else(|| self.write_parameters.get(name).map(|w| &w.register))
            .ok_or_else(|| {
                RegSrvError::not_found(format!("{}: unknown parameter '{}'", self.name(), name))
            })
    }

    /// Write parameter name for a command slug
    pub fn resolve_write_slug(&self, slug: &str) -> Option<&str> {
        self.write_parameters
            .keys()
            .find(|name| slugify(name) == slug)
            .map(String::as_str)
    }

    fn require_ready(&self, op: &str) -> Result<()> {
        if !self.lifecycle.is_ready() {
            return Err(RegSrvError::state(format!(
                "{}: {} requires {}, device is {}",
                self.name(),
                op,
                LifecycleState::BatchesReady,
                self.lifecycle
            )));
        }
        Ok(())
    }

    /// Decode with the family codec, then scale and round when scale is not 1
    fn present(&self, param: &Parameter, words: &[u16]) -> Result<Value> {
        let value = self.family.decode(words, param.data_type)?;
        if param.scale == 1.0 {
            return Ok(value);
        }
        Ok(value.scaled(param.scale, param.rounding_digits()))
    }

    /// One read of the probe parameter; any failure means unavailable
    pub async fn is_available(&self, probe: Option<&str>) -> bool {
        let probe = probe.unwrap_or_else(|| self.family.probe_parameter());
        let param = match self.lookup(probe) {
            Ok(param) => param,
            Err(e) => {
                warn!(device = %self.name(), "Availability probe skipped: {}", e);
                return false;
            },
        };

        match self
            .transport
            .read(param.address, param.word_count, self.slave_id(), param.category)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(device = %self.name(), "Probe '{}' failed: {}", probe, e);
                false
            },
        }
    }

    /// Refresh both state buffers, Holding then Input
    ///
    /// Any failing batch aborts the cycle; nothing is committed unless every
    /// batch of both banks succeeded.
    pub async fn read_batches(&mut self) -> Result<()> {
        self.require_ready("read_batches")?;

        let mut fresh: [Vec<u16>; 2] = [Vec::new(), Vec::new()];
        for (slot, category) in RegisterCategory::ALL.into_iter().enumerate() {
            let plan = &self.bank(category).plan;
            let Some(extent) = plan.extent else {
                continue;
            };

            let buffer = &mut fresh[slot];
            buffer.reserve(extent.width());
            for batch in &plan.batches {
                let words = self
                    .transport
                    .read(batch.start, batch.count, self.slave_id(), category)
                    .await
                    .map_err(|e| RegSrvError::BatchReadError {
                        category,
                        start: batch.start,
                        count: batch.count,
                        reason: e.to_string(),
                    })?;
                buffer.extend_from_slice(&words);
            }
        }

        let [holding, input] = fresh;
        self.holding.state = holding;
        self.input.state = input;
        debug!(
            device = %self.name(),
            "Read cycle committed ({} holding, {} input words)",
            self.holding.state.len(),
            self.input.state.len()
        );
        Ok(())
    }

    /// Value of a parameter from the last committed read cycle
    pub fn read_from_state(&self, name: &str) -> Result<Value> {
        let param = self.lookup(name)?;
        let bank = self.bank(param.category);
        let words = bank
            .plan
            .extent
            .and_then(|extent| extent.window(param))
            .and_then(|window| bank.state.get(window))
            .ok_or_else(|| {
                RegSrvError::index(format!(
                    "{}: '{}' ({} {} +{}) is outside the {} state buffer",
                    self.name(),
                    name,
                    param.category,
                    param.address,
                    param.word_count,
                    bank.state.len()
                ))
            })?;

        self.present(param, words)
    }

    /// Value of a parameter read straight from the device, bypassing state
    pub async fn read_parameter(&self, name: &str) -> Result<Value> {
        let param = self.lookup(name)?;
        let words = self
            .transport
            .read(param.address, param.word_count, self.slave_id(), param.category)
            .await?;
        self.present(param, &words)
    }

    /// Model name from the family's model parameter
    ///
    /// Transport failures keep their kind; anything undecodable is a model error.
    pub async fn read_model(&self) -> Result<String> {
        let value = self
            .read_parameter(self.family.model_parameter())
            .await
            .map_err(|e| match e {
                RegSrvError::NotImplemented(_) | RegSrvError::IndexError(_) => {
                    RegSrvError::model(e.to_string())
                },
                other => other,
            })?;
        self.family.model_from_value(&value)
    }

    /// Parse, validate and encode a write payload
    fn encode_write(&self, name: &str, raw: &str) -> Result<(Parameter, Vec<u16>)> {
        let write = self.write_parameters.get(name).ok_or_else(|| {
            RegSrvError::not_found(format!("{}: unknown write parameter '{}'", self.name(), name))
        })?;
        let register = &write.register;

        let value = match &write.kind {
            WriteKind::Switch { on, off } => {
                let v = parse_int_literal(raw)?;
                if v != i64::from(*on) && v != i64::from(*off) {
                    return Err(RegSrvError::validation(format!(
                        "'{}' accepts {} or {}, got {}",
                        name, on, off, v
                    )));
                }
                v as f64
            },
            WriteKind::Number { min, max } => {
                let v: f64 = raw.trim().parse().map_err(|e| {
                    RegSrvError::validation(format!("invalid number '{}': {}", raw, e))
                })?;
                if !(*min..=*max).contains(&v) {
                    return Err(RegSrvError::range(format!(
                        "'{}' must be within [{}, {}], got {}",
                        name, min, max, v
                    )));
                }
                // snap float error (0.3 / 0.1) before the codec truncates
                ((v / register.scale) * 1e6).round() / 1e6
            },
            WriteKind::Select { options } => {
                let index: usize = raw.trim().parse().map_err(|e| {
                    RegSrvError::validation(format!("invalid option index '{}': {}", raw, e))
                })?;
                if index >= options.len() {
                    return Err(RegSrvError::validation(format!(
                        "'{}' has {} options, got index {}",
                        name,
                        options.len(),
                        index
                    )));
                }
                index as f64
            },
        };

        let words = self.family.encode(value, register.data_type)?;
        Ok((register.clone(), words))
    }

    /// Write a raw command payload to a write parameter
    ///
    /// Payload, validation and encode errors are returned. Transport failures
    /// are retried; after the last attempt the failure is logged and
    /// `Ok(None)` is returned. On success the parameter is read back directly
    /// and its value returned, or `Ok(None)` if that read fails.
    pub async fn write_registers(&self, name: &str, raw: &str) -> Result<Option<Value>> {
        self.require_ready("write_registers")?;
        let (register, words) = self.encode_write(name, raw)?;

        let mut retry = RetryHelper::new(RetryPolicy::immediate(WRITE_ATTEMPTS));
        let outcome = retry
            .execute(|| {
                self.transport
                    .write(&words, register.address, self.slave_id(), register.category)
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(
                    device = %self.name(),
                    "Wrote '{}' = {} ({:?} at {})",
                    name, raw, words, register.address
                );
                match self.read_parameter(name).await {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!(device = %self.name(), "Read-back of '{}' failed: {}", name, e);
                        Ok(None)
                    },
                }
            },
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    device = %self.name(),
                    "Failure to write after {} attempts: '{}' = {}: {}",
                    attempts, name, raw, last
                );
                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SimulatedBus, SimulatedClient, DEFAULT_TRANSPORT_TIMEOUT};
    use tracing_test::traced_test;

    #[test]
    fn test_parse_int_literal() {
        assert_eq!(parse_int_literal("1").unwrap(), 1);
        assert_eq!(parse_int_literal(" 0x1F ").unwrap(), 31);
        assert_eq!(parse_int_literal("0b101").unwrap(), 5);
        assert_eq!(parse_int_literal("0o17").unwrap(), 15);
        assert_eq!(parse_int_literal("-12").unwrap(), -12);
        assert_eq!(parse_int_literal("1_000").unwrap(), 1000);
        assert!(matches!(
            parse_int_literal("on"),
            Err(RegSrvError::ValidationError(_))
        ));
        assert!(parse_int_literal("1.5").is_err());
    }

    async fn ready_atess() -> (Device, SimulatedBus) {
        let client = SimulatedClient::new("line0");
        let bus = client.bus();
        DeviceFamily::Atess.seed_simulation(&bus, 1);
        let transport = SharedTransport::new(Box::new(client), DEFAULT_TRANSPORT_TIMEOUT);
        let mut device = Device::new(DeviceIdentity::new("ATESS1", 1), DeviceFamily::Atess, transport);
        device.connect().await.unwrap();
        (device, bus)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_write_exhaustion_is_logged_not_raised() {
        let (device, bus) = ready_atess().await;
        let parameters = device.parameters().clone();
        let write_parameters = device.write_parameters().clone();
        let calls_before = bus.write_calls();

        bus.fail_next_writes(WRITE_ATTEMPTS);
        let outcome = device.write_registers("Generator Start SOC", "40").await;

        assert_eq!(outcome, Ok(None));
        assert_eq!(bus.write_calls() - calls_before, u64::from(WRITE_ATTEMPTS));
        assert!(bus.writes().is_empty());
        assert_eq!(device.parameters(), &parameters);
        assert_eq!(device.write_parameters(), &write_parameters);
        assert!(logs_contain("Failure to write after 3 attempts"));
    }

    #[tokio::test]
    async fn test_write_recovers_within_attempts() {
        let (device, bus) = ready_atess().await;
        bus.fail_next_writes(2);

        let outcome = device.write_registers("Generator Start SOC", "40").await;
        assert_eq!(outcome, Ok(Some(Value::Int(40))));
        assert_eq!(bus.register(1, RegisterCategory::Holding, 67), 40);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_read_back_keeps_the_write() {
        let (device, bus) = ready_atess().await;
        bus.fail_read_call(bus.read_calls() + 1);

        let outcome = device.write_registers("Generator Start SOC", "40").await;
        assert_eq!(outcome, Ok(None));
        assert_eq!(bus.register(1, RegisterCategory::Holding, 67), 40);
        assert!(logs_contain("Read-back of 'Generator Start SOC' failed"));
    }

    #[tokio::test]
    async fn test_write_requires_ready() {
        let transport = SharedTransport::new(
            Box::new(SimulatedClient::new("line0")),
            DEFAULT_TRANSPORT_TIMEOUT,
        );
        let device = Device::new(DeviceIdentity::new("ATESS1", 1), DeviceFamily::Atess, transport);
        assert!(matches!(
            device.write_registers("Generator Start SOC", "40").await,
            Err(RegSrvError::StateError(_))
        ));
    }

    #[test]
    fn test_identity_builder() {
        let identity = DeviceIdentity::new("ATESS1", 1).with_serial("AT2023");
        assert_eq!(identity.serial.as_deref(), Some("AT2023"));
        assert_eq!(identity.slave_id, 1);
    }
}
