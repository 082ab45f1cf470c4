//! Telemetry publisher
//!
//! Values leave the service through a [`TelemetryPublisher`]; inbound write
//! requests come back as [`WriteCommand`]s on an mpsc channel drained by the
//! poll driver.

pub mod discovery;
pub mod mqtt;

use async_trait::async_trait;

use crate::core::device::Device;
use crate::core::types::{Value, WriteKind, WriteParameter};
use crate::error::Result;

pub use mqtt::MqttPublisher;

/// Inbound write request, addressed by device name and parameter slug
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub device: String,
    pub slug: String,
    pub payload: String,
}

#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Describe a ready device to consumers and start accepting its commands
    async fn announce(&self, device: &Device) -> Result<()>;

    async fn publish_value(&self, device: &str, parameter: &str, value: &Value) -> Result<()>;

    async fn publish_availability(&self, device: &str, online: bool) -> Result<()>;

    /// Flush and disconnect
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Topic layout under one base topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
    discovery_prefix: String,
}

impl Topics {
    pub fn new(base: impl Into<String>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            discovery_prefix: discovery_prefix.into(),
        }
    }

    pub fn state(&self, device: &str, slug: &str) -> String {
        format!("{}/{}/{}/state", self.base, device, slug)
    }

    pub fn command(&self, device: &str, slug: &str) -> String {
        format!("{}/{}/{}/set", self.base, device, slug)
    }

    pub fn availability(&self, device: &str) -> String {
        format!("{}_{}/availability", self.base, device)
    }

    /// Service-wide availability, carried by the last will
    pub fn bridge_availability(&self) -> String {
        format!("{}/bridge/availability", self.base)
    }

    pub fn discovery(&self, component: &str, device: &str, slug: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.discovery_prefix, component, device, slug
        )
    }

    /// `(device, slug)` from a command topic
    pub fn parse_command(&self, topic: &str) -> Option<(String, String)> {
        let rest = topic
            .strip_prefix(self.base.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?;
        let (device, slug) = rest.split_once('/')?;
        if device.is_empty() || slug.is_empty() || slug.contains('/') {
            return None;
        }
        Some((device.to_string(), slug.to_string()))
    }
}

/// Map a command payload to the raw form the device accepts
///
/// Select labels become their option index; `ON`/`OFF` become the switch's
/// wire values. Anything else passes through unchanged.
pub fn command_payload(param: &WriteParameter, payload: &str) -> String {
    let payload = payload.trim();
    match &param.kind {
        WriteKind::Select { .. } => param
            .option_index(payload)
            .map(|index| index.to_string())
            .unwrap_or_else(|| payload.to_string()),
        WriteKind::Switch { on, off } => match payload.to_ascii_uppercase().as_str() {
            "ON" => on.to_string(),
            "OFF" => off.to_string(),
            _ => payload.to_string(),
        },
        WriteKind::Number { .. } => payload.to_string(),
    }
}

/// State payload for a value
pub fn state_payload(value: &Value) -> String {
    match value {
        Value::Text(text) => text.trim_end_matches('\0').to_string(),
        other => other.to_string(),
    }
}
