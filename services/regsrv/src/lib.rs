//! Register bridge service
//!
//! Polls Modbus field devices in batches, decodes their registers through
//! per-manufacturer profiles and republishes the values over MQTT. Write
//! commands travel the other way, back into holding registers.
//!
//! ## Layout
//!
//! - `core`: register model, codec, batch planner, device read/write and lifecycle
//! - `profiles`: register tables and codec quirks per device family
//! - `transport`: serialized Modbus TCP/RTU and simulated clients
//! - `publisher`: telemetry publisher trait and its MQTT implementation
//! - `runtime`: poll/command driver, retry policy, midnight window

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod core;
pub mod error;
pub mod profiles;
pub mod publisher;
pub mod runtime;
pub mod transport;

pub use config::RegSrvConfig;
pub use crate::core::{Device, DeviceIdentity, LifecycleState};
pub use error::{RegSrvError, Result};
pub use profiles::DeviceFamily;
pub use publisher::{MqttPublisher, TelemetryPublisher, WriteCommand};
pub use runtime::{PollDriver, PollSettings};
pub use transport::{RegisterTransport, SharedTransport};
