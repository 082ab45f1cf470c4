//! Common test utilities and helpers

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use regsrv::core::types::Value;
use regsrv::transport::{SharedTransport, SimulatedBus, SimulatedClient, DEFAULT_TRANSPORT_TIMEOUT};
use regsrv::{Device, DeviceFamily, DeviceIdentity, Result, TelemetryPublisher};

/// One simulated line and the handle to its registers
pub fn simulated_line(name: &str) -> (SharedTransport, SimulatedBus) {
    let client = SimulatedClient::new(name);
    let bus = client.bus();
    (
        SharedTransport::new(Box::new(client), DEFAULT_TRANSPORT_TIMEOUT),
        bus,
    )
}

/// Unconnected device on `transport`, seeded with its family's identity registers
pub fn seeded_device(
    name: &str,
    family: DeviceFamily,
    slave_id: u8,
    transport: &SharedTransport,
    bus: &SimulatedBus,
) -> Device {
    family.seed_simulation(bus, slave_id);
    Device::new(
        DeviceIdentity::new(name, slave_id),
        family,
        transport.clone(),
    )
}

#[derive(Debug, Default)]
struct Recorded {
    announced: Vec<String>,
    values: Vec<(String, String, Value)>,
    availability: Vec<(String, bool)>,
    closed: bool,
}

/// Publisher that records everything it is asked to send
#[derive(Debug, Default, Clone)]
pub struct RecordingPublisher {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingPublisher {
    pub fn announced(&self) -> Vec<String> {
        self.inner.lock().announced.clone()
    }

    pub fn values(&self) -> Vec<(String, String, Value)> {
        self.inner.lock().values.clone()
    }

    /// Most recent value published for `device`/`parameter`
    pub fn last_value(&self, device: &str, parameter: &str) -> Option<Value> {
        self.inner
            .lock()
            .values
            .iter()
            .rev()
            .find(|(d, p, _)| d == device && p == parameter)
            .map(|(_, _, v)| v.clone())
    }

    pub fn availability(&self) -> Vec<(String, bool)> {
        self.inner.lock().availability.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    async fn announce(&self, device: &Device) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.announced.push(device.name().to_string());
        inner.availability.push((device.name().to_string(), true));
        Ok(())
    }

    async fn publish_value(&self, device: &str, parameter: &str, value: &Value) -> Result<()> {
        self.inner
            .lock()
            .values
            .push((device.to_string(), parameter.to_string(), value.clone()));
        Ok(())
    }

    async fn publish_availability(&self, device: &str, online: bool) -> Result<()> {
        self.inner
            .lock()
            .availability
            .push((device.to_string(), online));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}
