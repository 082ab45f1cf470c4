//! Poll/command driver
//!
//! One sequential loop owns every [`Device`]. Each cycle reads and publishes
//! the ready devices in configuration order; write commands arriving from the
//! publisher are applied between devices and while pausing between cycles, so
//! reads and writes on a device never overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RegSrvConfig;
use crate::core::device::Device;
use crate::publisher::{command_payload, TelemetryPublisher, WriteCommand};
use crate::runtime::midnight::midnight_sleep;
use crate::runtime::retry::{RetryHelper, RetryPolicy};
use crate::transport::SharedTransport;

/// Consecutive failed read cycles before a device is reconnected
pub const MAX_READ_FAILURES: u32 = 3;

/// Scheduling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    /// Wait between cycles
    pub pause_interval: Duration,
    /// Wait between a device's write-parameter and read-parameter publications
    pub read_interval: Duration,
    pub sleep_over_midnight: bool,
    pub sleep_midnight_minutes: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            pause_interval: Duration::from_secs(10),
            read_interval: Duration::from_millis(4),
            sleep_over_midnight: false,
            sleep_midnight_minutes: 5,
        }
    }
}

impl PollSettings {
    pub fn from_config(config: &RegSrvConfig) -> Self {
        Self {
            pause_interval: config.pause_interval(),
            read_interval: config.read_interval(),
            sleep_over_midnight: config.sleep_over_midnight,
            sleep_midnight_minutes: config.sleep_midnight_minutes,
        }
    }
}

struct DeviceSlot {
    device: Device,
    reconnect: RetryHelper,
    read_failures: u32,
}

/// Control loop over all configured devices
pub struct PollDriver {
    devices: Vec<DeviceSlot>,
    transports: Vec<SharedTransport>,
    publisher: Arc<dyn TelemetryPublisher>,
    commands: mpsc::Receiver<WriteCommand>,
    commands_open: bool,
    settings: PollSettings,
    /// Replaced by the token passed to [`PollDriver::run`]
    stop: CancellationToken,
}

impl PollDriver {
    /// `transports` are the distinct lines the devices share; they are closed on shutdown
    pub fn new(
        devices: Vec<Device>,
        transports: Vec<SharedTransport>,
        publisher: Arc<dyn TelemetryPublisher>,
        commands: mpsc::Receiver<WriteCommand>,
        settings: PollSettings,
    ) -> Self {
        let devices = devices
            .into_iter()
            .map(|device| DeviceSlot {
                device,
                reconnect: RetryHelper::new(RetryPolicy::default()),
                read_failures: 0,
            })
            .collect();

        Self {
            devices,
            transports,
            publisher,
            commands,
            commands_open: true,
            settings,
            stop: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().map(|slot| &slot.device)
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices().find(|device| device.name() == name)
    }

    /// Run the lifecycle for every device
    pub async fn connect_all(&mut self) {
        for index in 0..self.devices.len() {
            if self.stop.is_cancelled() {
                return;
            }
            self.connect_device(index).await;
        }
        let ready = self.devices.iter().filter(|s| s.device.is_ready()).count();
        info!("{}/{} devices ready", ready, self.devices.len());
    }

    async fn connect_device(&mut self, index: usize) {
        let slot = &mut self.devices[index];
        match slot.device.connect().await {
            Ok(()) => {
                slot.reconnect.record_success();
                slot.read_failures = 0;
                if let Err(e) = self.publisher.announce(&slot.device).await {
                    warn!(device = %slot.device.name(), "Announce failed: {}", e);
                }
            },
            Err(e) => {
                let delay = slot.reconnect.record_failure();
                if e.is_recoverable() {
                    warn!(
                        device = %slot.device.name(),
                        "Connect failed: {}; next attempt in {:?}", e, delay
                    );
                } else {
                    error!(
                        device = %slot.device.name(),
                        "Connect failed: {}; next attempt in {:?}", e, delay
                    );
                }
                if let Err(e) = self
                    .publisher
                    .publish_availability(slot.device.name(), false)
                    .await
                {
                    debug!("Could not publish availability: {}", e);
                }
            },
        }
    }

    /// One pass over every device; ends early once stopped
    pub async fn run_cycle(&mut self) {
        for index in 0..self.devices.len() {
            if self.stop.is_cancelled() {
                debug!("Cycle interrupted by stop");
                return;
            }
            self.drain_commands().await;
            self.poll_device(index).await;
        }
        self.drain_commands().await;
    }

    async fn poll_device(&mut self, index: usize) {
        if !self.devices[index].device.is_ready() {
            if !self.devices[index].reconnect.is_due(Instant::now()) {
                return;
            }
            self.connect_device(index).await;
            if !self.devices[index].device.is_ready() {
                return;
            }
        }

        let slot = &mut self.devices[index];
        if let Err(e) = slot.device.read_batches().await {
            slot.read_failures += 1;
            warn!(
                device = %slot.device.name(),
                "Read cycle failed ({}/{}): {}", slot.read_failures, MAX_READ_FAILURES, e
            );
            if slot.read_failures >= MAX_READ_FAILURES || !e.is_recoverable() {
                slot.device.mark_disconnected();
                slot.reconnect.record_failure();
                if let Err(e) = self
                    .publisher
                    .publish_availability(slot.device.name(), false)
                    .await
                {
                    debug!("Could not publish availability: {}", e);
                }
            }
            return;
        }
        slot.read_failures = 0;

        let device = &self.devices[index].device;
        let published = self
            .publish_values(device, device.write_parameters().keys())
            .await;
        debug!(device = %device.name(), "Published {} write parameter values", published);

        tokio::time::sleep(self.settings.read_interval).await;

        let published = self.publish_values(device, device.parameters().keys()).await;
        info!(device = %device.name(), "Published {} parameter values", published);
    }

    async fn publish_values<'a, I>(&self, device: &Device, names: I) -> usize
    where
        I: Iterator<Item = &'a String>,
    {
        let mut published = 0;
        for name in names {
            if self.stop.is_cancelled() {
                break;
            }
            let value = match device.read_from_state(name) {
                Ok(value) => value,
                Err(e) => {
                    warn!(device = %device.name(), "Skipping '{}': {}", name, e);
                    continue;
                },
            };
            match self.publisher.publish_value(device.name(), name, &value).await {
                Ok(()) => published += 1,
                Err(e) => warn!(device = %device.name(), "Publish of '{}' failed: {}", name, e),
            }
        }
        published
    }

    async fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command).await;
        }
    }

    /// Route one inbound command to its device and publish the read-back
    pub async fn apply_command(&mut self, command: WriteCommand) {
        let Some(device) = self.device(&command.device) else {
            warn!("Command for unknown device {}", command.device);
            return;
        };
        let Some(name) = device.resolve_write_slug(&command.slug) else {
            warn!(device = %device.name(), "Command for unknown write parameter {}", command.slug);
            return;
        };
        let Some(param) = device.write_parameters().get(name) else {
            return;
        };
        let raw = command_payload(param, &command.payload);

        match device.write_registers(name, &raw).await {
            Ok(Some(value)) => {
                if let Err(e) = self.publisher.publish_value(device.name(), name, &value).await {
                    warn!(device = %device.name(), "Publish of '{}' failed: {}", name, e);
                }
            },
            Ok(None) => {},
            Err(e) => warn!(
                device = %device.name(),
                "Rejected command {} = {}: {}", command.slug, command.payload, e
            ),
        }
    }

    /// Wait out the pause interval, applying commands as they arrive
    ///
    /// Returns `false` when `stop` fires.
    async fn pause(&mut self, stop: &CancellationToken) -> bool {
        let deadline = tokio::time::Instant::now() + self.settings.pause_interval;
        loop {
            tokio::select! {
                _ = stop.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => return true,
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.apply_command(command).await,
                    None => {
                        debug!("Command channel closed");
                        self.commands_open = false;
                    },
                },
            }
        }
    }

    /// Sleep through the midnight window when enabled; `false` when `stop` fires
    async fn sleep_over_midnight(&self, stop: &CancellationToken) -> bool {
        if !self.settings.sleep_over_midnight {
            return true;
        }
        while let Some(nap) = midnight_sleep(
            chrono::Local::now().time(),
            self.settings.sleep_midnight_minutes,
        ) {
            info!("Sleeping over midnight for {:?}", nap);
            tokio::select! {
                _ = stop.cancelled() => return false,
                _ = tokio::time::sleep(nap) => {},
            }
        }
        true
    }

    /// Connect, then poll until `stop` fires, then shut down
    pub async fn run(mut self, stop: CancellationToken) {
        self.stop = stop.clone();
        if self.sleep_over_midnight(&stop).await {
            self.connect_all().await;
            loop {
                self.run_cycle().await;
                if !self.pause(&stop).await || !self.sleep_over_midnight(&stop).await {
                    break;
                }
            }
        }
        info!("Stop requested");
        self.shutdown().await;
    }

    /// Publish every device offline, then close transports and the publisher
    pub async fn shutdown(&mut self) {
        for slot in &mut self.devices {
            slot.device.mark_disconnected();
            if let Err(e) = self
                .publisher
                .publish_availability(slot.device.name(), false)
                .await
            {
                warn!(device = %slot.device.name(), "Could not publish offline: {}", e);
            }
        }
        for transport in &self.transports {
            if let Err(e) = transport.close().await {
                warn!("Closing {} failed: {}", transport.name(), e);
            }
        }
        if let Err(e) = self.publisher.close().await {
            warn!("Closing publisher failed: {}", e);
        }
        info!("Shutdown complete");
    }
}
