//! Wiring from configuration to devices and their shared transports

use std::collections::HashMap;

use tracing::info;

use crate::config::RegSrvConfig;
use crate::core::device::{Device, DeviceIdentity};
use crate::error::{RegSrvError, Result};
use crate::transport::{ModbusClient, SharedTransport, SimulatedBus, SimulatedClient};

/// Devices in configuration order, plus one transport per client
pub struct Assembly {
    pub devices: Vec<Device>,
    pub transports: Vec<SharedTransport>,
}

/// Build a transport for every client and a device for every server
///
/// Simulated clients are seeded so that each device on them identifies as
/// its family's first supported model.
pub fn assemble(config: &RegSrvConfig) -> Result<Assembly> {
    let timeout = config.transport_timeout();
    let mut by_name: HashMap<&str, (SharedTransport, Option<SimulatedBus>)> = HashMap::new();
    let mut transports = Vec::with_capacity(config.clients.len());

    for client in &config.clients {
        let (transport, bus) = match client.kind.endpoint() {
            Some(endpoint) => {
                info!("Client {}: {:?}", client.name, endpoint);
                let transport = SharedTransport::new(
                    Box::new(ModbusClient::new(client.name.clone(), endpoint)),
                    timeout,
                );
                (transport, None)
            },
            None => {
                info!("Client {}: simulated", client.name);
                let simulated = SimulatedClient::new(client.name.clone());
                let bus = simulated.bus();
                (SharedTransport::new(Box::new(simulated), timeout), Some(bus))
            },
        };
        transports.push(transport.clone());
        by_name.insert(client.name.as_str(), (transport, bus));
    }

    let mut devices = Vec::with_capacity(config.servers.len());
    for server in &config.servers {
        let (transport, bus) = by_name.get(server.connected_client.as_str()).ok_or_else(|| {
            RegSrvError::config(format!(
                "Server {} references unknown client {}",
                server.name, server.connected_client
            ))
        })?;
        if let Some(bus) = bus {
            server.server_type.seed_simulation(bus, server.modbus_id);
        }

        let mut identity = DeviceIdentity::new(server.name.clone(), server.modbus_id);
        if let Some(serial) = &server.serialnum {
            identity = identity.with_serial(serial.clone());
        }
        devices.push(Device::new(identity, server.server_type, transport.clone()));
    }

    info!(
        "Assembled {} devices on {} clients",
        devices.len(),
        transports.len()
    );
    Ok(Assembly {
        devices,
        transports,
    })
}
