//! Service configuration
//!
//! Loaded from a YAML (or JSON/TOML) file and overlaid with `REGSRV_`
//! environment variables, e.g. `REGSRV_MQTT__HOST`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RegSrvError, Result};
use crate::profiles::DeviceFamily;
use crate::transport::ModbusEndpoint;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "REGSRV_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegSrvConfig {
    /// Field devices
    pub servers: Vec<ServerOptions>,

    /// Physical lines the devices sit on
    pub clients: Vec<ClientOptions>,

    /// Pause between poll cycles, in seconds
    #[serde(default = "default_pause_interval")]
    pub pause_interval_seconds: f64,

    /// Suspend polling around midnight
    #[serde(default)]
    pub sleep_over_midnight: bool,

    /// Minutes after midnight at which polling resumes
    #[serde(default = "default_midnight_minutes")]
    pub sleep_midnight_minutes: u32,

    /// Delay between a device's write and read publications, in milliseconds
    #[serde(default = "default_read_interval_ms")]
    pub read_interval_ms: u64,

    /// Bound for a single transport call, in milliseconds
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    pub mqtt: MqttSettings,
}

/// One field device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    pub name: String,
    #[serde(default)]
    pub serialnum: Option<String>,
    pub server_type: DeviceFamily,
    /// Name of the client (line) the device is wired to
    pub connected_client: String,
    pub modbus_id: u8,
}

/// One transport client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    pub name: String,
    #[serde(flatten)]
    pub kind: ClientKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientKind {
    Tcp {
        host: String,
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    Rtu {
        port: String,
        baudrate: u32,
        #[serde(default = "default_bytesize")]
        bytesize: u8,
        #[serde(default)]
        parity: bool,
        #[serde(default = "default_stopbits")]
        stopbits: u8,
    },
    /// In-memory registers, seeded with each device's identity
    Simulated,
}

impl ClientKind {
    /// Modbus endpoint, or `None` for simulated clients
    pub fn endpoint(&self) -> Option<ModbusEndpoint> {
        match self {
            ClientKind::Tcp { host, port } => Some(ModbusEndpoint::Tcp {
                host: host.clone(),
                port: *port,
            }),
            ClientKind::Rtu {
                port,
                baudrate,
                bytesize,
                parity,
                stopbits,
            } => Some(ModbusEndpoint::Rtu {
                port: port.clone(),
                baudrate: *baudrate,
                bytesize: *bytesize,
                parity: *parity,
                stopbits: *stopbits,
            }),
            ClientKind::Simulated => None,
        }
    }
}

/// MQTT broker and topic layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    /// Random when unset
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_pause_interval() -> f64 {
    10.0
}

fn default_midnight_minutes() -> u32 {
    5
}

fn default_read_interval_ms() -> u64 {
    4
}

fn default_transport_timeout_ms() -> u64 {
    3000
}

fn default_modbus_port() -> u16 {
    502
}

fn default_bytesize() -> u8 {
    8
}

fn default_stopbits() -> u8 {
    1
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_base_topic() -> String {
    "modbus".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

impl RegSrvConfig {
    /// Load from `path` with environment overrides, then validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = common::load_config_with_env(path.as_ref(), ENV_PREFIX)?;
        config.validate()?;
        info!(
            "Configuration loaded: {} servers on {} clients",
            config.servers.len(),
            config.clients.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut client_names = HashSet::new();
        for client in &self.clients {
            if client.name.is_empty() {
                return Err(RegSrvError::config("Client name must not be empty"));
            }
            if !client_names.insert(client.name.as_str()) {
                return Err(RegSrvError::config(format!(
                    "Duplicate client name: {}",
                    client.name
                )));
            }
            if let ClientKind::Rtu {
                bytesize, stopbits, ..
            } = &client.kind
            {
                if !(5..=8).contains(bytesize) {
                    return Err(RegSrvError::config(format!(
                        "Client {}: bytesize must be 5..=8, got {}",
                        client.name, bytesize
                    )));
                }
                if !matches!(stopbits, 1 | 2) {
                    return Err(RegSrvError::config(format!(
                        "Client {}: stopbits must be 1 or 2, got {}",
                        client.name, stopbits
                    )));
                }
            }
        }

        let mut server_names = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() || server.name.contains('/') {
                return Err(RegSrvError::config(format!(
                    "Invalid server name '{}'",
                    server.name
                )));
            }
            if !server_names.insert(server.name.as_str()) {
                return Err(RegSrvError::config(format!(
                    "Duplicate server name: {}",
                    server.name
                )));
            }
            if !client_names.contains(server.connected_client.as_str()) {
                return Err(RegSrvError::config(format!(
                    "Server {} references unknown client {}",
                    server.name, server.connected_client
                )));
            }
            if !(1..=247).contains(&server.modbus_id) {
                return Err(RegSrvError::config(format!(
                    "Server {}: modbus_id must be 1..=247, got {}",
                    server.name, server.modbus_id
                )));
            }
        }

        if !self.pause_interval_seconds.is_finite() || self.pause_interval_seconds < 0.0 {
            return Err(RegSrvError::config(format!(
                "pause_interval_seconds must be non-negative, got {}",
                self.pause_interval_seconds
            )));
        }
        if self.sleep_midnight_minutes > 59 {
            return Err(RegSrvError::config(format!(
                "sleep_midnight_minutes must be 0..=59, got {}",
                self.sleep_midnight_minutes
            )));
        }
        if self.transport_timeout_ms == 0 {
            return Err(RegSrvError::config("transport_timeout_ms must be positive"));
        }
        if self.mqtt.host.is_empty() {
            return Err(RegSrvError::config("mqtt.host must not be empty"));
        }

        Ok(())
    }

    pub fn pause_interval(&self) -> Duration {
        Duration::from_secs_f64(self.pause_interval_seconds)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }
}
