//! Modbus TCP/RTU transport built on tokio-modbus
//!
//! One client per physical line. The slave id is selected per request so that
//! several devices can share a line.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::core::types::RegisterCategory;
use crate::error::{RegSrvError, Result};
use crate::transport::RegisterTransport;

/// Where a Modbus client connects
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusEndpoint {
    Tcp {
        host: String,
        port: u16,
    },
    Rtu {
        port: String,
        baudrate: u32,
        bytesize: u8,
        /// Even parity when set, none otherwise
        parity: bool,
        stopbits: u8,
    },
}

impl std::fmt::Display for ModbusEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModbusEndpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            ModbusEndpoint::Rtu { port, baudrate, .. } => write!(f, "rtu://{}@{}", port, baudrate),
        }
    }
}

fn data_bits(bytesize: u8) -> Result<DataBits> {
    match bytesize {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(RegSrvError::config(format!("Invalid bytesize {}", other))),
    }
}

fn stop_bits(stopbits: u8) -> Result<StopBits> {
    match stopbits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(RegSrvError::config(format!("Invalid stopbits {}", other))),
    }
}

/// Modbus client for one TCP endpoint or serial line
#[derive(Debug)]
pub struct ModbusClient {
    name: String,
    endpoint: ModbusEndpoint,
    context: Option<Context>,
}

impl ModbusClient {
    pub fn new(name: impl Into<String>, endpoint: ModbusEndpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            context: None,
        }
    }

    pub fn endpoint(&self) -> &ModbusEndpoint {
        &self.endpoint
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| RegSrvError::connection(format!("Cannot resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| RegSrvError::connection(format!("No address for {}:{}", host, port)))
    }

    fn context(&mut self, slave_id: u8) -> Result<&mut Context> {
        let name = &self.name;
        let ctx = self
            .context
            .as_mut()
            .ok_or_else(|| RegSrvError::connection(format!("{}: not connected", name)))?;
        ctx.set_slave(Slave(slave_id));
        Ok(ctx)
    }

    /// Map an IO failure; connection-level kinds drop the context so the next
    /// connect starts fresh
    fn io_failure(&mut self, op: &str, err: std::io::Error) -> RegSrvError {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => {
                warn!("[{}] Connection lost during {}: {}", self.name, op, err);
                self.context = None;
                RegSrvError::connection(format!("{}: {}", op, err))
            },
            _ => RegSrvError::transport(format!("{}: {}", op, err)),
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        match self.endpoint {
            ModbusEndpoint::Tcp { .. } => "tcp",
            ModbusEndpoint::Rtu { .. } => "rtu",
        }
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let context = match &self.endpoint {
            ModbusEndpoint::Tcp { host, port } => {
                let addr = Self::resolve(host, *port).await?;
                debug!("[{}] Connecting to Modbus TCP server at {}", self.name, addr);
                tcp::connect(addr)
                    .await
                    .map_err(|e| RegSrvError::connection(format!("{}: {}", addr, e)))?
            },
            ModbusEndpoint::Rtu {
                port,
                baudrate,
                bytesize,
                parity,
                stopbits,
            } => {
                let builder = tokio_serial::new(port.as_str(), *baudrate)
                    .data_bits(data_bits(*bytesize)?)
                    .parity(if *parity { Parity::Even } else { Parity::None })
                    .stop_bits(stop_bits(*stopbits)?);
                let stream = SerialStream::open(&builder)
                    .map_err(|e| RegSrvError::connection(format!("{}: {}", port, e)))?;
                rtu::attach_slave(stream, Slave::broadcast())
            },
        };

        info!("[{}] Connected to {}", self.name, self.endpoint);
        self.context = Some(context);
        Ok(())
    }

    async fn read(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<Vec<u16>> {
        let ctx = self.context(slave_id)?;
        let result = match category {
            RegisterCategory::Holding => ctx.read_holding_registers(address, count).await,
            RegisterCategory::Input => ctx.read_input_registers(address, count).await,
        };

        result.map_err(|e| {
            self.io_failure(
                &format!(
                    "read {} {} +{} slave {}",
                    category, address, count, slave_id
                ),
                e,
            )
        })
    }

    async fn write(
        &mut self,
        words: &[u16],
        address: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<()> {
        if category == RegisterCategory::Input {
            return Err(RegSrvError::validation("input registers are read-only"));
        }

        let ctx = self.context(slave_id)?;
        let result = match words {
            [] => return Ok(()),
            [word] => ctx.write_single_register(address, *word).await,
            _ => ctx.write_multiple_registers(address, words).await,
        };

        result.map_err(|e| self.io_failure(&format!("write {} slave {}", address, slave_id), e))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut ctx) = self.context.take() {
            ctx.disconnect().await?;
            info!("[{}] Disconnected from {}", self.name, self.endpoint);
        }
        Ok(())
    }

    fn abandon(&mut self) {
        if self.context.take().is_some() {
            warn!("[{}] Dropped connection to {}", self.name, self.endpoint);
        }
    }
}
