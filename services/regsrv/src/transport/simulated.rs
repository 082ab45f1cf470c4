//! In-memory simulated transport
//!
//! Register banks live behind a [`SimulatedBus`] handle that the owner keeps
//! after boxing the client, so tests can seed registers, script failures and
//! inspect writes while devices poll through the shared transport.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::types::RegisterCategory;
use crate::error::{RegSrvError, Result};
use crate::transport::RegisterTransport;

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub slave_id: u8,
    pub category: RegisterCategory,
    pub address: u16,
    pub words: Vec<u16>,
}

#[derive(Debug, Default)]
struct BusState {
    registers: HashMap<(u8, RegisterCategory, u16), u16>,
    connected: bool,
    fail_connect: bool,
    offline_slaves: HashSet<u8>,
    /// Read calls (1-based sequence numbers) that return an error
    failing_reads: HashSet<u64>,
    failing_writes: u32,
    read_calls: u64,
    write_calls: u64,
    writes: Vec<WriteRecord>,
}

/// Handle to the simulated register banks
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn set_register(&self, slave_id: u8, category: RegisterCategory, address: u16, word: u16) {
        self.state
            .lock()
            .registers
            .insert((slave_id, category, address), word);
    }

    pub fn set_registers(
        &self,
        slave_id: u8,
        category: RegisterCategory,
        start: u16,
        words: &[u16],
    ) {
        let mut state = self.state.lock();
        for (offset, word) in words.iter().enumerate() {
            let address = start.wrapping_add(offset as u16);
            state.registers.insert((slave_id, category, address), *word);
        }
    }

    /// Store `text` two characters per word, padded with NUL to `word_count`
    pub fn set_text(
        &self,
        slave_id: u8,
        category: RegisterCategory,
        start: u16,
        word_count: u16,
        text: &str,
    ) {
        let mut bytes: Vec<u8> = text.bytes().collect();
        bytes.resize(usize::from(word_count) * 2, 0);
        let words: Vec<u16> = bytes
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        self.set_registers(slave_id, category, start, &words);
    }

    /// Unset registers read as zero
    pub fn register(&self, slave_id: u8, category: RegisterCategory, address: u16) -> u16 {
        self.state
            .lock()
            .registers
            .get(&(slave_id, category, address))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Make every request to `slave_id` fail, as if the unit stopped answering
    pub fn set_offline(&self, slave_id: u8, offline: bool) {
        let mut state = self.state.lock();
        if offline {
            state.offline_slaves.insert(slave_id);
        } else {
            state.offline_slaves.remove(&slave_id);
        }
    }

    /// Fail the read call with sequence number `call` (1-based, counted over the bus lifetime)
    pub fn fail_read_call(&self, call: u64) {
        self.state.lock().failing_reads.insert(call);
    }

    /// Fail the next `count` write calls
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }

    pub fn read_calls(&self) -> u64 {
        self.state.lock().read_calls
    }

    pub fn write_calls(&self) -> u64 {
        self.state.lock().write_calls
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

/// Transport backed by a [`SimulatedBus`]
#[derive(Debug)]
pub struct SimulatedClient {
    name: String,
    bus: SimulatedBus,
}

impl SimulatedClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_bus(name, SimulatedBus::default())
    }

    pub fn with_bus(name: impl Into<String>, bus: SimulatedBus) -> Self {
        Self {
            name: name.into(),
            bus,
        }
    }

    pub fn bus(&self) -> SimulatedBus {
        self.bus.clone()
    }
}

#[async_trait]
impl RegisterTransport for SimulatedClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "simulated"
    }

    fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        let mut state = self.bus.state.lock();
        if state.fail_connect {
            warn!("[{}] Simulated connection failure", self.name);
            return Err(RegSrvError::connection(format!(
                "{}: simulated connection refused",
                self.name
            )));
        }
        state.connected = true;
        debug!("[{}] Simulated transport connected", self.name);
        Ok(())
    }

    async fn read(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<Vec<u16>> {
        let mut state = self.bus.state.lock();
        state.read_calls += 1;
        let call = state.read_calls;

        if !state.connected {
            return Err(RegSrvError::connection(format!("{}: not connected", self.name)));
        }
        if state.offline_slaves.contains(&slave_id) {
            return Err(RegSrvError::transport(format!(
                "slave {} did not respond",
                slave_id
            )));
        }
        if state.failing_reads.remove(&call) {
            return Err(RegSrvError::transport(format!(
                "simulated failure on read call {} ({} {} +{})",
                call, category, address, count
            )));
        }

        let words = (0..count)
            .map(|offset| {
                let addr = address.wrapping_add(offset);
                state
                    .registers
                    .get(&(slave_id, category, addr))
                    .copied()
                    .unwrap_or(0)
            })
            .collect();

        Ok(words)
    }

    async fn write(
        &mut self,
        words: &[u16],
        address: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<()> {
        let mut state = self.bus.state.lock();
        state.write_calls += 1;

        if !state.connected {
            return Err(RegSrvError::connection(format!("{}: not connected", self.name)));
        }
        if category == RegisterCategory::Input {
            return Err(RegSrvError::validation("input registers are read-only"));
        }
        if state.offline_slaves.contains(&slave_id) {
            return Err(RegSrvError::transport(format!(
                "slave {} did not respond",
                slave_id
            )));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(RegSrvError::transport(format!(
                "simulated failure writing {} at {}",
                category, address
            )));
        }

        for (offset, word) in words.iter().enumerate() {
            let addr = address.wrapping_add(offset as u16);
            state.registers.insert((slave_id, category, addr), *word);
        }
        state.writes.push(WriteRecord {
            slave_id,
            category,
            address,
            words: words.to_vec(),
        });

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.bus.state.lock().connected = false;
        debug!("[{}] Simulated transport closed", self.name);
        Ok(())
    }

    fn abandon(&mut self) {
        self.bus.state.lock().connected = false;
    }
}
