//! Transport clients
//!
//! A transport reads and writes contiguous register ranges for a slave id on
//! one physical line. Every device on that line shares one [`SharedTransport`],
//! which serializes request/response pairs and bounds each call with a timeout.
//! A call that times out takes the connection down with it, so a late reply can
//! never be taken for the answer to the next request; the next call reopens.

pub mod modbus;
pub mod simulated;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::types::RegisterCategory;
use crate::error::{RegSrvError, Result};

pub use modbus::{ModbusClient, ModbusEndpoint};
pub use simulated::{SimulatedBus, SimulatedClient};

/// Default bound for one transport call
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Wire-level register access for one line
///
/// Addresses are passed through exactly as stored in the device profiles.
#[async_trait]
pub trait RegisterTransport: Send + fmt::Debug {
    /// Configured client name
    fn name(&self) -> &str;

    /// Transport kind, for logging ("tcp", "rtu", "simulated")
    fn transport_type(&self) -> &str;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<()>;

    async fn read(
        &mut self,
        address: u16,
        count: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<Vec<u16>>;

    async fn write(
        &mut self,
        words: &[u16],
        address: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Drop the connection without any I/O, discarding whatever is in flight
    fn abandon(&mut self);
}

/// Serialized, time-bounded handle to a transport shared by several devices
#[derive(Clone)]
pub struct SharedTransport {
    name: Arc<str>,
    inner: Arc<Mutex<Box<dyn RegisterTransport>>>,
    timeout: Duration,
}

impl fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransport")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RegSrvError::timeout(format!(
            "{} did not complete within {:?}",
            what, timeout
        ))),
    }
}

impl SharedTransport {
    pub fn new(transport: Box<dyn RegisterTransport>, timeout: Duration) -> Self {
        let name: Arc<str> = Arc::from(transport.name());
        Self {
            name,
            inner: Arc::new(Mutex::new(transport)),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect unless already connected
    pub async fn connect(&self) -> Result<()> {
        let mut transport = self.inner.lock().await;
        self.ensure_open(&mut **transport).await
    }

    async fn ensure_open(&self, transport: &mut (dyn RegisterTransport + 'static)) -> Result<()> {
        if transport.is_connected() {
            return Ok(());
        }
        debug!("Connecting transport {} ({})", self.name, transport.transport_type());
        let result = bounded(self.timeout, "connect", transport.connect()).await;
        match result {
            Err(RegSrvError::TimeoutError(msg)) => {
                transport.abandon();
                Err(RegSrvError::connection(msg))
            },
            other => other,
        }
    }

    /// Timed-out calls leave the line in an unknown state
    fn settle<T>(
        &self,
        transport: &mut (dyn RegisterTransport + 'static),
        result: Result<T>,
    ) -> Result<T> {
        if let Err(RegSrvError::TimeoutError(_)) = &result {
            warn!("Transport {} timed out; dropping the connection", self.name);
            transport.abandon();
        }
        result
    }

    /// Read `count` words; a response of any other length is an error
    pub async fn read(
        &self,
        address: u16,
        count: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<Vec<u16>> {
        let mut transport = self.inner.lock().await;
        self.ensure_open(&mut **transport).await?;
        let result = bounded(
            self.timeout,
            "read",
            transport.read(address, count, slave_id, category),
        )
        .await;
        let words = self.settle(&mut **transport, result)?;

        if words.len() != usize::from(count) {
            warn!(
                "Transport {} returned {} words for a {}-word {} read at {}",
                self.name,
                words.len(),
                count,
                category,
                address
            );
            return Err(RegSrvError::transport(format!(
                "expected {} words at {}, got {}",
                count,
                address,
                words.len()
            )));
        }

        Ok(words)
    }

    pub async fn write(
        &self,
        words: &[u16],
        address: u16,
        slave_id: u8,
        category: RegisterCategory,
    ) -> Result<()> {
        let mut transport = self.inner.lock().await;
        self.ensure_open(&mut **transport).await?;
        let result = bounded(
            self.timeout,
            "write",
            transport.write(words, address, slave_id, category),
        )
        .await;
        self.settle(&mut **transport, result)
    }

    pub async fn close(&self) -> Result<()> {
        let mut transport = self.inner.lock().await;
        let result = bounded(self.timeout, "close", transport.close()).await;
        self.settle(&mut **transport, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    #[derive(Debug)]
    struct StallingTransport;

    #[async_trait]
    impl RegisterTransport for StallingTransport {
        fn name(&self) -> &str {
            "stalling"
        }

        fn transport_type(&self) -> &str {
            "test"
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn read(
            &mut self,
            _address: u16,
            _count: u16,
            _slave_id: u8,
            _category: RegisterCategory,
        ) -> Result<Vec<u16>> {
            std::future::pending().await
        }

        async fn write(
            &mut self,
            _words: &[u16],
            _address: u16,
            _slave_id: u8,
            _category: RegisterCategory,
        ) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn abandon(&mut self) {}
    }

    /// Answers the first read only after `delay`, tagging replies with the
    /// connection they arrived on
    #[derive(Debug)]
    struct LateTransport {
        delay: Duration,
        connected: bool,
        connects: Arc<AtomicU16>,
        reads: u16,
    }

    #[async_trait]
    impl RegisterTransport for LateTransport {
        fn name(&self) -> &str {
            "late"
        }

        fn transport_type(&self) -> &str {
            "test"
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> Result<()> {
            self.connected = true;
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read(
            &mut self,
            _address: u16,
            count: u16,
            _slave_id: u8,
            _category: RegisterCategory,
        ) -> Result<Vec<u16>> {
            self.reads += 1;
            if self.reads == 1 {
                tokio::time::sleep(self.delay).await;
            }
            let connection = self.connects.load(Ordering::SeqCst);
            Ok(vec![connection; usize::from(count)])
        }

        async fn write(
            &mut self,
            _words: &[u16],
            _address: u16,
            _slave_id: u8,
            _category: RegisterCategory,
        ) -> Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn abandon(&mut self) {
            self.connected = false;
        }
    }

    #[tokio::test]
    async fn test_read_is_bounded() {
        let shared = SharedTransport::new(Box::new(StallingTransport), Duration::from_millis(20));
        let err = shared
            .read(1, 1, 1, RegisterCategory::Holding)
            .await
            .unwrap_err();
        assert!(matches!(err, RegSrvError::TimeoutError(_)));
    }

    #[tokio::test]
    async fn test_timeout_drops_the_connection() {
        let connects = Arc::new(AtomicU16::new(0));
        let shared = SharedTransport::new(
            Box::new(LateTransport {
                delay: Duration::from_millis(200),
                connected: false,
                connects: Arc::clone(&connects),
                reads: 0,
            }),
            Duration::from_millis(20),
        );
        shared.connect().await.unwrap();

        let err = shared
            .read(1, 2, 1, RegisterCategory::Holding)
            .await
            .unwrap_err();
        assert!(matches!(err, RegSrvError::TimeoutError(_)));
        assert!(!shared.inner.lock().await.is_connected());

        // answered on a fresh connection, never with the stale reply
        let words = shared.read(1, 2, 1, RegisterCategory::Holding).await.unwrap();
        assert_eq!(words, vec![2, 2]);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_through_shared_handle() {
        let client = SimulatedClient::new("line0");
        let shared = SharedTransport::new(Box::new(client), DEFAULT_TRANSPORT_TIMEOUT);
        shared.connect().await.unwrap();
        let words = shared.read(1, 3, 1, RegisterCategory::Input).await.unwrap();
        assert_eq!(words, vec![0, 0, 0]);
    }
}
