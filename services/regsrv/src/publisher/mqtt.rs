//! MQTT publisher built on rumqttc

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::core::device::Device;
use crate::core::slug::slugify;
use crate::core::types::Value;
use crate::error::{RegSrvError, Result};
use crate::publisher::{discovery, state_payload, Topics, WriteCommand};
use crate::publisher::TelemetryPublisher;

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// Bound for requests that must be queued rather than dropped
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn publish_error(err: rumqttc::ClientError) -> RegSrvError {
    RegSrvError::publish(err.to_string())
}

/// Telemetry publisher backed by an MQTT broker
pub struct MqttPublisher {
    client: AsyncClient,
    topics: Topics,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl MqttPublisher {
    /// Connect and spawn the event loop
    ///
    /// Inbound publishes on command topics are forwarded to `commands`.
    pub fn start(settings: &MqttSettings, commands: mpsc::Sender<WriteCommand>) -> Self {
        let topics = Topics::new(&settings.base_topic, &settings.discovery_prefix);
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| format!("regsrv-{:016x}", rand::random::<u64>()));

        let mut options = MqttOptions::new(client_id.clone(), &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(user) = &settings.user {
            options.set_credentials(user, settings.password.clone().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            topics.bridge_availability(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));
        let stop = CancellationToken::new();

        info!(
            "MQTT client {} connecting to {}:{}",
            client_id, settings.host, settings.port
        );
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            topics.clone(),
            Arc::clone(&subscriptions),
            commands,
            stop.clone(),
        ));

        Self {
            client,
            topics,
            subscriptions,
            event_loop: Mutex::new(Some(handle)),
            stop,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Queue a request, giving up when the event loop is not draining
    async fn queue<F>(&self, what: &str, request: F) -> Result<()>
    where
        F: std::future::Future<Output = std::result::Result<(), rumqttc::ClientError>>,
    {
        match tokio::time::timeout(REQUEST_TIMEOUT, request).await {
            Ok(result) => result.map_err(publish_error),
            Err(_) => Err(RegSrvError::publish(format!(
                "{} not queued within {:?}; broker unreachable?",
                what, REQUEST_TIMEOUT
            ))),
        }
    }

    /// Remembered first so a reconnect restores it even if queueing fails now
    async fn subscribe(&self, topic: String) -> Result<()> {
        self.subscriptions.lock().insert(topic.clone());
        self.queue(
            "subscribe",
            self.client.subscribe(topic.as_str(), QoS::AtLeastOnce),
        )
        .await
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    commands: mpsc::Sender<WriteCommand>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                // The request queue is drained by this loop, so never await here
                if let Err(e) =
                    client.try_publish(topics.bridge_availability(), QoS::AtLeastOnce, true, "online")
                {
                    warn!("Could not queue bridge availability: {}", e);
                }
                let topics_to_restore: Vec<String> = subscriptions.lock().iter().cloned().collect();
                for topic in topics_to_restore {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!("Could not restore subscription {}: {}", topic, e);
                    }
                }
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some((device, slug)) = topics.parse_command(&publish.topic) else {
                    debug!("Ignoring message on {}", publish.topic);
                    continue;
                };
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                info!("Received command for {}/{}: {}", device, slug, payload);
                if let Err(e) = commands.try_send(WriteCommand {
                    device,
                    slug,
                    payload,
                }) {
                    warn!("Dropping write command: {}", e);
                }
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            },
            Ok(_) => {},
            Err(e) => {
                error!("MQTT connection error: {}", e);
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {},
                }
            },
        }
    }
    info!("MQTT event loop stopped");
}

#[async_trait]
impl TelemetryPublisher for MqttPublisher {
    async fn announce(&self, device: &Device) -> Result<()> {
        for name in device.write_parameters().keys() {
            self.subscribe(self.topics.command(device.name(), &slugify(name)))
                .await?;
        }

        for message in discovery::messages(&self.topics, device) {
            let payload = serde_json::to_vec(&message.payload)
                .map_err(|e| RegSrvError::publish(e.to_string()))?;
            self.queue(
                "discovery",
                self.client
                    .publish(message.topic, QoS::AtLeastOnce, true, payload),
            )
            .await?;
        }

        self.publish_availability(device.name(), true).await?;
        info!(device = %device.name(), "Discovery published");
        Ok(())
    }

    /// Dropped, not queued, while the request queue is full
    async fn publish_value(&self, device: &str, parameter: &str, value: &Value) -> Result<()> {
        self.client
            .try_publish(
                self.topics.state(device, &slugify(parameter)),
                QoS::AtMostOnce,
                false,
                state_payload(value),
            )
            .map_err(publish_error)
    }

    async fn publish_availability(&self, device: &str, online: bool) -> Result<()> {
        self.client
            .try_publish(
                self.topics.availability(device),
                QoS::AtLeastOnce,
                true,
                if online { "online" } else { "offline" },
            )
            .map_err(publish_error)
    }

    async fn close(&self) -> Result<()> {
        let result = self
            .queue("shutdown", async {
                self.client
                    .publish(
                        self.topics.bridge_availability(),
                        QoS::AtLeastOnce,
                        true,
                        "offline",
                    )
                    .await?;
                self.client.disconnect().await
            })
            .await;

        let handle = self.event_loop.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("MQTT event loop did not finish within {:?}", SHUTDOWN_GRACE);
                self.stop.cancel();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: None,
            password: None,
            base_topic: "modbus".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            client_id: Some("regsrv-test".to_string()),
            keep_alive_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_publishing_does_not_wait_for_broker() {
        let (tx, _rx) = mpsc::channel(8);
        let publisher = MqttPublisher::start(&unreachable_broker(), tx);

        let burst = async {
            for n in 0..40 {
                let _ = publisher
                    .publish_value("ATESS1", "Battery SOC", &Value::Int(n))
                    .await;
                let _ = publisher.publish_availability("ATESS1", n % 2 == 0).await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(5), burst)
            .await
            .is_ok());

        publisher.stop.cancel();
    }
}
