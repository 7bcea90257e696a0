//! MQTT publisher backed by `rumqttc`.
//!
//! The client's event loop runs on its own task. It tracks the connection
//! state, and after a connection error waits with bounded exponential
//! backoff before polling again (which makes `rumqttc` reconnect).

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Backoff, Publisher};
use crate::config::MqttSettings;
use crate::error::PublishError;

/// Capacity of the request channel between the client and its event loop.
const REQUEST_CAPACITY: usize = 64;

/// A publisher connected to an MQTT broker.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    event_loop: JoinHandle<()>,
    description: String,
}

impl MqttPublisher {
    /// Create the client and spawn its event loop.
    ///
    /// Must be called from within a tokio runtime. The connection is
    /// established in the background; use [`Publisher::connect`] to wait for it.
    pub fn new(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.address, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive.max(5)));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = watch::channel(false);
        let backoff = Backoff::new(
            Duration::from_millis(settings.reconnect_min),
            Duration::from_millis(settings.reconnect_max),
        );
        let description = format!("mqtt://{}:{}", settings.address, settings.port);

        let event_loop = tokio::spawn(drive(event_loop, tx, backoff, description.clone()));

        Self {
            client,
            connected: rx,
            event_loop,
            description,
        }
    }
}

/// Poll the event loop forever, publishing connection state changes.
async fn drive(
    mut event_loop: EventLoop,
    connected: watch::Sender<bool>,
    mut backoff: Backoff,
    description: String,
) {
    // Only the first failure of a streak is logged at error level.
    let mut failing = false;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to mqtt broker {}", description);
                    connected.send_replace(true);
                    backoff.reset();
                    failing = false;
                } else {
                    error!(
                        "Broker {} refused connection: {:?}",
                        description, ack.code
                    );
                    connected.send_replace(false);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker {} closed the connection", description);
                connected.send_replace(false);
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                debug!(
                    "MQTT client for {} dropped, stopping event loop",
                    description
                );
                connected.send_replace(false);
                break;
            }
            Err(e) => {
                let was_connected = connected.send_replace(false);
                if was_connected {
                    error!("Disconnected from mqtt broker {}: {}", description, e);
                } else if !failing {
                    error!("Failed to connect to mqtt broker {}: {}", description, e);
                } else {
                    debug!("Reconnect to {} failed: {}", description, e);
                }
                failing = true;
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        let mut rx = self.connected.clone();
        rx.wait_for(|connected| *connected)
            .await
            .map(|_| ())
            .map_err(|_| PublishError::Client("event loop stopped".to_string()))
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Disconnected);
        }
        self.client
            .publish(
                topic.to_lowercase(),
                QoS::AtMostOnce,
                false,
                payload.to_vec(),
            )
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("description", &self.description)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MqttSettings {
        MqttSettings {
            address: "127.0.0.1".to_string(),
            port: 1,
            repeat_time: 1000,
            main_topic: "modbus-to-mqtt".to_string(),
            client_id: "test-client".to_string(),
            keep_alive: 30,
            reconnect_min: 10,
            reconnect_max: 50,
        }
    }

    #[tokio::test]
    async fn publish_while_disconnected_is_dropped() {
        let publisher = MqttPublisher::new(&settings());
        assert!(!publisher.is_connected());
        assert_eq!(publisher.description(), "mqtt://127.0.0.1:1");

        let err = publisher.publish("Plant/Status", b"{}").await.unwrap_err();
        assert!(matches!(err, PublishError::Disconnected));
    }

    #[tokio::test]
    async fn connect_waits_while_broker_unreachable() {
        let publisher = MqttPublisher::new(&settings());
        let result = tokio::time::timeout(Duration::from_millis(200), publisher.connect()).await;
        assert!(result.is_err(), "connect should still be waiting");
    }
}
