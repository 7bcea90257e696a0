//! In-memory publisher.
//!
//! Records every published message instead of sending it anywhere. Useful
//! for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Message, Publisher};
use crate::error::PublishError;

/// A publisher that keeps messages in memory.
///
/// # Example
///
/// ```
/// use modbus_to_mqtt::{MemoryPublisher, Publisher};
///
/// # tokio_test::block_on(async {
/// let publisher = MemoryPublisher::new();
/// publisher.publish("plant/output", b"{}").await.unwrap();
/// assert_eq!(publisher.on_topic("plant/output").len(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<Message>>,
    connected: AtomicBool,
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPublisher {
    /// Create a connected publisher with no messages.
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate a broker connection change.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// All messages published so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Messages published to one topic.
    pub fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        self.set_connected(true);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Disconnected);
        }
        self.messages.lock().push(Message::new(topic, payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn description(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_publish_is_dropped() {
        let publisher = MemoryPublisher::new();
        publisher.set_connected(false);

        let err = publisher.publish("t", b"x").await.unwrap_err();
        assert!(matches!(err, PublishError::Disconnected));
        assert!(publisher.messages().is_empty());

        publisher.connect().await.unwrap();
        publisher.publish("t", b"y").await.unwrap();
        assert_eq!(publisher.messages().len(), 1);
    }

    #[tokio::test]
    async fn on_topic_filters() {
        let publisher = MemoryPublisher::new();
        publisher.publish("a", b"1").await.unwrap();
        publisher.publish("b", b"2").await.unwrap();
        publisher.publish("a", b"3").await.unwrap();

        let a = publisher.on_topic("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].payload_str(), "3");

        publisher.clear();
        assert!(publisher.messages().is_empty());
    }
}
