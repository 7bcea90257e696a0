//! Diagnostic status aggregation.
//!
//! The [`StatusAggregator`] holds a persistent key/value snapshot of the
//! bridge's health. Facts are merged in as they change and the whole
//! snapshot is republished on a fixed cadence, so late subscribers always
//! see the full picture. One-off events (button presses) bypass the
//! snapshot and are published immediately.

pub mod timing;

pub use timing::{round_ms, TimingStats};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PublishError;
use crate::publish::{Message, Outbox};

/// Subtopic for the periodic snapshot.
pub const STATUS_TOPIC: &str = "status";

/// Subtopic for press events.
pub const OUTPUT_TOPIC: &str = "output";

/// A single diagnostic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for StatusValue {
    fn from(v: bool) -> Self {
        StatusValue::Bool(v)
    }
}

impl From<i64> for StatusValue {
    fn from(v: i64) -> Self {
        StatusValue::Int(v)
    }
}

impl From<u64> for StatusValue {
    fn from(v: u64) -> Self {
        StatusValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for StatusValue {
    fn from(v: u32) -> Self {
        StatusValue::Int(i64::from(v))
    }
}

impl From<f64> for StatusValue {
    fn from(v: f64) -> Self {
        StatusValue::Float(v)
    }
}

impl From<&str> for StatusValue {
    fn from(v: &str) -> Self {
        StatusValue::Text(v.to_string())
    }
}

impl From<String> for StatusValue {
    fn from(v: String) -> Self {
        StatusValue::Text(v)
    }
}

/// The full set of diagnostic facts, keyed by name.
pub type StatusSnapshot = BTreeMap<String, StatusValue>;

/// Accumulates diagnostic facts and publishes them.
///
/// Clones share the same snapshot and outbox, so the scan loop and the
/// flush task can each hold one.
///
/// # Example
///
/// ```
/// use modbus_to_mqtt::{Outbox, StatusAggregator};
///
/// let (outbox, mut rx) = Outbox::channel(16);
/// let status = StatusAggregator::new("plant", outbox);
///
/// status.update_status([("online", true)], true);
/// status.flush().unwrap();
///
/// let message = rx.try_recv().unwrap();
/// assert_eq!(message.topic, "plant/status");
/// assert_eq!(message.payload_str(), r#"{"online":true}"#);
/// ```
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    facts: Arc<Mutex<StatusSnapshot>>,
    outbox: Outbox,
    main_topic: Arc<str>,
}

impl StatusAggregator {
    pub fn new(main_topic: &str, outbox: Outbox) -> Self {
        Self {
            facts: Arc::new(Mutex::new(StatusSnapshot::new())),
            outbox,
            main_topic: Arc::from(main_topic.trim_end_matches('/')),
        }
    }

    /// Full topic name for a subtopic under the main topic.
    pub fn topic(&self, subtopic: &str) -> String {
        format!("{}/{}", self.main_topic, subtopic)
    }

    /// Merge facts into the snapshot, overwriting existing keys.
    ///
    /// With `log` set, the merged facts are logged at info level.
    pub fn update_status<I, K, V>(&self, facts: I, log: bool)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StatusValue>,
    {
        let delta: StatusSnapshot = facts
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if delta.is_empty() {
            return;
        }

        if log {
            match serde_json::to_string(&delta) {
                Ok(json) => info!("Status changed: {}", json),
                Err(e) => warn!("Status changed (unserializable): {}", e),
            }
        }

        self.facts.lock().extend(delta);
    }

    /// Publish a standalone event to `<main_topic>/<topic>` right away.
    pub fn publish_change<T>(&self, topic: &str, message: &T) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(message)?;
        let message = Message::new(self.topic(topic), payload);
        info!(
            "Sending message to {}: {}",
            message.topic,
            message.payload_str()
        );
        self.outbox.send(message)
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.facts.lock().clone()
    }

    /// Current value of one fact.
    pub fn get(&self, key: &str) -> Option<StatusValue> {
        self.facts.lock().get(key).cloned()
    }

    /// Publish the whole snapshot to `<main_topic>/status`.
    ///
    /// Returns `Ok(false)` without publishing when the snapshot is empty.
    /// The snapshot is left intact.
    pub fn flush(&self) -> Result<bool, PublishError> {
        let payload = {
            let facts = self.facts.lock();
            if facts.is_empty() {
                return Ok(false);
            }
            serde_json::to_vec(&*facts)?
        };

        let message = Message::new(self.topic(STATUS_TOPIC), payload);
        debug!("Sending status: {}", message.payload_str());
        self.outbox.send(message)?;
        Ok(true)
    }

    /// Start republishing the snapshot every `interval`.
    ///
    /// This spawns a tokio task. The first flush happens immediately.
    /// Intervals below 1 ms are raised to 1 ms.
    pub fn start(&self, interval: Duration) -> FlushHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let status = self.clone();
        let interval = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        if let Err(e) = status.flush() {
                            warn!("Failed to publish status: {}", e);
                        }
                    }
                }
            }
            debug!("Status flush stopped");
        });

        FlushHandle { stop_tx, task }
    }
}

/// Handle for the periodic status flush.
///
/// Dropping the handle also stops the flush.
#[derive(Debug)]
pub struct FlushHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Request the flush loop to stop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop and wait for the flush task to finish.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn aggregator() -> (StatusAggregator, mpsc::Receiver<Message>) {
        let (outbox, rx) = Outbox::channel(64);
        (StatusAggregator::new("modbus-to-mqtt", outbox), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn update_merges_and_overwrites() {
        let (status, _rx) = aggregator();
        status.update_status([("scans", 1u64)], false);
        status.update_status([("online", true)], true);
        status.update_status([("scans", 2u64)], false);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["scans"], StatusValue::Int(2));
        assert_eq!(snapshot["online"], StatusValue::Bool(true));
    }

    #[test]
    fn identical_updates_converge() {
        let (status, _rx) = aggregator();
        for _ in 0..3 {
            status.update_status([("scan_time", 100u64), ("long_click_time", 1000u64)], true);
        }
        let snapshot = status.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(status.get("scan_time"), Some(StatusValue::Int(100)));
    }

    #[test]
    fn flush_skips_empty_snapshot() {
        let (status, mut rx) = aggregator();
        assert!(!status.flush().unwrap());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn flush_publishes_full_snapshot_and_keeps_it() {
        let (status, mut rx) = aggregator();
        status.update_status([("online", true)], false);
        status.update_status([("highest_scan_time", 12.5)], false);

        assert!(status.flush().unwrap());
        assert!(status.flush().unwrap());

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(sent[0].topic, "modbus-to-mqtt/status");
        assert_eq!(
            sent[0].payload_str(),
            r#"{"highest_scan_time":12.5,"online":true}"#
        );
        assert_eq!(status.snapshot().len(), 2);
    }

    #[test]
    fn publish_change_goes_to_subtopic() {
        let (status, mut rx) = aggregator();
        status
            .publish_change(
                OUTPUT_TOPIC,
                &serde_json::json!({"address": 3, "press": "long"}),
            )
            .unwrap();

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "modbus-to-mqtt/output");
        assert_eq!(sent[0].payload_str(), r#"{"address":3,"press":"long"}"#);
        assert!(status.snapshot().is_empty());
    }

    #[test]
    fn status_values_serialize_untagged() {
        let mut snapshot = StatusSnapshot::new();
        snapshot.insert("a".into(), StatusValue::from(true));
        snapshot.insert("b".into(), StatusValue::from(7u64));
        snapshot.insert("c".into(), StatusValue::from(1.25));
        snapshot.insert("d".into(), StatusValue::from("ok"));
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"a":true,"b":7,"c":1.25,"d":"ok"}"#
        );
    }

    #[test]
    fn topic_prefix_trailing_slash_is_ignored() {
        let (outbox, _rx) = Outbox::channel(1);
        let status = StatusAggregator::new("plant/", outbox);
        assert_eq!(status.topic("status"), "plant/status");
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_flush_republishes_without_updates() {
        let (status, mut rx) = aggregator();
        status.update_status([("online", true)], false);

        let handle = status.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.shutdown().await;

        let sent = drain(&mut rx);
        // Ticks at 0, 100, 200 and 300 ms.
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|m| m.payload_str() == r#"{"online":true}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_flushes_every_millisecond() {
        let (status, mut rx) = aggregator();
        status.update_status([("online", true)], false);

        let handle = status.start(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.shutdown().await;

        // One flush per millisecond instead of a panic.
        assert!(drain(&mut rx).len() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_flush_publishes_nothing_more() {
        let (status, mut rx) = aggregator();
        status.update_status([("scans", 1u64)], false);

        let handle = status.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;
        let before = drain(&mut rx).len();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(before, 1);
        assert!(drain(&mut rx).is_empty());
    }
}
