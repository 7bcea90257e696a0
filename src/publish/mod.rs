//! Message channel abstraction.
//!
//! Everything the bridge publishes goes through an [`Outbox`]: a bounded
//! queue drained by a dispatcher task that owns the [`Publisher`]. Producers
//! never wait on network I/O; if the queue is full the message is dropped.
//!
//! ```text
//! Scheduler ──┐
//!             ├──▶ Outbox (try_send) ──▶ dispatcher task ──▶ Publisher::publish()
//! Status flush┘
//! ```

mod backoff;
mod dispatch;
mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use backoff::Backoff;
pub use dispatch::{finish_dispatcher, spawn_dispatcher, Message, Outbox};
pub use memory::MemoryPublisher;
#[cfg(feature = "mqtt")]
pub use mqtt::MqttPublisher;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::PublishError;

/// Trait for transmitting payloads on a message channel.
#[async_trait]
pub trait Publisher: Send + Sync + Debug {
    /// Wait until the channel is connected.
    ///
    /// Implementations retry internally with bounded backoff; this resolves
    /// once a connection is up, or fails if the client has shut down.
    async fn connect(&self) -> Result<(), PublishError>;

    /// Transmit a payload. Fails immediately when disconnected.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Returns a human-readable description of the channel endpoint.
    fn description(&self) -> &str;
}
