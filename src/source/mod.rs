//! Field device abstraction for sampling discrete inputs.
//!
//! The scheduler only needs one capability from the field bus: read the
//! current state of a contiguous range of inputs. This module provides a
//! trait for that capability with implementations for Modbus TCP and for
//! scripted, in-memory input.

#[cfg(feature = "modbus")]
mod modbus;
mod scripted;

#[cfg(feature = "modbus")]
pub use modbus::ModbusSource;
pub use scripted::ScriptedSource;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::config::InputKind;
use crate::error::FieldSourceError;

/// Trait for reading discrete inputs from a field device.
///
/// Implementations may block on network I/O; callers are expected to bound
/// each read with a timeout.
///
/// # Example
///
/// ```
/// use modbus_to_mqtt::{FieldSource, InputKind, ScriptedSource};
///
/// # tokio_test::block_on(async {
/// let source = ScriptedSource::new();
/// source.push_sample(InputKind::Coil, 0, vec![true, false]);
///
/// let bits = source.read(InputKind::Coil, 0, 2).await.unwrap();
/// assert_eq!(bits, vec![true, false]);
/// # });
/// ```
#[async_trait]
pub trait FieldSource: Send + Sync + Debug {
    /// Read `count` inputs starting at `start` from the given table.
    ///
    /// On success the returned vector holds at least `count` values.
    async fn read(
        &self,
        kind: InputKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, FieldSourceError>;

    /// Returns a human-readable description of the device.
    fn description(&self) -> &str;
}
