//! # modbus-to-mqtt
//!
//! A bridge that polls discrete inputs on a Modbus TCP device, turns their
//! level changes into debounced short and long press events, and publishes
//! those events plus a periodic health snapshot over MQTT.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────── Scheduler ───────────────────────────┐
//! │  ┌─────────────┐    ┌──────────────┐    ┌────────────────────┐ │
//! │  │ FieldSource │───▶│ EdgeDetector │───▶│  StatusAggregator  │ │
//! │  │   (read)    │    │ (per block)  │    │ (snapshot, events) │ │
//! │  └─────────────┘    └──────────────┘    └─────────┬──────────┘ │
//! └───────────────────────────────────────────────────┼────────────┘
//!                                                     │ Outbox
//!                                                     ▼
//!                                   dispatcher task ───▶ Publisher
//! ```
//!
//! - **[`source`]**: field device abstraction ([`FieldSource`] trait) with a
//!   Modbus TCP client and a scripted in-memory source
//! - **[`detect`]**: sliding sample windows and the short/long press rules
//! - **[`status`]**: the diagnostic snapshot, its periodic flush and scan
//!   timing statistics
//! - **[`publish`]**: message channel abstraction ([`Publisher`] trait), the
//!   non-blocking outbox and the MQTT client
//! - **[`scheduler`]**: the periodic scan loop tying it all together
//!
//! ## Topics
//!
//! With `main_topic: plant`:
//!
//! - `plant/output` carries one `{"address": 17, "press": "short"}` per press
//! - `plant/status` carries the full snapshot every `repeat_time` ms
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Uses ./config.yaml or /modbus-to-mqtt/config.yaml
//! modbus-to-mqtt
//!
//! # Explicit config, verbose logs
//! modbus-to-mqtt --config plant.yaml --log-level debug
//!
//! # Validate the configuration and print it
//! modbus-to-mqtt --config plant.yaml --check
//! ```
//!
//! ### As a library with scripted input
//!
//! ```
//! use std::sync::Arc;
//! use modbus_to_mqtt::{
//!     BlockSettings, FieldbusSettings, InputKind, Outbox, Scheduler, ScriptedSource,
//!     StatusAggregator,
//! };
//!
//! # tokio_test::block_on(async {
//! let settings = FieldbusSettings {
//!     address: "127.0.0.1".to_string(),
//!     port: 502,
//!     unit_id: 1,
//!     read: vec![BlockSettings { kind: InputKind::Coil, start: 0, count: 1 }],
//!     scan_time: 100,
//!     long_press_time: 1000,
//!     read_timeout: 500,
//! };
//!
//! let source = Arc::new(ScriptedSource::new());
//! source.push_levels(InputKind::Coil, 0, &[1, 0]);
//!
//! let (outbox, mut rx) = Outbox::channel(16);
//! let status = StatusAggregator::new("plant", outbox);
//! let mut scheduler = Scheduler::new(&settings, source, status);
//!
//! scheduler.tick().await;
//! let report = scheduler.tick().await;
//! assert_eq!(report.events.len(), 1);
//!
//! let message = rx.try_recv().unwrap();
//! assert_eq!(message.topic, "plant/output");
//! # });
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod publish;
pub mod scheduler;
pub mod source;
pub mod status;

// Re-export main types for convenience
pub use config::{
    BlockSettings, FieldbusSettings, InputKind, LogLevel, MqttSettings, Settings, Timing,
};
pub use detect::{EdgeDetector, PressEvent, PressKind, Window};
pub use error::{ConfigError, FieldSourceError, PublishError};
pub use publish::{
    finish_dispatcher, spawn_dispatcher, Backoff, MemoryPublisher, Message, Outbox, Publisher,
};
pub use scheduler::{ScanReport, Scheduler, SchedulerHandle};
pub use source::{FieldSource, ScriptedSource};
pub use status::{FlushHandle, StatusAggregator, StatusSnapshot, StatusValue, TimingStats};

#[cfg(feature = "mqtt")]
pub use publish::MqttPublisher;
#[cfg(feature = "modbus")]
pub use source::ModbusSource;
