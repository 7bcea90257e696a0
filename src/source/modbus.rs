//! Modbus TCP field source.
//!
//! Wraps a `tokio-modbus` client context. The connection is opened on the
//! first read and dropped after any transport failure, so the next read
//! reconnects.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::{tcp, Context, Reader};
use tokio_modbus::Slave;
use tracing::{debug, warn};

use super::FieldSource;
use crate::config::{FieldbusSettings, InputKind};
use crate::error::FieldSourceError;

/// A field source backed by a Modbus TCP device.
pub struct ModbusSource {
    host: String,
    port: u16,
    unit: Slave,
    context: Mutex<Option<Context>>,
    description: String,
}

impl ModbusSource {
    pub fn new(settings: &FieldbusSettings) -> Self {
        Self {
            host: settings.address.clone(),
            port: settings.port,
            unit: Slave(settings.unit_id),
            context: Mutex::new(None),
            description: format!(
                "modbus://{}:{}/{}",
                settings.address, settings.port, settings.unit_id
            ),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, FieldSourceError> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                FieldSourceError::Connection(format!("Could not resolve {}", self.host))
            })
    }

    async fn connect(&self) -> Result<Context, FieldSourceError> {
        let addr = self.resolve().await?;
        debug!("Connecting to field device at {}", addr);
        tcp::connect_slave(addr, self.unit)
            .await
            .map_err(|e| FieldSourceError::Connection(e.to_string()))
    }
}

#[async_trait]
impl FieldSource for ModbusSource {
    async fn read(
        &self,
        kind: InputKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, FieldSourceError> {
        let mut slot = self.context.lock().await;

        // The context is taken out for the duration of the request; if the
        // caller's timeout cancels us mid-request it is dropped, not reused.
        let mut ctx = match slot.take() {
            Some(ctx) => ctx,
            None => self.connect().await?,
        };

        let response = match kind {
            InputKind::Coil => ctx.read_coils(start, count).await,
            InputKind::DiscreteInput => ctx.read_discrete_inputs(start, count).await,
        };

        match response {
            Ok(Ok(bits)) => {
                *slot = Some(ctx);
                if bits.len() < usize::from(count) {
                    return Err(FieldSourceError::ShortRead {
                        expected: usize::from(count),
                        actual: bits.len(),
                    });
                }
                Ok(bits)
            }
            Ok(Err(exception)) => {
                *slot = Some(ctx);
                Err(FieldSourceError::Exception(format!("{:?}", exception)))
            }
            Err(e) => {
                warn!(
                    "Modbus transport error on {}, dropping connection: {}",
                    self.description, e
                );
                Err(FieldSourceError::Transport(e.to_string()))
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for ModbusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusSource")
            .field("description", &self.description)
            .finish()
    }
}
