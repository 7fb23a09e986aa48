//! Cloud side of the bridge
//!
//! The [`StreamProcessor`] owns the duplex control stream to the cloud and
//! drives a [`CommandHandler`], which does the actual work against the local
//! network server. Telemetry flows the other way through the callback the
//! processor registers on the handler.

pub mod identity;
pub mod keys;
pub mod logger;
pub mod processor;
pub mod stream;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::lora::server::NetworkError;
use crate::lora::translate::TranslateError;

pub use logger::LoggingHandler;
pub use processor::{KeepaliveSettings, StreamProcessor};
pub use stream::{ControlSink, ControlSource, StreamError};
pub use types::{ConfigMap, ControlRequest, ControlResponse, UpstreamEvent};

/// Invoked for every upstream telemetry event
pub type UpstreamCallback = Arc<dyn Fn(UpstreamEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("missing application EUI in configuration")]
    MissingApplicationEui,

    #[error("device EUI is not set")]
    MissingDeviceEui,

    #[error("no application is set")]
    NoApplication,

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Operations the control stream processor needs from a network backend.
///
/// `local_id` is the backend's identifier for the current application and
/// `local_device_id` the backend's identifier for a device (both EUIs for
/// the LoRa backend).
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Resolve (or create) the application described by `config` and
    /// (re)start its upstream reader. Returns the application's local id.
    async fn update_config(&self, local_id: &str, config: &ConfigMap)
        -> Result<String, HandlerError>;

    /// Remove a device. Removing a device that does not exist succeeds.
    async fn remove_device(&self, local_id: &str, device_id: &str) -> Result<(), HandlerError>;

    /// Create (empty `local_device_id`) or update a device. Returns the
    /// device's local id and its server-confirmed config.
    async fn update_device(
        &self,
        local_id: &str,
        local_device_id: &str,
        config: &ConfigMap,
    ) -> Result<(String, ConfigMap), HandlerError>;

    async fn downstream_message(
        &self,
        local_id: &str,
        local_device_id: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), HandlerError>;

    /// Install the callback for upstream telemetry, replacing any previous one
    fn register_upstream_callback(&self, callback: UpstreamCallback);

    /// Stop background work (upstream readers)
    async fn shutdown(&self) {}
}
