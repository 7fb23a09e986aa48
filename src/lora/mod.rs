//! LoRa network server command handler
//!
//! Implements [`CommandHandler`] against a [`NetworkServer`]: applications
//! and devices are created/updated from cloud config maps, downstream
//! messages are sent on a fixed application port, and one
//! [`reader::UpstreamReader`] per active application feeds telemetry to the
//! registered callback.

pub mod reader;
pub mod server;
pub mod translate;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::gw::keys;
use crate::gw::types::ConfigMap;
use crate::gw::{CommandHandler, HandlerError, UpstreamCallback};
use reader::{CallbackSlot, UpstreamReader};
use server::{DownstreamMessage, NetworkError, NetworkServer};
use translate::{config_to_device, device_to_config};

/// Per-call timeout for network server requests
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub timeout: Duration,
    /// Application port for downstream messages
    pub message_port: u8,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CLIENT_TIMEOUT,
            message_port: 1,
        }
    }
}

pub struct LoraHandler {
    server: Arc<dyn NetworkServer>,
    settings: HandlerSettings,
    callbacks: Arc<CallbackSlot>,
    reader: Mutex<Option<UpstreamReader>>,
}

impl LoraHandler {
    pub fn new(server: Arc<dyn NetworkServer>, settings: HandlerSettings) -> Self {
        Self {
            server,
            settings,
            callbacks: Arc::new(CallbackSlot::default()),
            reader: Mutex::new(None),
        }
    }

    /// Run one network server request under the per-call timeout
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, NetworkError>>,
    ) -> Result<T, NetworkError> {
        tokio::time::timeout(self.settings.timeout, request)
            .await
            .map_err(|_| NetworkError::Timeout)?
    }

    /// Stop the current reader (if any), then start one for `application_eui`.
    ///
    /// The old reader has fully stopped before the new one is spawned, so at
    /// most one reader ever delivers callbacks.
    async fn restart_reader(&self, application_eui: &str) {
        let mut current = self.reader.lock().await;
        if let Some(old) = current.take() {
            if old.application_eui() != application_eui {
                info!(
                    "Switching upstream reader from {} to {}",
                    old.application_eui(),
                    application_eui
                );
            }
            old.stop().await;
        }
        *current = Some(UpstreamReader::spawn(
            self.server.clone(),
            application_eui.to_string(),
            self.callbacks.clone(),
            self.settings.timeout,
        ));
    }

    /// Look up the application and create it if the server doesn't know it
    async fn resolve_application(&self, application_eui: &str) -> Result<String, HandlerError> {
        match self.call(self.server.get_application(application_eui)).await {
            Ok(app) => {
                info!("Found application {} in LoRa server", app.eui);
                Ok(app.eui)
            }
            Err(e) if e.is_not_found() => {
                info!(
                    "Application {} not found. Creating a new application",
                    application_eui
                );
                let app = self
                    .call(self.server.create_application(application_eui))
                    .await?;
                info!("Created application with EUI {}", app.eui);
                Ok(app.eui)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_device(
        &self,
        application_eui: &str,
        config: &ConfigMap,
    ) -> Result<(String, ConfigMap), HandlerError> {
        // Device EUI is taken from the config when given, else server-generated
        let mut device = config_to_device(config)?;
        device.application_eui = Some(application_eui.to_string());
        let requested_eui = device.eui.clone();

        match self.call(self.server.create_device(device)).await {
            Ok(created) => {
                let eui = created.eui.clone().ok_or(HandlerError::MissingDeviceEui)?;
                info!("Created device {} for application {}", eui, application_eui);
                Ok((eui, device_to_config(&created)))
            }
            // After a restart the cloud re-sends devices the server already has
            Err(e) if e.is_already_exists() => {
                let Some(eui) = requested_eui else {
                    return Err(e.into());
                };
                info!("Device {} already exists. Updating it instead", eui);
                self.update_existing_device(application_eui, &eui, config)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_existing_device(
        &self,
        application_eui: &str,
        device_eui: &str,
        config: &ConfigMap,
    ) -> Result<(String, ConfigMap), HandlerError> {
        let mut device = config_to_device(config)?;
        device.eui = Some(device_eui.to_string());
        device.application_eui = Some(application_eui.to_string());

        let updated = self.call(self.server.update_device(device)).await?;
        info!("Updated device {} in application {}", device_eui, application_eui);
        Ok((device_eui.to_string(), device_to_config(&updated)))
    }
}

#[async_trait]
impl CommandHandler for LoraHandler {
    async fn update_config(
        &self,
        local_id: &str,
        config: &ConfigMap,
    ) -> Result<String, HandlerError> {
        let application_eui = config
            .get(keys::APPLICATION_EUI)
            .filter(|eui| !eui.is_empty())
            .ok_or(HandlerError::MissingApplicationEui)?;

        let local_id = if local_id.is_empty() {
            self.resolve_application(application_eui).await?
        } else {
            local_id.to_string()
        };
        self.restart_reader(application_eui).await;
        Ok(local_id)
    }

    async fn remove_device(&self, _local_id: &str, device_id: &str) -> Result<(), HandlerError> {
        if device_id.is_empty() {
            return Err(HandlerError::MissingDeviceEui);
        }
        match self.call(self.server.delete_device(device_id)).await {
            Ok(()) => {
                info!("Removed device {}", device_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Device {} does not exist; not removed: {}", device_id, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_device(
        &self,
        local_id: &str,
        local_device_id: &str,
        config: &ConfigMap,
    ) -> Result<(String, ConfigMap), HandlerError> {
        if local_id.is_empty() {
            return Err(HandlerError::NoApplication);
        }
        if local_device_id.is_empty() {
            self.create_device(local_id, config).await
        } else {
            self.update_existing_device(local_id, local_device_id, config)
                .await
        }
    }

    async fn downstream_message(
        &self,
        _local_id: &str,
        local_device_id: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        if local_device_id.is_empty() {
            return Err(HandlerError::MissingDeviceEui);
        }
        self.call(self.server.send_message(DownstreamMessage {
            eui: local_device_id.to_string(),
            payload: payload.to_vec(),
            port: u32::from(self.settings.message_port),
            ack: false,
        }))
        .await?;
        info!(
            "Sent downstream message {} to device {}",
            message_id, local_device_id
        );
        Ok(())
    }

    fn register_upstream_callback(&self, callback: UpstreamCallback) {
        self.callbacks.set(callback);
    }

    async fn shutdown(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.stop().await;
        }
    }
}
