//! Logging decorator for command handlers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::types::ConfigMap;
use super::{CommandHandler, HandlerError, UpstreamCallback};

/// Logs every call going into and coming out of the wrapped handler
pub struct LoggingHandler {
    inner: Arc<dyn CommandHandler>,
}

impl LoggingHandler {
    pub fn new(inner: Arc<dyn CommandHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CommandHandler for LoggingHandler {
    async fn update_config(
        &self,
        local_id: &str,
        config: &ConfigMap,
    ) -> Result<String, HandlerError> {
        info!("In: ID: {}  config={:?}", local_id, config);
        let result = self.inner.update_config(local_id, config).await;
        match &result {
            Ok(id) => info!("Out: ID: {}", id),
            Err(e) => info!("Out: error: {}", e),
        }
        result
    }

    async fn remove_device(&self, local_id: &str, device_id: &str) -> Result<(), HandlerError> {
        info!("In: ID: {}  deviceID: {}", local_id, device_id);
        let result = self.inner.remove_device(local_id, device_id).await;
        info!("Out: error: {:?}", result.as_ref().err());
        result
    }

    async fn update_device(
        &self,
        local_id: &str,
        local_device_id: &str,
        config: &ConfigMap,
    ) -> Result<(String, ConfigMap), HandlerError> {
        info!(
            "In: ID: {}  LocalID: {}  config={:?}",
            local_id, local_device_id, config
        );
        let result = self
            .inner
            .update_device(local_id, local_device_id, config)
            .await;
        match &result {
            Ok((id, confirmed)) => info!("Out: ID: {}  config: {:?}", id, confirmed),
            Err(e) => info!("Out: error: {}", e),
        }
        result
    }

    async fn downstream_message(
        &self,
        local_id: &str,
        local_device_id: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        info!(
            "In: ID: {}  deviceID: {}  messageID: {}  payload: {} bytes",
            local_id,
            local_device_id,
            message_id,
            payload.len()
        );
        let result = self
            .inner
            .downstream_message(local_id, local_device_id, message_id, payload)
            .await;
        info!("Out: error: {:?}", result.as_ref().err());
        result
    }

    fn register_upstream_callback(&self, callback: UpstreamCallback) {
        self.inner.register_upstream_callback(callback);
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gw::keys;
    use crate::gw::types::UpstreamEvent;
    use crate::lora::{HandlerSettings, LoraHandler};
    use crate::testutil::{config, wait_for, FakeNetworkServer};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_forwards_every_call() {
        let server = Arc::new(FakeNetworkServer::new());
        let lora = Arc::new(LoraHandler::new(server.clone(), HandlerSettings::default()));
        let handler = LoggingHandler::new(lora);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let events = seen.clone();
        handler.register_upstream_callback(Arc::new(move |event: UpstreamEvent| {
            events.lock().unwrap().push(event.device_eui);
        }));

        let id = handler
            .update_config("", &config(&[(keys::APPLICATION_EUI, "AABBCC")]))
            .await
            .expect("application resolved");
        assert_eq!(id, "AABBCC");

        let (eui, _) = handler
            .update_device(&id, "", &config(&[(keys::STATE, "disabled")]))
            .await
            .expect("device created");

        // The callback registered on the decorator reaches the inner handler's reader
        wait_for(|| server.stream_count("AABBCC") == 1).await;
        assert!(server.publish("AABBCC", &eui, vec![9]));
        wait_for(|| seen.lock().unwrap().len() == 1).await;
        assert_eq!(seen.lock().unwrap()[0], eui);

        handler
            .downstream_message(&id, &eui, "m1", &[1, 2])
            .await
            .expect("message sent");
        handler
            .remove_device(&id, &eui)
            .await
            .expect("device removed");

        // Errors pass through unchanged
        let err = handler.update_config("", &config(&[])).await;
        assert!(matches!(err, Err(HandlerError::MissingApplicationEui)));

        assert!(server.device(&eui).is_none());
        assert_eq!(server.sent_messages().len(), 1);
        handler.shutdown().await;
    }
}
