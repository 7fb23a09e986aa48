//! Upstream telemetry reader
//!
//! One reader runs per active application. It streams messages from the
//! network server, decorates them with telemetry metadata and the device's
//! current config, and hands them to whatever callback is registered at the
//! time. A stream error ends the reader; it is only restarted by the next
//! application config update.

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::server::{NetworkServer, UpstreamMessage};
use super::translate::device_to_config;
use crate::gw::keys;
use crate::gw::types::{ConfigMap, UpstreamEvent};
use crate::gw::UpstreamCallback;

/// Lock-protected slot for the upstream callback.
///
/// Written from the control path, read from the reader task.
#[derive(Default)]
pub struct CallbackSlot {
    inner: Mutex<Option<UpstreamCallback>>,
}

impl CallbackSlot {
    pub fn set(&self, callback: UpstreamCallback) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
    }

    pub fn get(&self) -> Option<UpstreamCallback> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Handle to a running reader
pub struct UpstreamReader {
    application_eui: String,
    task: JoinHandle<()>,
}

impl UpstreamReader {
    pub fn spawn(
        server: Arc<dyn NetworkServer>,
        application_eui: String,
        callbacks: Arc<CallbackSlot>,
        timeout: Duration,
    ) -> Self {
        let task = tokio::spawn(run_reader(
            server,
            application_eui.clone(),
            callbacks,
            timeout,
        ));
        Self {
            application_eui,
            task,
        }
    }

    pub fn application_eui(&self) -> &str {
        &self.application_eui
    }

    /// Stop the reader and wait until it can no longer invoke the callback.
    ///
    /// Dropping the task drops the server stream, which closes the send side
    /// of the RPC.
    pub async fn stop(self) {
        self.task.abort();
        match self.task.await {
            Ok(()) => debug!("Upstream reader for {} had already exited", self.application_eui),
            Err(e) if e.is_cancelled() => {
                debug!("Stopped upstream reader for {}", self.application_eui)
            }
            Err(e) => warn!("Upstream reader for {} failed: {}", self.application_eui, e),
        }
    }
}

async fn run_reader(
    server: Arc<dyn NetworkServer>,
    application_eui: String,
    callbacks: Arc<CallbackSlot>,
    timeout: Duration,
) {
    let mut stream = match server.stream_messages(&application_eui).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                "Error opening upstream message stream for app {}: {}",
                application_eui, e
            );
            return;
        }
    };
    info!("Starting upstream reader for application {}", application_eui);

    while let Some(item) = stream.next().await {
        let msg = match item {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    "Error reading upstream messages for app {}. Exiting: {}",
                    application_eui, e
                );
                return;
            }
        };

        let Some(callback) = callbacks.get() else {
            debug!("No upstream callback registered, dropping message from {}", msg.eui);
            continue;
        };

        let config = match tokio::time::timeout(timeout, server.get_device(&msg.eui)).await {
            Ok(Ok(device)) => Some(device_to_config(&device)),
            Ok(Err(e)) => {
                warn!("Got error retrieving device {}. Won't update config: {}", msg.eui, e);
                None
            }
            Err(_) => {
                warn!("Timed out retrieving device {}. Won't update config", msg.eui);
                None
            }
        };

        let metadata = upstream_metadata(&msg);
        callback(UpstreamEvent {
            device_eui: msg.eui,
            payload: msg.payload,
            metadata,
            config,
        });
    }

    warn!("Upstream message stream for app {} ended", application_eui);
}

/// Telemetry metadata attached to upstream messages
pub fn upstream_metadata(msg: &UpstreamMessage) -> ConfigMap {
    let mut md = ConfigMap::new();
    md.insert(keys::GATEWAY_EUI.to_string(), msg.gateway_eui.clone());
    md.insert(keys::RSSI.to_string(), msg.rssi.to_string());
    md.insert(keys::SNR.to_string(), format!("{:.2}", msg.snr));
    md.insert(keys::FREQUENCY.to_string(), format!("{:.3}", msg.frequency));
    md.insert(keys::DATA_RATE.to_string(), msg.data_rate.clone());
    md.insert(keys::DEV_ADDR.to_string(), format!("{:x}", msg.dev_addr));
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_metadata() {
        let msg = UpstreamMessage {
            eui: "0102030405060708".to_string(),
            payload: vec![1, 2, 3],
            rssi: -87,
            snr: 7.25,
            frequency: 868.1,
            data_rate: "SF7BW125".to_string(),
            dev_addr: 0x01AB5678,
            gateway_eui: "aabbccddeeff0011".to_string(),
        };

        let md = upstream_metadata(&msg);
        assert_eq!(md[keys::GATEWAY_EUI], "aabbccddeeff0011");
        assert_eq!(md[keys::RSSI], "-87");
        assert_eq!(md[keys::SNR], "7.25");
        // Frequency comes from the frequency field, not SNR
        assert_eq!(md[keys::FREQUENCY], "868.100");
        assert_eq!(md[keys::DATA_RATE], "SF7BW125");
        assert_eq!(md[keys::DEV_ADDR], "1ab5678");
        assert_eq!(md.len(), 6);
    }

    #[test]
    fn test_callback_slot_replaces_callback() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let slot = CallbackSlot::default();
        assert!(slot.get().is_none());

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let counter = first.clone();
        slot.set(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = second.clone();
        slot.set(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let callback = slot.get().expect("callback is set");
        callback(UpstreamEvent {
            device_eui: "01".to_string(),
            payload: vec![],
            metadata: ConfigMap::new(),
            config: None,
        });
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
