//! Control stream processor
//!
//! Reads and writes the duplex control stream to the cloud and keeps the
//! network backend in sync with the commands it receives. The stream runs
//! until the first send or receive error; reconnecting is left to whoever
//! owns the process, and a fresh processor rebuilds its state from the
//! config request it sends on start.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::identity::IdentityMap;
use super::keys;
use super::stream::{ControlSink, ControlSource, StreamError};
use super::types::{ConfigMap, ControlRequest, ControlResponse, UpstreamEvent};
use super::CommandHandler;

const OUTBOUND_QUEUE_DEPTH: usize = 64;
const INBOUND_QUEUE_DEPTH: usize = 16;

/// Floor for the idle check period; tokio intervals must be non-zero
const MIN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct KeepaliveSettings {
    /// Idle time before a keepalive is sent
    pub interval: Duration,
    /// How often idleness is checked
    pub poll: Duration,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            poll: Duration::from_secs(10),
        }
    }
}

/// Time of the last traffic on the stream.
///
/// Touched by the sender and receiver tasks, read by the control loop.
struct Liveness {
    last: Mutex<Instant>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle(&self) -> Duration {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).elapsed()
    }
}

pub struct StreamProcessor {
    handler: Arc<dyn CommandHandler>,
    keepalive: KeepaliveSettings,
    devices: IdentityMap,
    /// Local id of the current application
    application: Option<String>,
}

impl StreamProcessor {
    pub fn new(handler: Arc<dyn CommandHandler>, keepalive: KeepaliveSettings) -> Self {
        Self {
            handler,
            keepalive,
            devices: IdentityMap::new(),
            application: None,
        }
    }

    /// Run the processor. Only returns when the stream fails.
    pub async fn run<S, R>(mut self, sink: S, source: R) -> Result<(), StreamError>
    where
        S: ControlSink + 'static,
        R: ControlSource + 'static,
    {
        let liveness = Arc::new(Liveness::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (error_tx, mut error_rx) = mpsc::channel(2);
        let (upstream_tx, mut upstream_rx) = mpsc::unbounded_channel::<UpstreamEvent>();

        self.handler
            .register_upstream_callback(Arc::new(move |event| {
                if upstream_tx.send(event).is_err() {
                    debug!("Control stream is gone, dropping upstream event");
                }
            }));

        let sender = tokio::spawn(send_loop(
            sink,
            outbound_rx,
            error_tx.clone(),
            liveness.clone(),
        ));
        let receiver = tokio::spawn(receive_loop(source, inbound_tx, error_tx, liveness.clone()));

        // Ask for the current configuration so the cloud re-sends everything
        enqueue(&outbound_tx, ControlRequest::ConfigRequest).await;

        let poll = self.keepalive.poll.max(MIN_POLL);
        let mut ticker = time::interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let err = loop {
            tokio::select! {
                biased;

                Some(err) = error_rx.recv() => break err,

                Some(msg) = inbound_rx.recv() => self.dispatch(msg, &outbound_tx).await,

                Some(event) = upstream_rx.recv() => self.forward_upstream(event, &outbound_tx).await,

                _ = ticker.tick() => {
                    if liveness.idle() > self.keepalive.interval {
                        debug!("Stream idle for {:?}, sending keepalive", liveness.idle());
                        enqueue(&outbound_tx, ControlRequest::Keepalive).await;
                    }
                }
            }
        };

        // Only the control loop holds the outbound sender; dropping it closes the queue
        drop(outbound_tx);
        receiver.abort();
        sender.abort();
        error!("Got error when sending/receiving: {}", err);
        Err(err)
    }

    async fn dispatch(&mut self, msg: ControlResponse, outbound: &mpsc::Sender<ControlRequest>) {
        match msg {
            ControlResponse::KeepaliveAck => {}
            ControlResponse::GatewayUpdate { config } => self.update_config(config).await,
            ControlResponse::DeviceUpdate { device_id, config } => {
                self.update_device(device_id, config, outbound).await
            }
            ControlResponse::DeviceRemoved { device_id } => self.remove_device(device_id).await,
            ControlResponse::DownstreamMessage {
                device_id,
                message_id,
                payload,
            } => {
                self.downstream_message(device_id, message_id, payload)
                    .await
            }
        }
    }

    async fn update_config(&mut self, config: ConfigMap) {
        info!("Update gateway config");
        let Some(application_eui) = config
            .get(keys::APPLICATION_EUI)
            .filter(|eui| !eui.is_empty())
        else {
            error!("Gateway config does not contain App EUI {:?}", config);
            return;
        };

        // Reuse the local id only if the application stays the same
        let local_id = self
            .application
            .as_deref()
            .filter(|id| id == application_eui)
            .unwrap_or("")
            .to_string();

        match self.handler.update_config(&local_id, &config).await {
            Ok(id) => {
                info!("Current application is {}", id);
                self.application = Some(id);
            }
            Err(e) => error!("Error updating application {}: {}", application_eui, e),
        }
    }

    async fn update_device(
        &mut self,
        device_id: String,
        config: ConfigMap,
        outbound: &mpsc::Sender<ControlRequest>,
    ) {
        let Some(application) = self.application.as_deref() else {
            error!("No application is set. Ignoring device {}", device_id);
            return;
        };
        let existing = self.devices.eui_for(&device_id).unwrap_or("");

        match self
            .handler
            .update_device(application, existing, &config)
            .await
        {
            Ok((eui, confirmed)) => {
                self.devices.insert(&device_id, &eui);
                enqueue(
                    outbound,
                    ControlRequest::DeviceUpdate {
                        device_id,
                        config: confirmed,
                        metadata: ConfigMap::new(),
                    },
                )
                .await;
            }
            Err(e) => error!("Error updating device {}: {}", device_id, e),
        }
    }

    async fn remove_device(&mut self, device_id: String) {
        let Some(eui) = self.devices.eui_for(&device_id) else {
            warn!("Unknown device {} - nothing to remove", device_id);
            return;
        };
        let application = self.application.as_deref().unwrap_or("");

        match self.handler.remove_device(application, eui).await {
            Ok(()) => {
                self.devices.remove(&device_id);
            }
            Err(e) => error!("Error removing device {}: {}", device_id, e),
        }
    }

    async fn downstream_message(&self, device_id: String, message_id: String, payload: Vec<u8>) {
        let Some(eui) = self.devices.eui_for(&device_id) else {
            error!("Unknown device {} - ignoring downstream message", device_id);
            return;
        };
        let application = self.application.as_deref().unwrap_or("");

        if let Err(e) = self
            .handler
            .downstream_message(application, eui, &message_id, &payload)
            .await
        {
            error!("Error sending downstream message to {}: {}", device_id, e);
        }
    }

    async fn forward_upstream(&self, event: UpstreamEvent, outbound: &mpsc::Sender<ControlRequest>) {
        let Some(device_id) = self.devices.device_for(&event.device_eui) else {
            warn!(
                "Unknown device EUI: {}. Ignoring upstream message",
                event.device_eui
            );
            return;
        };
        let device_id = device_id.to_string();
        debug!("Send UpstreamMessage for device {}", device_id);

        enqueue(
            outbound,
            ControlRequest::UpstreamMessage {
                device_id: device_id.clone(),
                payload: event.payload,
                metadata: event.metadata.clone(),
            },
        )
        .await;

        if let Some(config) = event.config {
            enqueue(
                outbound,
                ControlRequest::DeviceUpdate {
                    device_id,
                    config,
                    metadata: event.metadata,
                },
            )
            .await;
        }
    }
}

async fn enqueue(outbound: &mpsc::Sender<ControlRequest>, msg: ControlRequest) {
    // A failed enqueue means the sender task has exited; its error is
    // already on its way to the control loop.
    if outbound.send(msg).await.is_err() {
        debug!("Outbound queue closed, message dropped");
    }
}

async fn send_loop<S: ControlSink>(
    mut sink: S,
    mut outbound: mpsc::Receiver<ControlRequest>,
    errors: mpsc::Sender<StreamError>,
    liveness: Arc<Liveness>,
) {
    while let Some(msg) = outbound.recv().await {
        let keepalive = msg.is_keepalive();
        if let Err(e) = sink.send(msg).await {
            let _ = errors.send(e).await;
            return;
        }
        // Keepalives don't count as traffic, so an idle stream keeps sending them
        if !keepalive {
            liveness.touch();
        }
    }
}

async fn receive_loop<R: ControlSource>(
    mut source: R,
    inbound: mpsc::Sender<ControlResponse>,
    errors: mpsc::Sender<StreamError>,
    liveness: Arc<Liveness>,
) {
    loop {
        match source.recv().await {
            Ok(msg) => {
                liveness.touch();
                if inbound.send(msg).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = errors.send(e).await;
                return;
            }
        }
    }
}
