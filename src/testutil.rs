//! In-memory fakes shared by the unit tests

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::gw::stream::{ControlSink, ControlSource, StreamError};
use crate::gw::types::{ConfigMap, ControlRequest, ControlResponse};
use crate::lora::server::{
    Application, Device, DownstreamMessage, NetworkError, NetworkServer, UpstreamMessage,
    UpstreamStream,
};

pub fn config(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Poll `condition` until it holds, panicking after a few seconds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

type StreamSender = mpsc::UnboundedSender<Result<UpstreamMessage, NetworkError>>;

#[derive(Default)]
struct FakeState {
    applications: HashSet<String>,
    devices: HashMap<String, Device>,
    sent: Vec<DownstreamMessage>,
    streams: HashMap<String, StreamSender>,
    stream_counts: HashMap<String, usize>,
    calls: Vec<String>,
    next_eui: u64,
    fail_next: Option<NetworkError>,
    hang: bool,
}

/// Network server backed by hash maps
#[derive(Default)]
pub struct FakeNetworkServer {
    state: Mutex<FakeState>,
}

impl FakeNetworkServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_application(&self, eui: &str) {
        self.state().applications.insert(eui.to_string());
    }

    pub fn has_application(&self, eui: &str) -> bool {
        self.state().applications.contains(eui)
    }

    pub fn add_device(&self, device: Device) {
        let eui = device.eui.clone().expect("fake devices need an EUI");
        self.state().devices.insert(eui, device);
    }

    pub fn device(&self, eui: &str) -> Option<Device> {
        self.state().devices.get(eui).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn sent_messages(&self) -> Vec<DownstreamMessage> {
        self.state().sent.clone()
    }

    /// Make the next request fail with `error`
    pub fn fail_next(&self, error: NetworkError) {
        self.state().fail_next = Some(error);
    }

    /// Make every request block forever
    pub fn hang_requests(&self, hang: bool) {
        self.state().hang = hang;
    }

    /// Number of times a message stream was opened for the application
    pub fn stream_count(&self, application_eui: &str) -> usize {
        self.state()
            .stream_counts
            .get(application_eui)
            .copied()
            .unwrap_or(0)
    }

    /// Push a telemetry message into the application's stream.
    /// Returns false if no reader is listening.
    pub fn publish(&self, application_eui: &str, device_eui: &str, payload: Vec<u8>) -> bool {
        let msg = UpstreamMessage {
            eui: device_eui.to_string(),
            payload,
            rssi: -80,
            snr: 9.5,
            frequency: 868.3,
            data_rate: "SF9BW125".to_string(),
            dev_addr: 0x1A2B3C4D,
            gateway_eui: "aabbccddeeff0011".to_string(),
        };
        self.state()
            .streams
            .get(application_eui)
            .map(|tx| tx.send(Ok(msg)).is_ok())
            .unwrap_or(false)
    }

    /// Fail the application's stream
    pub fn break_stream(&self, application_eui: &str) -> bool {
        self.state()
            .streams
            .get(application_eui)
            .map(|tx| {
                tx.send(Err(NetworkError::Unavailable("stream reset".to_string())))
                    .is_ok()
            })
            .unwrap_or(false)
    }

    /// Record the call and apply any injected failure
    async fn begin(&self, call: String) -> Result<(), NetworkError> {
        let (hang, failure) = {
            let mut state = self.state();
            state.calls.push(call);
            (state.hang, state.fail_next.take())
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NetworkServer for FakeNetworkServer {
    async fn get_application(&self, eui: &str) -> Result<Application, NetworkError> {
        self.begin(format!("get_application {}", eui)).await?;
        if self.has_application(eui) {
            Ok(Application {
                eui: eui.to_string(),
            })
        } else {
            Err(NetworkError::NotFound(eui.to_string()))
        }
    }

    async fn create_application(&self, eui: &str) -> Result<Application, NetworkError> {
        self.begin(format!("create_application {}", eui)).await?;
        self.add_application(eui);
        Ok(Application {
            eui: eui.to_string(),
        })
    }

    async fn get_device(&self, eui: &str) -> Result<Device, NetworkError> {
        self.begin(format!("get_device {}", eui)).await?;
        self.device(eui)
            .ok_or_else(|| NetworkError::NotFound(eui.to_string()))
    }

    async fn create_device(&self, mut device: Device) -> Result<Device, NetworkError> {
        self.begin("create_device".to_string()).await?;
        let mut state = self.state();
        let eui = match device.eui.clone() {
            Some(eui) if state.devices.contains_key(&eui) => {
                return Err(NetworkError::AlreadyExists(eui));
            }
            Some(eui) => eui,
            None => {
                state.next_eui += 1;
                format!("{:016x}", 0x00a0_0000_0000_0000u64 + state.next_eui)
            }
        };
        device.eui = Some(eui.clone());
        device.frame_count_up.get_or_insert(0);
        device.frame_count_down.get_or_insert(0);
        state.devices.insert(eui, device.clone());
        Ok(device)
    }

    async fn update_device(&self, device: Device) -> Result<Device, NetworkError> {
        let eui = device.eui.clone().unwrap_or_default();
        self.begin(format!("update_device {}", eui)).await?;
        let mut state = self.state();
        if !state.devices.contains_key(&eui) {
            return Err(NetworkError::NotFound(eui));
        }
        state.devices.insert(eui, device.clone());
        Ok(device)
    }

    async fn delete_device(&self, eui: &str) -> Result<(), NetworkError> {
        self.begin(format!("delete_device {}", eui)).await?;
        match self.state().devices.remove(eui) {
            Some(_) => Ok(()),
            None => Err(NetworkError::NotFound(eui.to_string())),
        }
    }

    async fn send_message(&self, message: DownstreamMessage) -> Result<(), NetworkError> {
        self.begin(format!("send_message {}", message.eui)).await?;
        self.state().sent.push(message);
        Ok(())
    }

    async fn stream_messages(&self, application_eui: &str) -> Result<UpstreamStream, NetworkError> {
        self.begin(format!("stream_messages {}", application_eui))
            .await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.streams.insert(application_eui.to_string(), tx);
        *state
            .stream_counts
            .entry(application_eui.to_string())
            .or_default() += 1;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Outbound half that records everything sent
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<ControlRequest>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<ControlRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn keepalives(&self) -> usize {
        self.sent().iter().filter(|m| m.is_keepalive()).count()
    }

    /// Fail every following send
    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ControlSink for RecordingSink {
    async fn send(&mut self, msg: ControlRequest) -> Result<(), StreamError> {
        if *self.fail.lock().unwrap() {
            return Err(StreamError::Send("broken pipe".to_string()));
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

/// Inbound half fed by the test through the returned [`SourceHandle`]
pub struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Result<ControlResponse, StreamError>>,
}

pub type SourceHandle = mpsc::UnboundedSender<Result<ControlResponse, StreamError>>;

impl ScriptedSource {
    pub fn new() -> (Self, SourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }
}

#[async_trait]
impl ControlSource for ScriptedSource {
    async fn recv(&mut self) -> Result<ControlResponse, StreamError> {
        self.rx.recv().await.unwrap_or(Err(StreamError::Closed))
    }
}
