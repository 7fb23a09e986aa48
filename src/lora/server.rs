//! Network server backend
//!
//! The bridge only uses the network server's application/device CRUD,
//! send-message and message-streaming calls. [`NetworkServer`] is that surface;
//! the gRPC client in [`crate::grpc::lospan`] implements it for a real server.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The application or device does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the requested EUI is already stored
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("request timed out")]
    Timeout,

    #[error("network server unavailable: {0}")]
    Unavailable(String),

    #[error("network server error: {0}")]
    Rpc(String),
}

impl NetworkError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, NetworkError::AlreadyExists(_))
    }
}

/// Device activation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Otaa,
    Abp,
    Disabled,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Otaa => write!(f, "otaa"),
            DeviceState::Abp => write!(f, "abp"),
            DeviceState::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub eui: String,
}

/// Device record as stored by the network server.
///
/// Key material is raw bytes; an empty vector means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub eui: Option<String>,
    pub application_eui: Option<String>,
    pub state: Option<DeviceState>,
    pub dev_addr: Option<u32>,
    pub app_key: Vec<u8>,
    pub app_session_key: Vec<u8>,
    pub network_session_key: Vec<u8>,
    pub frame_count_up: Option<i32>,
    pub frame_count_down: Option<i32>,
    pub relaxed_counter: Option<bool>,
    pub key_warning: Option<bool>,
}

/// Message to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamMessage {
    pub eui: String,
    pub payload: Vec<u8>,
    pub port: u32,
    pub ack: bool,
}

/// Telemetry event received from a device
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMessage {
    pub eui: String,
    pub payload: Vec<u8>,
    pub rssi: i32,
    pub snr: f32,
    pub frequency: f32,
    pub data_rate: String,
    pub dev_addr: u32,
    pub gateway_eui: String,
}

pub type UpstreamStream = BoxStream<'static, Result<UpstreamMessage, NetworkError>>;

#[async_trait]
pub trait NetworkServer: Send + Sync {
    async fn get_application(&self, eui: &str) -> Result<Application, NetworkError>;

    async fn create_application(&self, eui: &str) -> Result<Application, NetworkError>;

    async fn get_device(&self, eui: &str) -> Result<Device, NetworkError>;

    /// Create a device. The server generates an EUI when `device.eui` is `None`.
    async fn create_device(&self, device: Device) -> Result<Device, NetworkError>;

    async fn update_device(&self, device: Device) -> Result<Device, NetworkError>;

    async fn delete_device(&self, eui: &str) -> Result<(), NetworkError>;

    async fn send_message(&self, message: DownstreamMessage) -> Result<(), NetworkError>;

    /// Open a stream of upstream messages for one application
    async fn stream_messages(&self, application_eui: &str) -> Result<UpstreamStream, NetworkError>;
}
