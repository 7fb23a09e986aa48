//! Messages exchanged with the cloud over the control stream

use std::collections::HashMap;

/// String-keyed configuration map (see [`crate::gw::keys`])
pub type ConfigMap = HashMap<String, String>;

/// Messages sent from the bridge to the cloud
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Ask the cloud to re-send the full application/device configuration
    ConfigRequest,
    Keepalive,
    /// Telemetry from a device
    UpstreamMessage {
        device_id: String,
        payload: Vec<u8>,
        metadata: ConfigMap,
    },
    /// Server-confirmed device state
    DeviceUpdate {
        device_id: String,
        config: ConfigMap,
        metadata: ConfigMap,
    },
}

impl ControlRequest {
    pub fn is_keepalive(&self) -> bool {
        matches!(self, ControlRequest::Keepalive)
    }
}

/// Messages received from the cloud
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    KeepaliveAck,
    /// Application ("gateway") configuration
    GatewayUpdate { config: ConfigMap },
    DeviceRemoved { device_id: String },
    DeviceUpdate { device_id: String, config: ConfigMap },
    DownstreamMessage {
        device_id: String,
        message_id: String,
        payload: Vec<u8>,
    },
}

/// One telemetry event from the network server, as handed to the upstream callback
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEvent {
    pub device_eui: String,
    pub payload: Vec<u8>,
    pub metadata: ConfigMap,
    /// Refreshed device config, if the device could be fetched
    pub config: Option<ConfigMap>,
}
