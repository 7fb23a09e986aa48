//! gRPC client for the lospan network server

use async_trait::async_trait;
use futures::StreamExt;
use tonic::transport::Channel;

use super::pb::lospan as pb;
use super::pb::lospan::lospan_client::LospanClient;
use crate::lora::server::{
    Application, Device, DeviceState, DownstreamMessage, NetworkError, NetworkServer,
    UpstreamMessage, UpstreamStream,
};

/// [`NetworkServer`] backed by the generated lospan gRPC client
#[derive(Clone)]
pub struct LospanBackend {
    client: LospanClient<Channel>,
}

impl LospanBackend {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: LospanClient::new(channel),
        }
    }

    // Generated clients take `&mut self`; clones share the channel
    fn client(&self) -> LospanClient<Channel> {
        self.client.clone()
    }
}

#[async_trait]
impl NetworkServer for LospanBackend {
    async fn get_application(&self, eui: &str) -> Result<Application, NetworkError> {
        let app = self
            .client()
            .get_application(pb::GetApplicationRequest {
                eui: eui.to_string(),
            })
            .await?
            .into_inner();
        Ok(Application { eui: app.eui })
    }

    async fn create_application(&self, eui: &str) -> Result<Application, NetworkError> {
        let app = self
            .client()
            .create_application(pb::CreateApplicationRequest {
                eui: Some(eui.to_string()),
            })
            .await?
            .into_inner();
        Ok(Application { eui: app.eui })
    }

    async fn get_device(&self, eui: &str) -> Result<Device, NetworkError> {
        let device = self
            .client()
            .get_device(pb::GetDeviceRequest {
                eui: eui.to_string(),
            })
            .await?
            .into_inner();
        Ok(device.into())
    }

    async fn create_device(&self, device: Device) -> Result<Device, NetworkError> {
        let created = self
            .client()
            .create_device(pb::Device::from(device))
            .await?
            .into_inner();
        Ok(created.into())
    }

    async fn update_device(&self, device: Device) -> Result<Device, NetworkError> {
        let updated = self
            .client()
            .update_device(pb::Device::from(device))
            .await?
            .into_inner();
        Ok(updated.into())
    }

    async fn delete_device(&self, eui: &str) -> Result<(), NetworkError> {
        self.client()
            .delete_device(pb::DeleteDeviceRequest {
                eui: eui.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn send_message(&self, message: DownstreamMessage) -> Result<(), NetworkError> {
        self.client()
            .send_message(pb::DownstreamMessage {
                eui: message.eui,
                payload: message.payload,
                port: message.port,
                ack: message.ack,
            })
            .await?;
        Ok(())
    }

    async fn stream_messages(&self, application_eui: &str) -> Result<UpstreamStream, NetworkError> {
        let stream = self
            .client()
            .stream_messages(pb::StreamMessagesRequest {
                eui: application_eui.to_string(),
            })
            .await?
            .into_inner()
            .map(|item| item.map(UpstreamMessage::from).map_err(NetworkError::from));
        Ok(stream.boxed())
    }
}

impl From<DeviceState> for pb::DeviceState {
    fn from(state: DeviceState) -> Self {
        match state {
            DeviceState::Otaa => pb::DeviceState::Otaa,
            DeviceState::Abp => pb::DeviceState::Abp,
            DeviceState::Disabled => pb::DeviceState::Disabled,
        }
    }
}

impl From<pb::DeviceState> for DeviceState {
    fn from(state: pb::DeviceState) -> Self {
        match state {
            pb::DeviceState::Otaa => DeviceState::Otaa,
            pb::DeviceState::Abp => DeviceState::Abp,
            pb::DeviceState::Disabled => DeviceState::Disabled,
        }
    }
}

impl From<Device> for pb::Device {
    fn from(device: Device) -> Self {
        pb::Device {
            eui: device.eui,
            application_eui: device.application_eui,
            state: device.state.map(|s| pb::DeviceState::from(s) as i32),
            dev_addr: device.dev_addr,
            app_key: device.app_key,
            app_session_key: device.app_session_key,
            network_session_key: device.network_session_key,
            frame_count_up: device.frame_count_up,
            frame_count_down: device.frame_count_down,
            relaxed_counter: device.relaxed_counter,
            key_warning: device.key_warning,
        }
    }
}

impl From<pb::Device> for Device {
    fn from(device: pb::Device) -> Self {
        Device {
            eui: device.eui,
            application_eui: device.application_eui,
            // Unknown enum values are treated as unset
            state: device
                .state
                .and_then(|s| pb::DeviceState::try_from(s).ok())
                .map(DeviceState::from),
            dev_addr: device.dev_addr,
            app_key: device.app_key,
            app_session_key: device.app_session_key,
            network_session_key: device.network_session_key,
            frame_count_up: device.frame_count_up,
            frame_count_down: device.frame_count_down,
            relaxed_counter: device.relaxed_counter,
            key_warning: device.key_warning,
        }
    }
}

impl From<pb::UpstreamMessage> for UpstreamMessage {
    fn from(msg: pb::UpstreamMessage) -> Self {
        UpstreamMessage {
            eui: msg.eui,
            payload: msg.payload,
            rssi: msg.rssi,
            snr: msg.snr,
            frequency: msg.frequency,
            data_rate: msg.data_rate,
            dev_addr: msg.dev_addr,
            gateway_eui: msg.gateway_eui,
        }
    }
}
