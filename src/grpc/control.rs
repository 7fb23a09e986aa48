//! Cloud control stream over `gateway.UserGateway/ControlStream`

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::Streaming;
use tonic::transport::Channel;
use tonic::Status;
use tracing::warn;

use super::pb::gateway as pb;
use super::pb::gateway::user_gateway_client::UserGatewayClient;
use super::pb::gateway::{control_request, control_response};
use crate::gw::stream::{ControlSink, ControlSource, StreamError};
use crate::gw::types::{ControlRequest, ControlResponse};

/// Requests buffered before `send` waits on the transport
const REQUEST_BUFFER: usize = 32;

type ResponseStream = Streaming<pb::ControlResponse>;

/// Open the duplex control stream on `channel`.
///
/// The call is started in the background so requests can be queued before
/// the server answers with its headers; the first `recv` waits for it.
pub fn open(channel: Channel) -> (GrpcControlSink, GrpcControlSource) {
    let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
    let mut client = UserGatewayClient::new(channel);

    let call = tokio::spawn(async move {
        let response = client.control_stream(ReceiverStream::new(rx)).await?;
        Ok::<_, Status>(response.into_inner())
    });

    (
        GrpcControlSink { tx },
        GrpcControlSource {
            inbound: Inbound::Opening(call),
        },
    )
}

pub struct GrpcControlSink {
    tx: mpsc::Sender<pb::ControlRequest>,
}

#[async_trait]
impl ControlSink for GrpcControlSink {
    async fn send(&mut self, msg: ControlRequest) -> Result<(), StreamError> {
        self.tx
            .send(msg.into())
            .await
            .map_err(|_| StreamError::Send("request stream closed".to_string()))
    }
}

enum Inbound {
    Opening(JoinHandle<Result<ResponseStream, Status>>),
    Open(ResponseStream),
    Failed,
}

pub struct GrpcControlSource {
    inbound: Inbound,
}

#[async_trait]
impl ControlSource for GrpcControlSource {
    async fn recv(&mut self) -> Result<ControlResponse, StreamError> {
        if let Inbound::Opening(call) = &mut self.inbound {
            let opened = call.await;
            self.inbound = Inbound::Failed;
            let stream = opened
                .map_err(|e| StreamError::Receive(e.to_string()))?
                .map_err(|s| StreamError::Receive(s.to_string()))?;
            self.inbound = Inbound::Open(stream);
        }

        let Inbound::Open(stream) = &mut self.inbound else {
            return Err(StreamError::Closed);
        };

        loop {
            match stream.message().await {
                Ok(Some(msg)) => match response_from_wire(msg) {
                    Some(response) => return Ok(response),
                    None => warn!("Unknown message from server"),
                },
                Ok(None) => return Err(StreamError::Closed),
                Err(status) => return Err(StreamError::Receive(status.to_string())),
            }
        }
    }
}

impl From<ControlRequest> for pb::ControlRequest {
    fn from(msg: ControlRequest) -> Self {
        let msg = match msg {
            ControlRequest::ConfigRequest => control_request::Msg::Config(pb::ConfigRequest {}),
            ControlRequest::Keepalive => control_request::Msg::Keepalive(pb::KeepaliveRequest {}),
            ControlRequest::UpstreamMessage {
                device_id,
                payload,
                metadata,
            } => control_request::Msg::UpstreamMessage(pb::UpstreamMessage {
                device_id,
                payload,
                metadata,
            }),
            ControlRequest::DeviceUpdate {
                device_id,
                config,
                metadata,
            } => control_request::Msg::DeviceUpdate(pb::DeviceUpdate {
                device_id,
                config,
                metadata,
            }),
        };
        pb::ControlRequest { msg: Some(msg) }
    }
}

/// `None` for an empty message, which older servers may send
fn response_from_wire(msg: pb::ControlResponse) -> Option<ControlResponse> {
    let response = match msg.msg? {
        control_response::Msg::KeepaliveResponse(_) => ControlResponse::KeepaliveAck,
        control_response::Msg::GatewayUpdate(update) => ControlResponse::GatewayUpdate {
            config: update.config,
        },
        control_response::Msg::DeviceRemoved(removed) => ControlResponse::DeviceRemoved {
            device_id: removed.device_id,
        },
        control_response::Msg::DeviceUpdate(update) => ControlResponse::DeviceUpdate {
            device_id: update.device_id,
            config: update.config,
        },
        control_response::Msg::DownstreamMessage(msg) => ControlResponse::DownstreamMessage {
            device_id: msg.device_id,
            message_id: msg.message_id,
            payload: msg.payload,
        },
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::config;
    use prost::Message;

    #[test]
    fn test_requests_to_wire() {
        let wire = pb::ControlRequest::from(ControlRequest::Keepalive);
        assert!(matches!(
            wire.msg,
            Some(control_request::Msg::Keepalive(_))
        ));

        let wire = pb::ControlRequest::from(ControlRequest::DeviceUpdate {
            device_id: "dev-1".to_string(),
            config: config(&[("state", "otaa")]),
            metadata: config(&[("rssi", "-80")]),
        });
        match wire.msg {
            Some(control_request::Msg::DeviceUpdate(update)) => {
                assert_eq!(update.device_id, "dev-1");
                assert_eq!(update.config["state"], "otaa");
                assert_eq!(update.metadata["rssi"], "-80");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_responses_from_wire() {
        let wire = pb::ControlResponse {
            msg: Some(control_response::Msg::DownstreamMessage(
                pb::DownstreamMessage {
                    device_id: "dev-1".to_string(),
                    message_id: "m-7".to_string(),
                    payload: vec![1, 2, 3],
                },
            )),
        };
        assert_eq!(
            response_from_wire(wire),
            Some(ControlResponse::DownstreamMessage {
                device_id: "dev-1".to_string(),
                message_id: "m-7".to_string(),
                payload: vec![1, 2, 3],
            })
        );

        let wire = pb::ControlResponse {
            msg: Some(control_response::Msg::KeepaliveResponse(
                pb::KeepaliveResponse {},
            )),
        };
        assert_eq!(response_from_wire(wire), Some(ControlResponse::KeepaliveAck));
    }

    #[test]
    fn test_empty_response_is_skipped() {
        assert_eq!(response_from_wire(pb::ControlResponse { msg: None }), None);
    }

    #[test]
    fn test_upstream_wire_encoding() {
        let wire = pb::ControlRequest::from(ControlRequest::UpstreamMessage {
            device_id: "dev-1".to_string(),
            payload: vec![0xCA, 0xFE],
            metadata: config(&[("snr", "9.50")]),
        });
        let bytes = wire.encode_to_vec();
        // Field 3 (upstreamMessage), length-delimited
        assert_eq!(bytes[0], 0x1A);

        let decoded = pb::ControlRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, wire);
    }
}
