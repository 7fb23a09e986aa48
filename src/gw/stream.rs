//! The two halves of the cloud control stream

use async_trait::async_trait;
use thiserror::Error;

use super::types::{ControlRequest, ControlResponse};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("control stream closed by peer")]
    Closed,

    #[error("control stream send failed: {0}")]
    Send(String),

    #[error("control stream receive failed: {0}")]
    Receive(String),
}

/// Outbound half. Any error is fatal for the stream.
#[async_trait]
pub trait ControlSink: Send {
    async fn send(&mut self, msg: ControlRequest) -> Result<(), StreamError>;
}

/// Inbound half. Any error, including end of stream, is fatal for the stream.
#[async_trait]
pub trait ControlSource: Send {
    async fn recv(&mut self) -> Result<ControlResponse, StreamError>;
}
