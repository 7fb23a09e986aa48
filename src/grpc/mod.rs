//! gRPC transports for the cloud control stream and the network server

pub mod control;
pub mod lospan;
pub mod pb;
pub mod tls;

use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use crate::config::{ControlConfig, LoraConfig};
use crate::lora::server::NetworkError;

pub use lospan::LospanBackend;

impl From<Status> for NetworkError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::NotFound => NetworkError::NotFound(status.message().to_string()),
            Code::AlreadyExists => NetworkError::AlreadyExists(status.message().to_string()),
            Code::DeadlineExceeded => NetworkError::Timeout,
            Code::Unavailable => NetworkError::Unavailable(status.message().to_string()),
            _ => NetworkError::Rpc(status.to_string()),
        }
    }
}

/// Connect to the cloud, using client TLS when configured
pub async fn connect_control(config: &ControlConfig) -> anyhow::Result<Channel> {
    let mut endpoint = Endpoint::from_shared(config.endpoint.clone())
        .map_err(|e| anyhow::anyhow!("Invalid control endpoint {}: {}", config.endpoint, e))?;
    if let Some(tls) = &config.tls {
        endpoint = endpoint
            .tls_config(tls::client_config(tls)?)
            .map_err(|e| anyhow::anyhow!("Invalid TLS config: {}", e))?;
    }
    endpoint
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", config.endpoint, e))
}

/// Connect to the local network server (plaintext)
pub async fn connect_lora(config: &LoraConfig) -> anyhow::Result<Channel> {
    let endpoint = Endpoint::from_shared(config.endpoint.clone())
        .map_err(|e| anyhow::anyhow!("Invalid lora endpoint {}: {}", config.endpoint, e))?;
    endpoint
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", config.endpoint, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = NetworkError::from(Status::not_found("device 0102"));
        assert_eq!(err, NetworkError::NotFound("device 0102".to_string()));
        assert!(err.is_not_found());

        let err = NetworkError::from(Status::already_exists("device 0102"));
        assert_eq!(err, NetworkError::AlreadyExists("device 0102".to_string()));
        assert!(err.is_already_exists());

        assert_eq!(
            NetworkError::from(Status::deadline_exceeded("slow")),
            NetworkError::Timeout
        );
        assert_eq!(
            NetworkError::from(Status::unavailable("down")),
            NetworkError::Unavailable("down".to_string())
        );
        assert!(matches!(
            NetworkError::from(Status::internal("boom")),
            NetworkError::Rpc(_)
        ));
    }
}
