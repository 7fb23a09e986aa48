//! Client TLS for the control stream

use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::config::TlsConfig;

fn read_pem(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", path, e))
}

/// Build the client TLS config: the chain file is trusted as CA, the
/// certificate and key identify the bridge.
pub fn client_config(config: &TlsConfig) -> anyhow::Result<ClientTlsConfig> {
    let chain = read_pem(&config.chain_file)?;
    let cert = read_pem(&config.cert_file)?;
    let key = read_pem(&config.key_file)?;

    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(chain))
        .identity(Identity::from_pem(cert, key)))
}
