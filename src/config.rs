use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub control: ControlConfig,
    pub lora: LoraConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cloud control stream endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    pub endpoint: String,
    pub tls: Option<TlsConfig>,
}

/// Client certificate, CA chain and private key (PEM files)
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub chain_file: PathBuf,
    pub key_file: PathBuf,
}

/// Local LoRaWAN network server
#[derive(Debug, Clone, Deserialize)]
pub struct LoraConfig {
    pub endpoint: String,
    /// Application port used for downstream messages
    #[serde(default = "default_message_port")]
    pub message_port: u8,
    /// Per-call RPC timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    pub interval_secs: u64,
    pub poll_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_message_port() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=223).contains(&self.lora.message_port) {
            anyhow::bail!(
                "lora.message_port must be between 1 and 223, got {}",
                self.lora.message_port
            );
        }
        if self.lora.timeout_ms == 0 {
            anyhow::bail!("lora.timeout_ms must be greater than zero");
        }
        if self.keepalive.interval_secs == 0 {
            anyhow::bail!("keepalive.interval_secs must be greater than zero");
        }
        if self.keepalive.poll_secs == 0 {
            anyhow::bail!("keepalive.poll_secs must be greater than zero");
        }
        Ok(())
    }
}

impl LoraConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: ControlConfig {
                endpoint: "http://127.0.0.1:4710".to_string(),
                tls: None,
            },
            lora: LoraConfig {
                endpoint: "http://127.0.0.1:4711".to_string(),
                message_port: default_message_port(),
                timeout_ms: default_timeout_ms(),
            },
            keepalive: KeepaliveConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            poll_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
