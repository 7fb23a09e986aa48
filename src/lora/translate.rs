//! Conversion between cloud config maps and network server device records

use thiserror::Error;

use super::server::{Device, DeviceState};
use crate::gw::keys;
use crate::gw::types::ConfigMap;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unknown state for device: {0}")]
    UnknownState(String),

    #[error("invalid hex format for {field}")]
    InvalidHex { field: &'static str },

    #[error("invalid number format for {field}")]
    InvalidNumber { field: &'static str },

    #[error("invalid boolean for {field}: {value}")]
    InvalidBool { field: &'static str, value: String },
}

/// Build a device record from a config map.
///
/// The state key decides which key material is read: the app key for OTAA,
/// device address and session keys for ABP. Empty values count as absent.
/// Any malformed field fails the whole translation.
pub fn config_to_device(cfg: &ConfigMap) -> Result<Device, TranslateError> {
    let mut device = Device {
        eui: value(cfg, keys::DEVICE_EUI).map(str::to_string),
        ..Device::default()
    };

    if let Some(state) = value(cfg, keys::STATE) {
        device.state = Some(parse_state(state)?);
    }

    match device.state {
        Some(DeviceState::Otaa) => {
            device.app_key = hex_field(cfg, keys::APP_KEY)?;
        }
        Some(DeviceState::Abp) => {
            if let Some(addr) = value(cfg, keys::DEV_ADDR) {
                let addr = u32::from_str_radix(addr, 16).map_err(|_| TranslateError::InvalidNumber {
                    field: keys::DEV_ADDR,
                })?;
                device.dev_addr = Some(addr);
            }
            device.app_session_key = hex_field(cfg, keys::APP_SESSION_KEY)?;
            device.network_session_key = hex_field(cfg, keys::NETWORK_SESSION_KEY)?;
        }
        Some(DeviceState::Disabled) | None => {}
    }

    device.frame_count_up = counter_field(cfg, keys::FRAME_COUNT_UP)?;
    device.frame_count_down = counter_field(cfg, keys::FRAME_COUNT_DOWN)?;

    if let Some(relaxed) = value(cfg, keys::RELAXED_COUNTER) {
        device.relaxed_counter = Some(parse_bool(keys::RELAXED_COUNTER, relaxed)?);
    }

    Ok(device)
}

/// Project a device record into a config map
pub fn device_to_config(device: &Device) -> ConfigMap {
    let mut cfg = ConfigMap::new();
    cfg.insert(
        keys::APPLICATION_EUI.to_string(),
        device.application_eui.clone().unwrap_or_default(),
    );
    cfg.insert(
        keys::STATE.to_string(),
        device.state.unwrap_or(DeviceState::Disabled).to_string(),
    );

    if let Some(eui) = &device.eui {
        cfg.insert(keys::DEVICE_EUI.to_string(), eui.clone());
    }
    if let Some(addr) = device.dev_addr {
        cfg.insert(keys::DEV_ADDR.to_string(), format!("{:x}", addr));
    }
    for (key, material) in [
        (keys::APP_KEY, &device.app_key),
        (keys::APP_SESSION_KEY, &device.app_session_key),
        (keys::NETWORK_SESSION_KEY, &device.network_session_key),
    ] {
        if !material.is_empty() {
            cfg.insert(key.to_string(), hex::encode(material));
        }
    }
    if let Some(fcnt) = device.frame_count_up {
        cfg.insert(keys::FRAME_COUNT_UP.to_string(), fcnt.to_string());
    }
    if let Some(fcnt) = device.frame_count_down {
        cfg.insert(keys::FRAME_COUNT_DOWN.to_string(), fcnt.to_string());
    }
    if let Some(relaxed) = device.relaxed_counter {
        cfg.insert(keys::RELAXED_COUNTER.to_string(), relaxed.to_string());
    }
    if device.key_warning == Some(true) {
        cfg.insert(keys::KEY_WARNING.to_string(), "true".to_string());
    }
    cfg
}

fn parse_state(state: &str) -> Result<DeviceState, TranslateError> {
    match state.to_ascii_lowercase().as_str() {
        "otaa" => Ok(DeviceState::Otaa),
        "abp" => Ok(DeviceState::Abp),
        "disabled" => Ok(DeviceState::Disabled),
        _ => Err(TranslateError::UnknownState(state.to_string())),
    }
}

fn parse_bool(field: &'static str, raw: &str) -> Result<bool, TranslateError> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(TranslateError::InvalidBool {
            field,
            value: raw.to_string(),
        })
    }
}

fn value<'a>(cfg: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cfg.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn hex_field(cfg: &ConfigMap, field: &'static str) -> Result<Vec<u8>, TranslateError> {
    match value(cfg, field) {
        Some(raw) => hex::decode(raw).map_err(|_| TranslateError::InvalidHex { field }),
        None => Ok(Vec::new()),
    }
}

fn counter_field(cfg: &ConfigMap, field: &'static str) -> Result<Option<i32>, TranslateError> {
    value(cfg, field)
        .map(|raw| {
            raw.parse::<i32>()
                .map_err(|_| TranslateError::InvalidNumber { field })
        })
        .transpose()
}
