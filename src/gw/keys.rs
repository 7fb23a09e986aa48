//! Well-known keys of the cloud config map
//!
//! The same keys are used for update payloads (cloud → bridge) and for the
//! device "shadow" sent back to the cloud. The telemetry keys are only ever
//! populated on outbound messages.

pub const APPLICATION_EUI: &str = "applicationEui";
pub const DEVICE_EUI: &str = "deviceEui";
pub const STATE: &str = "state";
pub const DEV_ADDR: &str = "devAddr";
pub const APP_KEY: &str = "appKey";
pub const APP_SESSION_KEY: &str = "appSKey";
pub const NETWORK_SESSION_KEY: &str = "nwkSKey";
pub const FRAME_COUNT_UP: &str = "fCntUp";
pub const FRAME_COUNT_DOWN: &str = "fCntDn";
pub const RELAXED_COUNTER: &str = "relaxedCounter";
pub const KEY_WARNING: &str = "keyWarning";

// Read-only telemetry
pub const GATEWAY_EUI: &str = "gatewayEui";
pub const RSSI: &str = "rssi";
pub const SNR: &str = "snr";
pub const FREQUENCY: &str = "frequency";
pub const DATA_RATE: &str = "dataRate";
