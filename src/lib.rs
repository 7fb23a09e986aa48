//! Bridge between a cloud device-management control stream and a local
//! LoRaWAN network server.

pub mod config;
pub mod grpc;
pub mod gw;
pub mod lora;

#[cfg(test)]
mod testutil;
