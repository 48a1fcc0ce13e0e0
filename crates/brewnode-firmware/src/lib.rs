//! ESP32-S3 firmware-specific modules for brewnode
//!
//! This crate contains the hardware-specific halves of the core's seams:
//! the build-time node configuration, Wi-Fi association, the TCP transport
//! over `embassy-net`, and RTC deep sleep.

#![no_std]

extern crate alloc;

pub mod config;
pub mod net;
pub mod power;
pub mod wifi;

use thiserror_no_std::Error;

/// Bring-up failures before the wake cycle can talk to the network.
#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("radio controller could not be initialized")]
    RadioInit,
    #[error("Wi-Fi driver error: {0:?}")]
    Wifi(esp_radio::wifi::WifiError),
    #[error("network did not come up within {0} ms")]
    JoinTimeout(u32),
    #[error("network task could not be spawned")]
    Spawn,
}

impl From<esp_radio::wifi::WifiError> for FirmwareError {
    fn from(error: esp_radio::wifi::WifiError) -> Self {
        Self::Wifi(error)
    }
}
