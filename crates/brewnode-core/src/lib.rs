//! Hardware-independent core library for brewnode
//!
//! This crate contains all platform-agnostic logic of the brewnode tilt sensor:
//! the MPU-6050 driver, sample filtering, report encoding, the collector wire
//! format, the bounded-retry network reporter and the wake-cycle scheduler.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).
//! Every collaborator (I2C bus, network stack, delay, deep sleep) is reached
//! through a trait so the same cycle runs on hardware and in tests.

#![no_std]

extern crate alloc;

pub mod config;
pub mod filter;
pub mod report;
pub mod reporter;
pub mod scheduler;
pub mod sensors;
pub mod timeout;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, DeviceIdentity, NodeConfig};
pub use filter::{FilterSeed, FilteredVector, SampleError};
pub use report::Report;
pub use reporter::{Ack, ReportError, Reporter, Transport, TransportError};
pub use scheduler::{
    CycleInputs, CycleOutcome, CycleState, ReportStatus, SleepControl, enter_sleep, run_cycle,
};
pub use sensors::{AccelVector, Accelerometer, RawSample, SensorError, SensorReader};
