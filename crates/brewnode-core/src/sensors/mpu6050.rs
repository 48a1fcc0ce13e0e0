//! Register-level async driver for the InvenSense MPU-6050.
//!
//! Only the accelerometer and the die temperature are used; the gyroscope
//! stays in its power-on state. Every transaction is bounded by the bus
//! timeout given at construction.

use embedded_hal::i2c::{Error as _, ErrorKind};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info, warn};

use super::{Accelerometer, RawSample, SensorError};
use crate::timeout::{Elapsed, with_timeout};

const NAME: &str = "MPU6050";

// Register map
pub const REG_CONFIG: u8 = 0x1A;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_TEMP_OUT_H: u8 = 0x41;
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_WHO_AM_I: u8 = 0x75;

pub const WHO_AM_I_EXPECTED: u8 = 0x68;

/// PLL with X axis gyroscope reference, sleep bit clear.
pub const PWR_WAKE_PLL_X: u8 = 0x01;
pub const PWR_SLEEP: u8 = 0x40;
/// Digital low-pass filter at 44 Hz.
const DLPF_44HZ: u8 = 0x03;
/// ±2 g full scale, 16384 LSB/g.
pub const ACCEL_RANGE_2G: u8 = 0x00;

pub struct Mpu6050<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    bus_timeout_ms: u32,
    initialized: bool,
}

impl<I: I2c, D: DelayNs> Mpu6050<I, D> {
    pub fn new(i2c: I, delay: D, address: u8, bus_timeout_ms: u32) -> Self {
        Self {
            i2c,
            delay,
            address,
            bus_timeout_ms,
            initialized: false,
        }
    }

    /// Check the device identity, wake it and select the ±2 g range.
    ///
    /// Called automatically before the first read after construction or
    /// after [`Accelerometer::power_down`].
    pub async fn initialize(&mut self) -> Result<(), SensorError> {
        let mut who_am_i = [0u8; 1];
        self.read_registers(REG_WHO_AM_I, &mut who_am_i, "read WHO_AM_I")
            .await?;

        if who_am_i[0] != WHO_AM_I_EXPECTED {
            error!(
                "{} answered WHO_AM_I with {:#04x}, expected {:#04x}",
                NAME, who_am_i[0], WHO_AM_I_EXPECTED
            );
            return Err(SensorError::InitializationFailed {
                sensor: NAME,
                details: "unexpected WHO_AM_I response",
            });
        }

        self.write_register(REG_PWR_MGMT_1, PWR_WAKE_PLL_X, "wake device")
            .await?;
        self.write_register(REG_CONFIG, DLPF_44HZ, "configure low-pass filter")
            .await?;
        self.write_register(REG_ACCEL_CONFIG, ACCEL_RANGE_2G, "select accelerometer range")
            .await?;

        self.initialized = true;
        info!("{} initialized at {:#04x} (±2g, DLPF 44Hz)", NAME, self.address);

        Ok(())
    }

    /// Give back the bus and the delay.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    async fn ensure_initialized(&mut self) -> Result<(), SensorError> {
        if !self.initialized {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn read_registers(
        &mut self,
        register: u8,
        buffer: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        let address = self.address;
        let result = with_timeout(
            &mut self.delay,
            self.bus_timeout_ms,
            self.i2c.write_read(address, &[register], buffer),
        )
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(bus_error(e, operation)),
            Err(Elapsed) => Err(bus_timeout(operation, self.bus_timeout_ms)),
        }
    }

    async fn write_register(
        &mut self,
        register: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        let address = self.address;
        let result = with_timeout(
            &mut self.delay,
            self.bus_timeout_ms,
            self.i2c.write(address, &[register, value]),
        )
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(bus_error(e, operation)),
            Err(Elapsed) => Err(bus_timeout(operation, self.bus_timeout_ms)),
        }
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(error: E, operation: &'static str) -> SensorError {
    error!("{} {} failed: {:?}", NAME, operation, error);

    let details = match error.kind() {
        ErrorKind::NoAcknowledge(_) => "no acknowledgement from device",
        ErrorKind::ArbitrationLoss => "bus arbitration lost",
        ErrorKind::Bus => "bus error",
        ErrorKind::Overrun => "data overrun",
        _ => "I2C communication error",
    };

    SensorError::ReadFailed {
        sensor: NAME,
        operation,
        details,
    }
}

fn bus_timeout(operation: &'static str, timeout_ms: u32) -> SensorError {
    warn!("{} {} timed out after {} ms", NAME, operation, timeout_ms);
    SensorError::Timeout {
        sensor: NAME,
        operation,
    }
}

impl<I: I2c, D: DelayNs> Accelerometer for Mpu6050<I, D> {
    const NAME: &'static str = NAME;

    async fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        self.ensure_initialized().await?;

        let mut data = [0u8; 6];
        self.read_registers(REG_ACCEL_XOUT_H, &mut data, "read acceleration")
            .await?;

        let sample = RawSample::from_be_bytes(data);
        debug!("{} raw sample {:?}", NAME, sample);

        Ok(sample)
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.ensure_initialized().await?;

        let mut data = [0u8; 2];
        self.read_registers(REG_TEMP_OUT_H, &mut data, "read temperature")
            .await?;

        // Datasheet conversion: °C = raw / 340 + 36.53
        let raw = i16::from_be_bytes(data);
        Ok(f32::from(raw) / 340.0 + 36.53)
    }

    async fn power_down(&mut self) -> Result<(), SensorError> {
        self.write_register(REG_PWR_MGMT_1, PWR_SLEEP, "enter sleep mode")
            .await?;
        self.initialized = false;
        debug!("{} in sleep mode", NAME);
        Ok(())
    }
}
