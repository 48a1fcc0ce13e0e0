//! A simulated MPU-6050 behind an I2C bus.
//!
//! The device is a register file: the core's `Mpu6050` driver talks to it
//! exactly as it talks to the real chip. Acceleration and temperature
//! registers are refreshed from a slowly rocking tilt profile whenever they
//! are read while the device is awake.

use brewnode_core::sensors::mpu6050::{
    PWR_SLEEP, REG_ACCEL_XOUT_H, REG_PWR_MGMT_1, REG_TEMP_OUT_H, REG_WHO_AM_I, WHO_AM_I_EXPECTED,
};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation};
use embedded_hal_async::i2c::{ErrorType, I2c};

const REGISTER_COUNT: usize = 128;

/// LSB per g in the ±2 g range.
const ONE_G: f64 = 16384.0;

/// Generates a hydrometer-like tilt that drifts as the brew ferments.
pub struct TiltProfile {
    /// Seconds of simulated time.
    elapsed_secs: f64,
}

impl TiltProfile {
    pub fn new() -> Self {
        Self { elapsed_secs: 0.0 }
    }

    /// Advance the clock and return the gravity vector in g.
    fn next_vector(&mut self, dt_secs: f64) -> (f64, f64, f64) {
        self.elapsed_secs += dt_secs;
        let t = self.elapsed_secs;

        // 40–70° from vertical with a slow swing and a little bobbing
        let tilt = (55.0 + 15.0 * (t / 600.0).sin() + 0.4 * (t / 3.0).cos()).to_radians();
        let roll = 0.05 * (t / 37.0).sin();

        (tilt.sin(), roll, tilt.cos())
    }

    fn temperature(&self) -> f64 {
        19.0 + 1.5 * (self.elapsed_secs / 900.0).sin()
    }
}

impl Default for TiltProfile {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SimulatedMpu {
    address: u8,
    registers: [u8; REGISTER_COUNT],
    pointer: usize,
    profile: TiltProfile,
}

impl SimulatedMpu {
    /// A device at `address` in its power-on state (asleep).
    pub fn new(address: u8, profile: TiltProfile) -> Self {
        let mut registers = [0; REGISTER_COUNT];
        registers[usize::from(REG_WHO_AM_I)] = WHO_AM_I_EXPECTED;
        registers[usize::from(REG_PWR_MGMT_1)] = PWR_SLEEP;

        Self {
            address,
            registers,
            pointer: 0,
            profile,
        }
    }

    pub fn is_asleep(&self) -> bool {
        self.registers[usize::from(REG_PWR_MGMT_1)] & PWR_SLEEP != 0
    }

    fn store_pair(&mut self, register: u8, value: i16) {
        let [high, low] = value.to_be_bytes();
        self.registers[usize::from(register)] = high;
        self.registers[usize::from(register) + 1] = low;
    }

    /// Latch a fresh measurement, the way the chip updates its output
    /// registers at the sample rate.
    fn latch_measurement(&mut self) {
        let (x, y, z) = self.profile.next_vector(1.0);
        let raw = |g: f64| (g * ONE_G).round().clamp(i16::MIN.into(), i16::MAX.into()) as i16;

        self.store_pair(REG_ACCEL_XOUT_H, raw(x));
        self.store_pair(REG_ACCEL_XOUT_H + 2, raw(y));
        self.store_pair(REG_ACCEL_XOUT_H + 4, raw(z));

        let temperature = ((self.profile.temperature() - 36.53) * 340.0).round() as i16;
        self.store_pair(REG_TEMP_OUT_H, temperature);
    }
}

impl ErrorType for SimulatedMpu {
    type Error = ErrorKind;
}

impl I2c for SimulatedMpu {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((&register, values)) = bytes.split_first() {
                        self.pointer = usize::from(register);
                        for value in values {
                            self.registers[self.pointer % REGISTER_COUNT] = *value;
                            self.pointer += 1;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    if self.pointer == usize::from(REG_ACCEL_XOUT_H) && !self.is_asleep() {
                        self.latch_measurement();
                    }
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[self.pointer % REGISTER_COUNT];
                        self.pointer += 1;
                    }
                }
            }
        }

        Ok(())
    }
}
