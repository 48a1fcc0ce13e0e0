pub mod mpu6050;

pub use mpu6050::Mpu6050;

use core::f32::consts::PI;

use thiserror_no_std::Error;

/// Failures while talking to a sensor over its bus.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} timed out")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Register counts as read from the device, one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Decode the big-endian X/Y/Z register burst.
    pub fn from_be_bytes(data: [u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([data[0], data[1]]),
            y: i16::from_be_bytes([data[2], data[3]]),
            z: i16::from_be_bytes([data[4], data[5]]),
        }
    }
}

/// Acceleration in g.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AccelVector {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Scale raw counts by the device's one-g count.
    pub fn from_raw(raw: RawSample, one_g: f32) -> Self {
        Self {
            x: f32::from(raw.x) / one_g,
            y: f32::from(raw.y) / one_g,
            z: f32::from(raw.z) / one_g,
        }
    }

    pub fn magnitude(&self) -> f32 {
        libm::sqrtf(self.x * self.x + self.y * self.y + self.z * self.z)
    }

    /// Angle between this vector and the sensor's Z axis, in degrees.
    ///
    /// A node lying flat reads 0°, one standing on its side reads 90°.
    pub fn tilt_degrees(&self) -> f32 {
        let horizontal = libm::sqrtf(self.x * self.x + self.y * self.y);
        libm::atan2f(horizontal, self.z) * 180.0 / PI
    }
}

/// A three-axis accelerometer reachable over some bus.
///
/// Every method performs bus I/O and must complete or fail within the
/// implementation's own bus timeout.
pub trait Accelerometer {
    /// Sensor name used in logs and errors.
    const NAME: &'static str;

    /// One bus transaction returning the current X/Y/Z counts.
    fn read_raw(&mut self) -> impl Future<Output = Result<RawSample, SensorError>>;

    /// Die temperature in °C.
    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;

    /// Put the sensor into its own low-power mode until the next wake.
    fn power_down(&mut self) -> impl Future<Output = Result<(), SensorError>>;
}

impl<A: Accelerometer> Accelerometer for &mut A {
    const NAME: &'static str = A::NAME;

    fn read_raw(&mut self) -> impl Future<Output = Result<RawSample, SensorError>> {
        (**self).read_raw()
    }

    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>> {
        (**self).read_temperature()
    }

    fn power_down(&mut self) -> impl Future<Output = Result<(), SensorError>> {
        (**self).power_down()
    }
}

/// Reads an accelerometer and converts its counts to g.
///
/// No retry happens here: a failed transaction is returned to the caller,
/// which decides whether the cycle goes on.
pub struct SensorReader<A> {
    sensor: A,
    one_g: f32,
}

impl<A: Accelerometer> SensorReader<A> {
    pub const fn new(sensor: A, one_g: f32) -> Self {
        Self { sensor, one_g }
    }

    pub async fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        self.sensor.read_raw().await
    }

    pub async fn read_scaled(&mut self) -> Result<AccelVector, SensorError> {
        let raw = self.read_raw().await?;
        Ok(AccelVector::from_raw(raw, self.one_g))
    }

    pub fn sensor_mut(&mut self) -> &mut A {
        &mut self.sensor
    }

    pub fn into_inner(self) -> A {
        self.sensor
    }
}
