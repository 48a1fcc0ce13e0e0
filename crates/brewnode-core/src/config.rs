//! Provisioning-time configuration of a node.
//!
//! A [`NodeConfig`] is built once (from generated constants on the device,
//! from the environment in the simulator) and handed by reference to every
//! wake cycle. Nothing in it changes at runtime.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::filter::FilterSeed;

/// Default 7-bit I2C address of the MPU-6050 (AD0 low).
pub const DEFAULT_MPU_ADDRESS: u8 = 0x68;
/// Raw count for 1 g at the ±2 g full-scale range.
pub const DEFAULT_ONE_G: f32 = 16384.0;
pub const DEFAULT_FILTER_ALPHA: f32 = 0.01;
pub const DEFAULT_MEASUREMENT_COUNT: u16 = 10;
/// Ten minutes.
pub const DEFAULT_SLEEP_DURATION_US: u64 = 600_000_000;
pub const DEFAULT_COLLECTOR_PORT: u16 = 80;
pub const DEFAULT_COLLECTOR_PATH: &str = "/storage/sensor/add_data";

pub const DEFAULT_SDA_PIN: u8 = 4;
pub const DEFAULT_SCL_PIN: u8 = 3;
pub const DEFAULT_BUS_FREQUENCY_KHZ: u32 = 400;
pub const DEFAULT_BUS_TIMEOUT_MS: u32 = 50;
pub const DEFAULT_JOIN_TIMEOUT_MS: u32 = 10_000;

/// Upper bound on delivery attempts per cycle.
pub const MAX_DELIVERY_ATTEMPTS: u8 = 3;
/// Ceiling on the worst-case time the reporter may spend in one cycle.
pub const NETWORK_BUDGET_CEILING_MS: u32 = 8_000;

/// Bus transactions issued per cycle on top of the measurement reads:
/// identity check, wake, filter and range setup, temperature, power-down.
const BUS_OVERHEAD_TRANSACTIONS: u64 = 6;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("measurement count must be at least 1")]
    ZeroMeasurementCount,
    #[error("filter coefficient {0} is outside the open interval (0, 1)")]
    FilterCoefficientOutOfRange(f32),
    #[error("one-g constant {0} must be a positive number")]
    InvalidOneG(f32),
    #[error("bus timeout must be non-zero")]
    ZeroBusTimeout,
    #[error("delivery attempts {0} must be between 1 and 3")]
    AttemptsOutOfRange(u8),
    #[error("connect and acknowledgement timeouts must be non-zero")]
    ZeroNetworkTimeout,
    #[error("worst-case network time {0} ms exceeds the per-cycle ceiling")]
    NetworkBudgetExceeded(u32),
    #[error("collector host is empty")]
    EmptyCollectorHost,
    #[error("collector port must be non-zero")]
    ZeroCollectorPort,
    #[error("sleep duration must be non-zero")]
    ZeroSleepDuration,
}

/// Everything a node needs to run a wake cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NodeConfig<'a> {
    #[serde(borrow)]
    pub network: NetworkConfig<'a>,
    #[serde(borrow)]
    pub collector: CollectorConfig<'a>,
    #[serde(borrow)]
    pub identity: DeviceIdentity<'a>,
    #[serde(default)]
    pub accel: AccelConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_sleep_duration_us")]
    pub sleep_duration_us: u64,
}

fn default_sleep_duration_us() -> u64 {
    DEFAULT_SLEEP_DURATION_US
}

impl Default for NodeConfig<'_> {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            collector: CollectorConfig::default(),
            identity: DeviceIdentity::default(),
            accel: AccelConfig::default(),
            sampling: SamplingConfig::default(),
            retry: RetryPolicy::default(),
            sleep_duration_us: DEFAULT_SLEEP_DURATION_US,
        }
    }
}

impl NodeConfig<'_> {
    /// Check every constraint the wake cycle relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling.validate()?;
        self.accel.validate()?;
        self.retry.validate()?;
        self.collector.validate()?;

        if self.sleep_duration_us == 0 {
            return Err(ConfigError::ZeroSleepDuration);
        }

        Ok(())
    }

    /// Sleep duration to use even when the rest of the configuration is
    /// unusable. A node must never skip its sleep.
    pub fn effective_sleep_duration_us(&self) -> u64 {
        if self.sleep_duration_us == 0 {
            DEFAULT_SLEEP_DURATION_US
        } else {
            self.sleep_duration_us
        }
    }

    /// Worst-case wall-clock time of one wake cycle, in milliseconds.
    pub fn cycle_budget_ms(&self) -> u64 {
        let bus_transactions = u64::from(self.sampling.measurement_count) + BUS_OVERHEAD_TRANSACTIONS;
        let sampling = bus_transactions * u64::from(self.accel.bus_timeout_ms);

        sampling + u64::from(self.retry.worst_case_ms())
    }
}

/// Wi-Fi credentials. Only the firmware's association step reads these.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u32,
}

fn default_join_timeout_ms() -> u32 {
    DEFAULT_JOIN_TIMEOUT_MS
}

impl Default for NetworkConfig<'_> {
    fn default() -> Self {
        Self {
            ssid: "",
            password: "",
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

impl fmt::Debug for NetworkConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("join_timeout_ms", &self.join_timeout_ms)
            .finish()
    }
}

/// Where reports are delivered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    #[serde(default = "default_collector_path")]
    pub path: &'a str,
}

fn default_collector_path() -> &'static str {
    DEFAULT_COLLECTOR_PATH
}

impl Default for CollectorConfig<'_> {
    fn default() -> Self {
        Self {
            host: "",
            port: DEFAULT_COLLECTOR_PORT,
            path: DEFAULT_COLLECTOR_PATH,
        }
    }
}

impl CollectorConfig<'_> {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyCollectorHost);
        }
        if self.port == 0 {
            return Err(ConfigError::ZeroCollectorPort);
        }
        Ok(())
    }
}

/// Identity the collector authenticates a report with.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceIdentity<'a> {
    pub sensor_id: u32,
    pub secret: &'a str,
}

impl<'a> DeviceIdentity<'a> {
    pub const fn new(sensor_id: u32, secret: &'a str) -> Self {
        Self { sensor_id, secret }
    }
}

impl fmt::Debug for DeviceIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("sensor_id", &self.sensor_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Accelerometer wiring and scaling.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AccelConfig {
    pub address: u8,
    pub sda_pin: u8,
    pub scl_pin: u8,
    pub frequency_khz: u32,
    /// Raw count that corresponds to 1 g.
    pub one_g: f32,
    /// Upper bound on a single bus transaction.
    pub bus_timeout_ms: u32,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_MPU_ADDRESS,
            sda_pin: DEFAULT_SDA_PIN,
            scl_pin: DEFAULT_SCL_PIN,
            frequency_khz: DEFAULT_BUS_FREQUENCY_KHZ,
            one_g: DEFAULT_ONE_G,
            bus_timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
        }
    }
}

impl AccelConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN fails too.
        if !(self.one_g > 0.0) || !self.one_g.is_finite() {
            return Err(ConfigError::InvalidOneG(self.one_g));
        }
        if self.bus_timeout_ms == 0 {
            return Err(ConfigError::ZeroBusTimeout);
        }
        Ok(())
    }
}

/// How repeated reads are combined into one vector.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Smoothing weight given to each new read, in (0, 1).
    pub filter_alpha: f32,
    pub measurement_count: u16,
    pub seed: FilterSeed,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            filter_alpha: DEFAULT_FILTER_ALPHA,
            measurement_count: DEFAULT_MEASUREMENT_COUNT,
            seed: FilterSeed::default(),
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.measurement_count == 0 {
            return Err(ConfigError::ZeroMeasurementCount);
        }
        if !(self.filter_alpha > 0.0 && self.filter_alpha < 1.0) {
            return Err(ConfigError::FilterCoefficientOutOfRange(self.filter_alpha));
        }
        Ok(())
    }
}

/// Delivery attempts and the timeouts that bound each of them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub connect_timeout_ms: u32,
    pub ack_timeout_ms: u32,
    /// Fixed pause between two attempts. There is no backoff growth.
    pub retry_delay_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            connect_timeout_ms: 1_000,
            ack_timeout_ms: 1_000,
            retry_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Longest time one attempt can take, connect plus acknowledgement.
    ///
    /// Transports that carry their own inactivity timeout set it to this, so
    /// the reporter's per-stage timeouts always elapse first.
    pub fn attempt_ms(&self) -> u32 {
        self.connect_timeout_ms.saturating_add(self.ack_timeout_ms)
    }

    /// Longest time the reporter can spend on one report.
    pub fn worst_case_ms(&self) -> u32 {
        let attempts = u32::from(self.max_attempts);
        let per_attempt = self.attempt_ms();
        let pauses = attempts.saturating_sub(1).saturating_mul(self.retry_delay_ms);

        attempts.saturating_mul(per_attempt).saturating_add(pauses)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_DELIVERY_ATTEMPTS {
            return Err(ConfigError::AttemptsOutOfRange(self.max_attempts));
        }
        if self.connect_timeout_ms == 0 || self.ack_timeout_ms == 0 {
            return Err(ConfigError::ZeroNetworkTimeout);
        }

        let worst_case = self.worst_case_ms();
        if worst_case > NETWORK_BUDGET_CEILING_MS {
            return Err(ConfigError::NetworkBudgetExceeded(worst_case));
        }

        Ok(())
    }
}
