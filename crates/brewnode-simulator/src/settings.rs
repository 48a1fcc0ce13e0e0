//! Simulator configuration from the environment.
//!
//! The node's own settings use the same `BREWNODE_*` keys as the firmware
//! build. `BREWNODE_CONFIG` may instead point at a JSON file holding a whole
//! `NodeConfig`. Without a collector host the simulator starts its own
//! collector on loopback.

use std::env;
use std::error::Error;
use std::fs;
use std::str::FromStr;

use brewnode_core::config::{CollectorConfig, DEFAULT_COLLECTOR_PATH, NodeConfig};
use brewnode_core::DeviceIdentity;

type BoxError = Box<dyn Error>;

const DEFAULT_SENSOR_ID: u32 = 1;
const DEFAULT_SECRET: &str = "simulated";
const DEFAULT_CYCLES: u32 = 3;
/// One simulated second of deep sleep per real millisecond.
const DEFAULT_TIME_SCALE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    json: Option<String>,
    collector_host: Option<String>,
    collector_port: Option<u16>,
    pub collector_path: String,
    pub sensor_id: u32,
    pub secret: String,
    sleep_duration_us: Option<u64>,
    measurement_count: Option<u16>,
    filter_alpha: Option<f32>,
    pub cycles: u32,
    pub time_scale: f64,
}

fn parse<T>(key: &str) -> Result<Option<T>, BoxError>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| format!("{key}: {e}").into()),
        Err(_) => Ok(None),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, BoxError> {
        let json = match env::var("BREWNODE_CONFIG") {
            Ok(path) => Some(fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?),
            Err(_) => None,
        };

        Ok(Self {
            json,
            collector_host: env::var("BREWNODE_COLLECTOR_HOST").ok(),
            collector_port: parse("BREWNODE_COLLECTOR_PORT")?,
            collector_path: env::var("BREWNODE_COLLECTOR_PATH")
                .unwrap_or_else(|_| DEFAULT_COLLECTOR_PATH.to_owned()),
            sensor_id: parse("BREWNODE_SENSOR_ID")?.unwrap_or(DEFAULT_SENSOR_ID),
            secret: env::var("BREWNODE_SENSOR_SECRET").unwrap_or_else(|_| DEFAULT_SECRET.to_owned()),
            sleep_duration_us: parse("BREWNODE_SLEEP_TIME_US")?,
            measurement_count: parse("BREWNODE_NB_MEASURE")?,
            filter_alpha: parse("BREWNODE_G_FILTER")?,
            cycles: parse("BREWNODE_SIM_CYCLES")?.unwrap_or(DEFAULT_CYCLES),
            time_scale: parse("BREWNODE_SIM_TIME_SCALE")?.unwrap_or(DEFAULT_TIME_SCALE),
        })
    }

    /// Whether the simulator has to provide the collector itself.
    pub fn needs_local_collector(&self) -> bool {
        self.json.is_none() && self.collector_host.is_none()
    }

    /// Build the node configuration. `local_port` is the port of the
    /// simulator's own collector, if one is running.
    pub fn node_config(&self, local_port: Option<u16>) -> Result<NodeConfig<'_>, BoxError> {
        if let Some(json) = &self.json {
            return serde_json::from_str(json).map_err(|e| format!("BREWNODE_CONFIG: {e}").into());
        }

        let defaults = NodeConfig::default();
        let host = self.collector_host.as_deref().unwrap_or("127.0.0.1");
        let port = self
            .collector_port
            .or(local_port)
            .unwrap_or(defaults.collector.port);

        let mut config = NodeConfig {
            collector: CollectorConfig {
                host,
                port,
                path: &self.collector_path,
            },
            identity: DeviceIdentity::new(self.sensor_id, &self.secret),
            ..defaults
        };

        if let Some(duration) = self.sleep_duration_us {
            config.sleep_duration_us = duration;
        }
        if let Some(count) = self.measurement_count {
            config.sampling.measurement_count = count;
        }
        if let Some(alpha) = self.filter_alpha {
            config.sampling.filter_alpha = alpha;
        }

        Ok(config)
    }
}
