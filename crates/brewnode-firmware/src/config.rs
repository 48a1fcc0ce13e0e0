//! The node configuration, fixed at build time.
//!
//! `build.rs` generates `NODE_CONFIG` from `BREWNODE_*` environment
//! variables (or `.env`). There is no runtime reconfiguration.

use brewnode_core::config::{
    AccelConfig, CollectorConfig, DEFAULT_BUS_FREQUENCY_KHZ, DEFAULT_BUS_TIMEOUT_MS,
    DEFAULT_JOIN_TIMEOUT_MS, MAX_DELIVERY_ATTEMPTS, NetworkConfig, RetryPolicy, SamplingConfig,
};
use brewnode_core::{DeviceIdentity, FilterSeed, NodeConfig};

include!(concat!(env!("OUT_DIR"), "/node_config.rs"));

const _: () = assert!(
    NODE_CONFIG.sampling.measurement_count > 0,
    "BREWNODE_NB_MEASURE must be at least 1"
);
const _: () = assert!(
    NODE_CONFIG.sleep_duration_us > 0,
    "BREWNODE_SLEEP_TIME_US must be non-zero"
);
