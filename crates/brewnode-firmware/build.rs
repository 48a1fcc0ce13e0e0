//! Compiles the node configuration into the firmware.
//!
//! Values come from the environment, optionally loaded from a `.env` file
//! next to this crate. Missing keys fall back to the hardware defaults.
//! The result is written to `$OUT_DIR/node_config.rs` as a `const`.

use std::env;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

fn value(key: &str) -> Option<String> {
    println!("cargo:rerun-if-env-changed={key}");
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn text(key: &str, default: &str) -> String {
    value(key).unwrap_or_else(|| default.to_owned())
}

fn number<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match value(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key}={raw:?} is not a valid number: {e}")),
        None => default,
    }
}

fn address(key: &str, default: u8) -> u8 {
    match value(key) {
        Some(raw) => {
            let raw = raw.trim();
            let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
                Some(hex) => u8::from_str_radix(hex, 16),
                None => raw.parse(),
            };
            parsed.unwrap_or_else(|e| panic!("{key}={raw:?} is not a valid I2C address: {e}"))
        }
        None => default,
    }
}

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rerun-if-changed=.env");

    // A missing .env file only means defaults are used
    let _ = dotenvy::dotenv();

    let ssid = text("BREWNODE_WIFI_SSID", "");
    let password = text("BREWNODE_WIFI_PASSWORD", "");
    let host = text("BREWNODE_COLLECTOR_HOST", "");
    let port: u16 = number("BREWNODE_COLLECTOR_PORT", 80);
    let path = text("BREWNODE_COLLECTOR_PATH", "/storage/sensor/add_data");
    let sensor_id: u32 = number("BREWNODE_SENSOR_ID", 0);
    let secret = text("BREWNODE_SENSOR_SECRET", "");

    let mpu_address = address("BREWNODE_MPU_ADDRESS", 0x68);
    let sda_pin: u8 = number("BREWNODE_SDA_PIN", 4);
    let scl_pin: u8 = number("BREWNODE_SCL_PIN", 3);
    let one_g: f32 = number("BREWNODE_MPU_1G", 16384.0);
    let filter_alpha: f32 = number("BREWNODE_G_FILTER", 0.01);
    let measurement_count: u16 = number("BREWNODE_NB_MEASURE", 10);
    let sleep_duration_us: u64 = number("BREWNODE_SLEEP_TIME_US", 600_000_000);

    if host.is_empty() {
        println!("cargo:warning=BREWNODE_COLLECTOR_HOST is not set; every report will be dropped");
    }

    let generated = format!(
        "pub const NODE_CONFIG: NodeConfig<'static> = NodeConfig {{
    network: NetworkConfig {{
        ssid: {ssid:?},
        password: {password:?},
        join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
    }},
    collector: CollectorConfig {{
        host: {host:?},
        port: {port},
        path: {path:?},
    }},
    identity: DeviceIdentity::new({sensor_id}, {secret:?}),
    accel: AccelConfig {{
        address: {mpu_address:#04x},
        sda_pin: {sda_pin},
        scl_pin: {scl_pin},
        frequency_khz: DEFAULT_BUS_FREQUENCY_KHZ,
        one_g: {one_g:?},
        bus_timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
    }},
    sampling: SamplingConfig {{
        filter_alpha: {filter_alpha:?},
        measurement_count: {measurement_count},
        seed: FilterSeed::FirstSample,
    }},
    retry: RetryPolicy {{
        max_attempts: MAX_DELIVERY_ATTEMPTS,
        connect_timeout_ms: 1_000,
        ack_timeout_ms: 1_000,
        retry_delay_ms: 200,
    }},
    sleep_duration_us: {sleep_duration_us},
}};
"
    );

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::write(out_dir.join("node_config.rs"), generated).expect("failed to write node_config.rs");
}
