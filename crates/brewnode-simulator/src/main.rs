//! Desktop simulator for the brewnode tilt sensor node.
//!
//! Runs the core's wake cycle against a simulated MPU-6050 and a real TCP
//! connection, so the whole sample → filter → report → sleep path can be
//! exercised without hardware. Unless a collector host is configured, a
//! local collector is started on loopback and the node reports to it.
//!
//! # Environment
//!
//! | Variable                  | Meaning                                      |
//! |---------------------------|----------------------------------------------|
//! | `BREWNODE_CONFIG`         | JSON file with a complete node configuration |
//! | `BREWNODE_COLLECTOR_HOST` | Report to this collector instead             |
//! | `BREWNODE_COLLECTOR_PORT` | Collector port                               |
//! | `BREWNODE_COLLECTOR_PATH` | Endpoint path, also served by the local one  |
//! | `BREWNODE_SENSOR_ID`      | Sensor identifier                            |
//! | `BREWNODE_SENSOR_SECRET`  | Sensor secret                                |
//! | `BREWNODE_SLEEP_TIME_US`  | Deep-sleep duration                          |
//! | `BREWNODE_NB_MEASURE`     | Reads per filtered sample                    |
//! | `BREWNODE_G_FILTER`       | Filter coefficient                           |
//! | `BREWNODE_SIM_CYCLES`     | Wake cycles to run                           |
//! | `BREWNODE_SIM_TIME_SCALE` | Real seconds per simulated second of sleep   |
//!
//! A `.env` file in the working directory is loaded first.

mod collector;
mod net;
mod settings;
mod sim_sensor;

use std::error::Error;
use std::time::{SystemTime, UNIX_EPOCH};

use brewnode_core::sensors::Mpu6050;
use brewnode_core::{CycleInputs, CycleOutcome, ReportStatus, enter_sleep, run_cycle};
use embassy_futures::block_on;
use log::{info, warn};

use collector::FakeCollector;
use net::{StdDelay, StdTransport, ThreadSleep};
use settings::Settings;
use sim_sensor::{SimulatedMpu, TiltProfile};

// ---------------------------------------------------------------------------
// Simulated platform inputs
// ---------------------------------------------------------------------------

/// Battery voltage of a LiPo cell slowly discharging over the cycles.
fn battery_volts(cycle: u32) -> f32 {
    (4.15 - 0.002 * cycle as f32).max(3.3)
}

fn unix_timestamp() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

fn log_outcome(cycle: u32, outcome: &CycleOutcome) {
    match (&outcome.sample, &outcome.report) {
        (Ok(sample), ReportStatus::Delivered(ack)) => info!(
            "Cycle {}: tilt {:.2}° from {} reads, delivered (HTTP {})",
            cycle,
            sample.vector.tilt_degrees(),
            sample.samples,
            ack.status
        ),
        (Ok(_), ReportStatus::Failed(e)) => warn!(
            "Cycle {}: report lost after {} attempt(s): {}",
            cycle, outcome.attempts, e
        ),
        (Err(e), _) => warn!("Cycle {}: no sample: {}", cycle, e),
        (Ok(_), ReportStatus::Skipped) => warn!("Cycle {}: report skipped", cycle),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();
    env_logger::init();
    info!("Starting brewnode simulator");

    let settings = Settings::from_env()?;

    let local_collector = if settings.needs_local_collector() {
        Some(FakeCollector::spawn(
            &settings.collector_path,
            &[(settings.sensor_id, settings.secret.as_str())],
        )?)
    } else {
        None
    };

    let config = settings.node_config(local_collector.as_ref().map(FakeCollector::port))?;
    config.validate().map_err(|e| e.to_string())?;
    info!(
        "Sensor {} reporting to {}:{}{}, cycle budget {} ms",
        config.identity.sensor_id,
        config.collector.host,
        config.collector.port,
        config.collector.path,
        config.cycle_budget_ms()
    );

    let device = SimulatedMpu::new(config.accel.address, TiltProfile::new());
    let mut sensor = Mpu6050::new(device, StdDelay, config.accel.address, config.accel.bus_timeout_ms);
    let mut transport = StdTransport::new(&config.retry);
    let mut delay = StdDelay;
    let mut sleeper = ThreadSleep::new(settings.time_scale);

    for cycle in 1..=settings.cycles {
        let inputs = CycleInputs {
            timestamp: unix_timestamp(),
            battery_volts: Some(battery_volts(cycle)),
        };

        let outcome = block_on(run_cycle(&config, &mut sensor, &mut transport, &mut delay, inputs));
        log_outcome(cycle, &outcome);
        enter_sleep(&outcome, &mut sleeper);
    }

    if let Some(collector) = local_collector {
        info!("Collector holds {} datapoint(s)", collector.datapoints().len());
    }

    info!("Simulator exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewnode_core::config::{CollectorConfig, DEFAULT_COLLECTOR_PATH, RetryPolicy};
    use brewnode_core::{CycleState, DeviceIdentity, NodeConfig, ReportError};
    use std::time::Instant;

    fn config(port: u16, secret: &str) -> NodeConfig<'_> {
        NodeConfig {
            collector: CollectorConfig {
                host: "127.0.0.1",
                port,
                path: DEFAULT_COLLECTOR_PATH,
            },
            identity: DeviceIdentity::new(5, secret),
            retry: RetryPolicy {
                connect_timeout_ms: 500,
                ack_timeout_ms: 500,
                retry_delay_ms: 10,
                ..RetryPolicy::default()
            },
            ..NodeConfig::default()
        }
    }

    fn cycle(config: &NodeConfig<'_>) -> CycleOutcome {
        let device = SimulatedMpu::new(config.accel.address, TiltProfile::new());
        let mut sensor = Mpu6050::new(device, StdDelay, config.accel.address, config.accel.bus_timeout_ms);
        let mut transport = StdTransport::new(&config.retry);

        block_on(run_cycle(
            config,
            &mut sensor,
            &mut transport,
            &mut StdDelay,
            CycleInputs {
                timestamp: Some(1_700_000_000),
                battery_volts: Some(battery_volts(1)),
            },
        ))
    }

    #[test]
    fn test_cycle_reaches_local_collector() {
        let collector = FakeCollector::spawn(DEFAULT_COLLECTOR_PATH, &[(5, "wort")]).unwrap();
        let config = config(collector.port(), "wort");

        let outcome = cycle(&config);
        assert_eq!(outcome.state, CycleState::Sleeping);
        assert!(matches!(outcome.report, ReportStatus::Delivered(_)));

        let stored = collector.datapoints();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sensor_id, 5);
        assert_eq!(stored[0].timestamp, Some(1_700_000_000));
        assert_eq!(stored[0].battery, Some(battery_volts(1)));

        let sample = outcome.sample.unwrap().vector;
        assert!((stored[0].angle - sample.tilt_degrees()).abs() < 1e-3);
        assert_eq!((stored[0].x, stored[0].y, stored[0].z), (sample.x, sample.y, sample.z));
        assert!(stored[0].temperature.is_some());
    }

    #[test]
    fn test_custom_path_reaches_local_collector() {
        let collector = FakeCollector::spawn("/brew/tilt", &[(5, "wort")]).unwrap();
        let mut config = config(collector.port(), "wort");
        config.collector.path = collector.path();

        let outcome = cycle(&config);
        assert!(matches!(outcome.report, ReportStatus::Delivered(_)));
        assert_eq!(collector.datapoints().len(), 1);
    }

    #[test]
    fn test_wrong_secret_is_rejected_once() {
        let collector = FakeCollector::spawn(DEFAULT_COLLECTOR_PATH, &[(5, "wort")]).unwrap();
        let config = config(collector.port(), "mash");

        let outcome = cycle(&config);
        assert_eq!(outcome.state, CycleState::Sleeping);
        assert_eq!(outcome.report, ReportStatus::Failed(ReportError::Auth { status: 404 }));
        assert_eq!(outcome.attempts, 1);
        assert!(collector.datapoints().is_empty());
    }

    #[test]
    fn test_missing_collector_still_sleeps_within_budget() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = config(port, "wort");

        let started = Instant::now();
        let outcome = cycle(&config);

        assert_eq!(outcome.state, CycleState::Sleeping);
        assert!(matches!(outcome.report, ReportStatus::Failed(ReportError::Connect(_))));
        assert_eq!(outcome.attempts, 3);
        assert!(started.elapsed().as_millis() <= u128::from(config.cycle_budget_ms()));
    }

    #[test]
    fn test_battery_discharges_to_floor() {
        assert!(battery_volts(1) > battery_volts(100));
        assert_eq!(battery_volts(10_000), 3.3);
    }
}
