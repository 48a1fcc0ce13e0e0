//! The wake cycle: wake, sample, report, sleep.
//!
//! [`run_cycle`] is invoked fresh on every physical wake and keeps no state
//! between invocations. Every transition is unconditional: a failed sample
//! or an undeliverable report only changes what the [`CycleOutcome`] says,
//! never whether the cycle reaches [`CycleState::Sleeping`].

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;
use log::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::filter::{FilteredVector, SampleError, filter};
use crate::report::encode;
use crate::reporter::{Ack, ReportError, Reporter, Transport};
use crate::sensors::{Accelerometer, SensorReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Waking,
    Sampling,
    Reporting,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Delivered(Ack),
    Failed(ReportError),
    /// No reading to send.
    Skipped,
}

/// What happened during one wake cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// Always [`CycleState::Sleeping`] once `run_cycle` returns.
    pub state: CycleState,
    /// States visited, in order.
    pub trace: Vec<CycleState, 4>,
    pub sample: Result<FilteredVector, SampleError>,
    pub temperature_celsius: Option<f32>,
    pub report: ReportStatus,
    pub attempts: u8,
    pub sleep_duration_us: u64,
}

/// Values the platform supplies fresh for each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleInputs {
    /// Seconds since the Unix epoch, if the platform has a clock.
    pub timestamp: Option<u64>,
    pub battery_volts: Option<f32>,
}

/// The platform facility that suspends the device.
///
/// On hardware this does not return: the chip resets into the next wake
/// cycle when the timer fires.
pub trait SleepControl {
    fn sleep_for(&mut self, duration_us: u64);
}

struct Cycle {
    state: CycleState,
    trace: Vec<CycleState, 4>,
}

impl Cycle {
    fn wake() -> Self {
        let mut cycle = Self {
            state: CycleState::Waking,
            trace: Vec::new(),
        };
        let _ = cycle.trace.push(CycleState::Waking);
        debug!("Cycle state: {:?}", CycleState::Waking);
        cycle
    }

    fn enter(&mut self, state: CycleState) {
        debug!("Cycle state: {:?} -> {:?}", self.state, state);
        self.state = state;
        let _ = self.trace.push(state);
    }
}

/// Run one complete wake cycle and return what happened.
///
/// The sensor, the network and the delay are borrowed exclusively for the
/// duration of the cycle. The cycle's wall-clock time is bounded by
/// [`NodeConfig::cycle_budget_ms`].
pub async fn run_cycle<A, T, D>(
    config: &NodeConfig<'_>,
    sensor: &mut A,
    network: &mut T,
    delay: &mut D,
    inputs: CycleInputs,
) -> CycleOutcome
where
    A: Accelerometer,
    T: Transport,
    D: DelayNs,
{
    let mut cycle = Cycle::wake();
    let sleep_duration_us = config.effective_sleep_duration_us();

    if let Err(e) = config.validate() {
        error!("Invalid node configuration, skipping this cycle: {}", e);
        cycle.enter(CycleState::Sampling);
        cycle.enter(CycleState::Reporting);
        cycle.enter(CycleState::Sleeping);
        return CycleOutcome {
            state: cycle.state,
            trace: cycle.trace,
            sample: Err(SampleError::Config(e)),
            temperature_celsius: None,
            report: ReportStatus::Skipped,
            attempts: 0,
            sleep_duration_us,
        };
    }

    cycle.enter(CycleState::Sampling);
    let mut reader = SensorReader::new(&mut *sensor, config.accel.one_g);
    let sample = filter(&mut reader, &config.sampling).await;

    let temperature_celsius = match sample {
        Ok(_) => match reader.sensor_mut().read_temperature().await {
            Ok(celsius) => Some(celsius),
            Err(e) => {
                warn!("Temperature unavailable: {}", e);
                None
            }
        },
        Err(_) => None,
    };

    if let Err(e) = reader.sensor_mut().power_down().await {
        warn!("{} did not enter sleep mode: {}", A::NAME, e);
    }

    cycle.enter(CycleState::Reporting);
    let (report, attempts) = match sample {
        Ok(vector) => {
            let report = encode(config.identity, vector, inputs.timestamp)
                .with_temperature(temperature_celsius)
                .with_battery(inputs.battery_volts);
            info!(
                "Sensor {} reading: angle {:.2}°, |g| {:.3}",
                report.sensor_id(),
                report.angle_degrees,
                vector.vector.magnitude()
            );

            let mut reporter = Reporter::new(network, delay, config.collector, config.retry);
            let status = match reporter.send(&report).await {
                Ok(ack) => ReportStatus::Delivered(ack),
                Err(e) => ReportStatus::Failed(e),
            };
            (status, reporter.attempts())
        }
        Err(e) => {
            error!("Sampling failed, no report this cycle: {}", e);
            (ReportStatus::Skipped, 0)
        }
    };

    cycle.enter(CycleState::Sleeping);

    CycleOutcome {
        state: cycle.state,
        trace: cycle.trace,
        sample,
        temperature_celsius,
        report,
        attempts,
        sleep_duration_us,
    }
}

/// Hand the cycle's sleep duration to the platform.
pub fn enter_sleep<S: SleepControl>(outcome: &CycleOutcome, sleeper: &mut S) {
    info!("Sleeping for {} s", outcome.sleep_duration_us / 1_000_000);
    sleeper.sleep_for(outcome.sleep_duration_us);
}
