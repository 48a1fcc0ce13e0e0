//! Exponential smoothing of repeated accelerometer reads.
//!
//! Each axis follows a single-pole low-pass recurrence
//! `acc = α·sample + (1 - α)·acc`, so only the running state is kept no
//! matter how many reads a cycle takes.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::{ConfigError, SamplingConfig};
use crate::sensors::{AccelVector, Accelerometer, SensorError, SensorReader};

/// Starting value of the smoothing state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterSeed {
    /// The first read becomes the state unfiltered.
    #[default]
    FirstSample,
    /// The state starts at the zero vector and every read is smoothed.
    Zero,
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SampleError {
    #[error("invalid sampling configuration: {0}")]
    Config(ConfigError),
    #[error("sensor fault: {0}")]
    Sensor(SensorError),
}

impl From<ConfigError> for SampleError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<SensorError> for SampleError {
    fn from(error: SensorError) -> Self {
        Self::Sensor(error)
    }
}

/// The smoothed vector of one wake cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredVector {
    pub vector: AccelVector,
    /// Number of reads folded into `vector`.
    pub samples: u16,
}

pub struct ExponentialFilter {
    alpha: f32,
    state: Option<AccelVector>,
    samples: u16,
}

impl ExponentialFilter {
    pub fn new(alpha: f32, seed: FilterSeed) -> Result<Self, ConfigError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::FilterCoefficientOutOfRange(alpha));
        }

        let state = match seed {
            FilterSeed::FirstSample => None,
            FilterSeed::Zero => Some(AccelVector::ZERO),
        };

        Ok(Self {
            alpha,
            state,
            samples: 0,
        })
    }

    /// Fold one sample into the state and return the new state.
    pub fn update(&mut self, sample: AccelVector) -> AccelVector {
        let alpha = self.alpha;
        let next = match self.state {
            None => sample,
            Some(acc) => AccelVector {
                x: alpha * sample.x + (1.0 - alpha) * acc.x,
                y: alpha * sample.y + (1.0 - alpha) * acc.y,
                z: alpha * sample.z + (1.0 - alpha) * acc.z,
            },
        };

        self.state = Some(next);
        self.samples = self.samples.saturating_add(1);
        next
    }

    pub fn state(&self) -> Option<AccelVector> {
        self.state
    }

    pub fn finish(self) -> Option<FilteredVector> {
        let samples = self.samples;
        self.state
            .filter(|_| samples > 0)
            .map(|vector| FilteredVector { vector, samples })
    }
}

/// Take `sampling.measurement_count` scaled reads and smooth them.
///
/// The first failing read aborts the whole reading: a result built from fewer
/// reads than configured is never returned.
pub async fn filter<A: Accelerometer>(
    reader: &mut SensorReader<A>,
    sampling: &SamplingConfig,
) -> Result<FilteredVector, SampleError> {
    sampling.validate()?;

    let mut smoother = ExponentialFilter::new(sampling.filter_alpha, sampling.seed)?;

    for index in 0..sampling.measurement_count {
        let sample = reader.read_scaled().await.map_err(|e| {
            warn!(
                "Read {} of {} failed, discarding filtered reading: {}",
                index + 1,
                sampling.measurement_count,
                e
            );
            SampleError::Sensor(e)
        })?;
        smoother.update(sample);
    }

    let filtered = smoother
        .finish()
        .ok_or(SampleError::Config(ConfigError::ZeroMeasurementCount))?;
    debug!("Filtered {} reads into {:?}", filtered.samples, filtered.vector);

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::RawSample;
    use crate::testing::{ScriptedAccelerometer, assert_close};
    use embassy_futures::block_on;

    const ONE_G: f32 = 16384.0;

    fn sampling(alpha: f32, count: u16, seed: FilterSeed) -> SamplingConfig {
        SamplingConfig {
            filter_alpha: alpha,
            measurement_count: count,
            seed,
        }
    }

    fn run(sensor: ScriptedAccelerometer, config: SamplingConfig) -> (Result<FilteredVector, SampleError>, usize) {
        let mut reader = SensorReader::new(sensor, ONE_G);
        let result = block_on(filter(&mut reader, &config));
        (result, reader.into_inner().reads())
    }

    #[test]
    fn test_zero_count_is_config_error() {
        for seed in [FilterSeed::FirstSample, FilterSeed::Zero] {
            let (result, reads) = run(
                ScriptedAccelerometer::constant(RawSample::new(0, 0, 16384)),
                sampling(0.5, 0, seed),
            );
            assert_eq!(result, Err(SampleError::Config(ConfigError::ZeroMeasurementCount)));
            assert_eq!(reads, 0);
        }
    }

    #[test]
    fn test_single_read_is_unfiltered() {
        let (result, reads) = run(
            ScriptedAccelerometer::constant(RawSample::new(4096, -8192, 12288)),
            sampling(0.01, 1, FilterSeed::FirstSample),
        );
        let filtered = result.unwrap();
        assert_eq!(filtered.vector, AccelVector::new(0.25, -0.5, 0.75));
        assert_eq!(filtered.samples, 1);
        assert_eq!(reads, 1);
    }

    #[test]
    fn test_constant_input_is_preserved_with_first_sample_seed() {
        for count in [1u16, 2, 10, 50] {
            let (result, _) = run(
                ScriptedAccelerometer::constant(RawSample::new(-1234, 5678, 16000)),
                sampling(0.3, count, FilterSeed::FirstSample),
            );
            let expected = AccelVector::from_raw(RawSample::new(-1234, 5678, 16000), ONE_G);
            let vector = result.unwrap().vector;
            assert_close(vector.x, expected.x, 1e-6);
            assert_close(vector.y, expected.y, 1e-6);
            assert_close(vector.z, expected.z, 1e-6);
        }
    }

    #[test]
    fn test_constant_input_converges_from_zero() {
        let (result, _) = run(
            ScriptedAccelerometer::constant(RawSample::new(0, 0, 16384)),
            sampling(0.3, 200, FilterSeed::Zero),
        );
        assert_close(result.unwrap().vector.z, 1.0, 1e-5);
    }

    #[test]
    fn test_three_reads_half_alpha_from_zero() {
        // 0.5, then 0.75, then 0.875
        let (result, reads) = run(
            ScriptedAccelerometer::constant(RawSample::new(0, 0, 16384)),
            sampling(0.5, 3, FilterSeed::Zero),
        );
        let filtered = result.unwrap();
        assert_eq!(filtered.vector, AccelVector::new(0.0, 0.0, 0.875));
        assert_eq!(filtered.samples, 3);
        assert_eq!(reads, 3);
    }

    #[test]
    fn test_recurrence_weights_latest_sample() {
        let samples = [
            RawSample::new(0, 0, 0),
            RawSample::new(16384, 0, 0),
        ];
        let (result, _) = run(
            ScriptedAccelerometer::with_samples(&samples),
            sampling(0.25, 2, FilterSeed::FirstSample),
        );
        // 0.25 * 1.0 + 0.75 * 0.0
        assert_eq!(result.unwrap().vector.x, 0.25);
    }

    #[test]
    fn test_mid_sequence_fault_aborts_whole_reading() {
        for failing in 0..5 {
            let mut sensor = ScriptedAccelerometer::constant(RawSample::new(0, 0, 16384));
            sensor.fail_read(failing);
            let (result, reads) = run(sensor, sampling(0.5, 5, FilterSeed::FirstSample));

            assert!(matches!(result, Err(SampleError::Sensor(SensorError::ReadFailed { .. }))));
            assert_eq!(reads, failing + 1, "no read may follow the fault");
        }
    }

    #[test]
    fn test_alpha_bounds() {
        assert!(ExponentialFilter::new(0.0, FilterSeed::Zero).is_err());
        assert!(ExponentialFilter::new(1.0, FilterSeed::Zero).is_err());
        assert!(ExponentialFilter::new(f32::NAN, FilterSeed::Zero).is_err());
        assert!(ExponentialFilter::new(0.999, FilterSeed::Zero).is_ok());
    }

    #[test]
    fn test_unused_filter_has_no_result() {
        let smoother = ExponentialFilter::new(0.5, FilterSeed::Zero).unwrap();
        assert_eq!(smoother.state(), Some(AccelVector::ZERO));
        assert!(smoother.finish().is_none());
    }
}
