// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Emulated Radar System Software runtime.
//!
//! Stands in for the vendor runtime when no sensor is attached.  A single
//! point reflector sits at a configurable distance; the distance detector
//! reports it with some jitter and the envelope service renders it as a
//! pulse over a noise floor.  Sweep geometry follows the sensor's fixed
//! sampling grid, so the actual start and length differ slightly from the
//! requested ones.  Faults can be injected for testing.

use std::{
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::rss::{
    self, DistanceDetector, EnvelopeMetadata, EnvelopeService, Error, Hal, LogLevel, Reflection,
    ResultInfo, Runtime, SensorId, ServiceStatus, SweepConfig,
};

/// Distance between two envelope bins in meters.
pub const POINT_SPACING_M: f32 = 0.000_484;

/// Width of the reflected pulse in meters (one sigma).
const PULSE_WIDTH_M: f32 = 0.012;

/// Sensors available on the emulated board.
const SENSOR_COUNT: SensorId = 4;

const VERSION: &str = "emulated-2.0.0";

/// Behavior of the emulated sensor.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Reflector distance in meters
    pub target: f32,
    /// Peak amplitude of the reflection
    pub amplitude: u16,
    /// Noise floor of the envelope
    pub noise_floor: u16,
    /// Distance jitter in meters
    pub noise: f32,
    /// Seed of the measurement jitter
    pub seed: u64,
    /// Block in `get_next` until the next sweep is due
    pub pace: bool,
    /// Fail every n-th measurement with a timeout
    pub fail_every: Option<u32>,
    /// Fail [`Runtime::hal_init`]
    pub fail_hal_init: bool,
    /// Refuse runtime activation
    pub fail_activation: bool,
    /// Fail envelope service activation
    pub fail_service_activation: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            target: 0.35,
            amplitude: 2400,
            noise_floor: 120,
            noise: 0.002,
            seed: 0,
            pace: true,
            fail_every: None,
            fail_hal_init: false,
            fail_activation: false,
            fail_service_activation: false,
        }
    }
}

/// HAL backed by the host OS.
#[derive(Debug, Clone)]
pub struct EmulatedHal {
    log_level: LogLevel,
}

impl Hal for EmulatedHal {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn log_level(&self) -> LogLevel {
        self.log_level
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }
}

/// Software stand-in for the Radar System Software runtime.
#[derive(Debug)]
pub struct EmulatedRuntime {
    config: EmulatorConfig,
    active: bool,
    handles: u64,
}

impl EmulatedRuntime {
    /// Inactive runtime emulating `config`.
    pub fn new(config: EmulatorConfig) -> Self {
        EmulatedRuntime {
            config,
            active: false,
            handles: 0,
        }
    }

    /// Whether the runtime is currently activated.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn rng(&mut self) -> StdRng {
        self.handles += 1;
        StdRng::seed_from_u64(self.config.seed.wrapping_add(self.handles))
    }
}

impl Runtime for EmulatedRuntime {
    type Hal = EmulatedHal;
    type Detector = EmulatedDetector;
    type Envelope = EmulatedEnvelope;

    fn hal_init(&mut self) -> Result<EmulatedHal, Error> {
        if self.config.fail_hal_init {
            return Err(Error::HalInit("no sensor board found".to_string()));
        }
        Ok(EmulatedHal {
            log_level: LogLevel::Info,
        })
    }

    fn version(&self) -> String {
        VERSION.to_string()
    }

    fn activate(&mut self, hal: &EmulatedHal) -> bool {
        if self.config.fail_activation || self.active {
            return false;
        }
        debug!("emulated runtime active, hal log level {:?}", hal.log_level());
        self.active = true;
        true
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn create_distance_detector(
        &mut self,
        sensor: SensorId,
        start_m: f32,
        length_m: f32,
    ) -> Option<EmulatedDetector> {
        if !self.active || !valid_sensor(sensor) || start_m < 0.0 || length_m <= 0.0 {
            return None;
        }
        let rng = self.rng();
        Some(EmulatedDetector {
            start: start_m,
            end: start_m + length_m,
            reflector: Reflector::new(&self.config, rng),
        })
    }

    fn create_envelope_service(&mut self, sweep: &SweepConfig) -> Option<EmulatedEnvelope> {
        if !self.active
            || !valid_sensor(sweep.sensor)
            || sweep.start_m < 0.0
            || sweep.length_m <= 0.0
            || sweep.update_rate_hz <= 0.0
        {
            return None;
        }

        let metadata = envelope_metadata(sweep.start_m, sweep.length_m)?;
        let period = Duration::try_from_secs_f32(1.0 / sweep.update_rate_hz).ok()?;
        let rng = self.rng();
        Some(EmulatedEnvelope {
            metadata,
            period,
            pace: self.config.pace,
            fail_activation: self.config.fail_service_activation,
            active: false,
            sequence: 0,
            next_sweep: None,
            reflector: Reflector::new(&self.config, rng),
        })
    }
}

fn valid_sensor(sensor: SensorId) -> bool {
    (1..=SENSOR_COUNT).contains(&sensor)
}

/// Snaps the requested sweep onto the sampling grid.  Returns None when the
/// sweep holds more bins than a single result can carry.
pub fn envelope_metadata(start_m: f32, length_m: f32) -> Option<EnvelopeMetadata> {
    let first = (start_m / POINT_SPACING_M).floor();
    let bins = ((length_m / POINT_SPACING_M).round() as u32).saturating_add(1);
    let data_length = u16::try_from(bins).ok()?;
    Some(EnvelopeMetadata {
        actual_start_m: first * POINT_SPACING_M,
        actual_length_m: data_length as f32 * POINT_SPACING_M,
        data_length,
        stitch_count: 0,
        step_length_m: POINT_SPACING_M,
    })
}

/// Shared reflector model and fault schedule.
#[derive(Debug)]
struct Reflector {
    target: f32,
    amplitude: u16,
    noise_floor: u16,
    noise: f32,
    fail_every: Option<u32>,
    calls: u32,
    rng: StdRng,
}

impl Reflector {
    fn new(config: &EmulatorConfig, rng: StdRng) -> Self {
        Reflector {
            target: config.target,
            amplitude: config.amplitude,
            noise_floor: config.noise_floor,
            noise: config.noise.abs(),
            fail_every: config.fail_every.filter(|n| *n > 0),
            calls: 0,
            rng,
        }
    }

    /// Advances the call counter and reports whether this call should fail.
    fn fault(&mut self) -> bool {
        self.calls = self.calls.wrapping_add(1);
        matches!(self.fail_every, Some(n) if self.calls % n == 0)
    }

    fn jitter(&mut self, scale: f32) -> f32 {
        if scale > 0.0 {
            self.rng.gen_range(-scale..scale)
        } else {
            0.0
        }
    }

    fn distance(&mut self) -> f32 {
        self.target + self.jitter(self.noise)
    }

    /// Envelope amplitude at `distance` for a reflector at `center`.
    fn envelope(&mut self, center: f32, distance: f32) -> u16 {
        let x = (distance - center) / PULSE_WIDTH_M;
        let pulse = self.amplitude as f32 * (-0.5 * x * x).exp();
        let floor = self.noise_floor as f32 * (1.0 + self.jitter(0.25));
        (pulse + floor).round().clamp(0.0, u16::MAX as f32) as u16
    }
}

/// Emulated distance basic detector.
#[derive(Debug)]
pub struct EmulatedDetector {
    start: f32,
    end: f32,
    reflector: Reflector,
}

impl DistanceDetector for EmulatedDetector {
    fn get_reflection(&mut self) -> Result<Reflection, Error> {
        if self.reflector.fault() {
            return Err(ServiceStatus::FailureTimeout.into());
        }

        let distance = self.reflector.distance();
        if distance < self.start || distance > self.end {
            trace!("reflector at {} m outside detector range", distance);
            return Ok(Reflection::default());
        }

        let amplitude = self.reflector.envelope(self.reflector.target, distance);
        Ok(Reflection {
            distance,
            amplitude,
        })
    }
}

impl Drop for EmulatedDetector {
    fn drop(&mut self) {
        debug!("distance basic detector destroyed");
    }
}

/// Emulated envelope service.
#[derive(Debug)]
pub struct EmulatedEnvelope {
    metadata: EnvelopeMetadata,
    period: Duration,
    pace: bool,
    fail_activation: bool,
    active: bool,
    sequence: u32,
    next_sweep: Option<Instant>,
    reflector: Reflector,
}

impl EmulatedEnvelope {
    /// Waits for the next sweep.  Returns true when one or more sweeps were
    /// dropped because the caller was late.
    fn wait_for_sweep(&mut self) -> bool {
        if !self.pace {
            return false;
        }

        let now = Instant::now();
        let due = self.next_sweep.unwrap_or(now);
        let mut missed = false;
        let next = if due >= now {
            thread::sleep(due - now);
            due + self.period
        } else {
            missed = now - due > self.period;
            now + self.period
        };
        self.next_sweep = Some(next);
        missed
    }
}

impl EnvelopeService for EmulatedEnvelope {
    fn metadata(&self) -> EnvelopeMetadata {
        self.metadata
    }

    fn activate(&mut self) -> Result<(), rss::Error> {
        if self.fail_activation {
            return Err(ServiceStatus::FailureUnspecified.into());
        }
        if self.active {
            return Err(ServiceStatus::FailureAlreadyActive.into());
        }
        self.active = true;
        self.next_sweep = None;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), rss::Error> {
        if !self.active {
            return Err(ServiceStatus::FailureNotActive.into());
        }
        self.active = false;
        Ok(())
    }

    fn get_next(&mut self, data: &mut [u16]) -> Result<ResultInfo, rss::Error> {
        if !self.active {
            return Err(ServiceStatus::FailureNotActive.into());
        }
        let len = self.metadata.data_length as usize;
        if data.len() < len {
            return Err(ServiceStatus::FailureDataLength.into());
        }

        let missed_data = self.wait_for_sweep();
        self.sequence = self.sequence.wrapping_add(1);
        if self.reflector.fault() {
            return Err(ServiceStatus::FailureTimeout.into());
        }

        let center = self.reflector.distance();
        let start = self.metadata.actual_start_m;
        for (index, value) in data[..len].iter_mut().enumerate() {
            let distance = start + index as f32 * POINT_SPACING_M;
            *value = self.reflector.envelope(center, distance);
        }

        Ok(ResultInfo {
            sequence_number: self.sequence,
            missed_data,
            sensor_communication_error: false,
            data_saturated: data[..len].contains(&u16::MAX),
        })
    }
}

impl Drop for EmulatedEnvelope {
    fn drop(&mut self) {
        debug!("envelope service destroyed");
    }
}
