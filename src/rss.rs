// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Interface to the Radar System Software (RSS) runtime and its hardware
//! abstraction layer.
//!
//! The runtime itself is a closed vendor library. This module describes the
//! contract the rest of the crate relies on: a HAL that can sleep and filter
//! its log output, a runtime that is activated once per process, and the two
//! measurement handles it can create (distance basic detector and envelope
//! service). Handles are destroyed when dropped.

use std::{fmt, time::Duration};

use tracing::{debug, level_filters::LevelFilter, warn};

/// The position where a sensor is connected, starting at 1.
pub type SensorId = u32;

/// Runtime error types.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The driver could not bring up its hardware abstraction layer
    HalInit(String),
    /// The runtime refused to activate
    Activation,
    /// A detector or service handle could not be created
    Create(&'static str),
    /// A service call returned a non-success status
    Service(ServiceStatus),
}

impl std::error::Error for Error {}

impl From<ServiceStatus> for Error {
    fn from(status: ServiceStatus) -> Error {
        Error::Service(status)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::HalInit(err) => write!(f, "hal init failed: {}", err),
            Error::Activation => write!(f, "radar system software activation failed"),
            Error::Create(what) => write!(f, "unable to create {}", what),
            Error::Service(status) => write!(f, "({}) {}", status.code(), status.name()),
        }
    }
}

/// Status codes returned by service calls.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    /// The call succeeded
    Ok = 0,
    /// Generic failure
    FailureUnspecified = 1,
    /// The service was already activated
    FailureAlreadyActive = 2,
    /// The service has not been activated
    FailureNotActive = 3,
    /// The result buffer is shorter than the sweep
    FailureDataLength = 4,
    /// No sweep arrived in time
    FailureTimeout = 5,
    /// The sensor did not answer on its bus
    FailureCommunication = 6,
}

impl ServiceStatus {
    /// Numeric status code as returned by the runtime.
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Status name as printed by the runtime.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::FailureUnspecified => "FAILURE_UNSPECIFIED",
            ServiceStatus::FailureAlreadyActive => "FAILURE_ALREADY_ACTIVE",
            ServiceStatus::FailureNotActive => "FAILURE_NOT_ACTIVE",
            ServiceStatus::FailureDataLength => "FAILURE_DATA_LENGTH",
            ServiceStatus::FailureTimeout => "FAILURE_TIMEOUT",
            ServiceStatus::FailureCommunication => "FAILURE_COMMUNICATION",
        }
    }

    /// Maps `Ok` to `Ok(())` and every failure to `Err`.
    pub fn check(self) -> Result<(), Error> {
        match self {
            ServiceStatus::Ok => Ok(()),
            status => Err(Error::Service(status)),
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Log verbosity of the HAL.  Ordered from quietest to noisiest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Errors and warnings
    Warning,
    /// Informational messages
    Info,
    /// Detailed operation messages
    Verbose,
    /// Everything
    Debug,
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        if level == LevelFilter::OFF || level == LevelFilter::ERROR {
            LogLevel::Error
        } else if level == LevelFilter::WARN {
            LogLevel::Warning
        } else if level == LevelFilter::INFO {
            LogLevel::Info
        } else if level == LevelFilter::DEBUG {
            LogLevel::Verbose
        } else {
            LogLevel::Debug
        }
    }
}

/// OS primitives the runtime and the acquisition loop depend on.
pub trait Hal {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Current HAL log verbosity.
    fn log_level(&self) -> LogLevel;

    /// Filters HAL log output below `level`.
    fn set_log_level(&mut self, level: LogLevel);
}

/// Requested sweep of an envelope service.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SweepConfig {
    /// Sensor to sweep with
    pub sensor: SensorId,
    /// Requested start of the sweep in meters
    pub start_m: f32,
    /// Requested length of the sweep in meters
    pub length_m: f32,
    /// Streaming update rate in Hz
    pub update_rate_hz: f32,
}

/// Sweep geometry actually chosen by the envelope service.  The actual start
/// and length may differ from the requested ones.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnvelopeMetadata {
    /// Start of the sweep in meters
    pub actual_start_m: f32,
    /// Length of the sweep in meters
    pub actual_length_m: f32,
    /// Number of amplitude bins delivered per sweep
    pub data_length: u16,
    /// Number of hardware sweeps stitched into one result
    pub stitch_count: u16,
    /// Distance between two sampling points in meters
    pub step_length_m: f32,
}

/// Per-sweep information returned with envelope data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultInfo {
    /// Sweep counter of the service, starting at 1
    pub sequence_number: u32,
    /// One or more sweeps were dropped because the application was late
    pub missed_data: bool,
    /// The sensor reported a bus error during the sweep
    pub sensor_communication_error: bool,
    /// At least one bin hit the top of the amplitude range
    pub data_saturated: bool,
}

/// Strongest reflection reported by the distance basic detector.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Reflection {
    /// Distance in meters
    pub distance: f32,
    /// Envelope amplitude at `distance`
    pub amplitude: u16,
}

/// Distance basic detector handle.
pub trait DistanceDetector {
    /// Blocks until the next sweep and returns its strongest reflection.
    fn get_reflection(&mut self) -> Result<Reflection, Error>;
}

/// Envelope service handle.
pub trait EnvelopeService {
    /// Sweep geometry the service settled on.
    fn metadata(&self) -> EnvelopeMetadata;

    /// Starts streaming sweeps.
    fn activate(&mut self) -> Result<(), Error>;

    /// Stops streaming sweeps.
    fn deactivate(&mut self) -> Result<(), Error>;

    /// Blocks until the next sweep arrives and copies its envelope into
    /// `data`, which must hold at least `metadata().data_length` elements.
    fn get_next(&mut self, data: &mut [u16]) -> Result<ResultInfo, Error>;
}

/// Radar System Software runtime.
pub trait Runtime {
    /// HAL handed out by [`Runtime::hal_init`]
    type Hal: Hal;
    /// Distance basic detector handle
    type Detector: DistanceDetector;
    /// Envelope service handle
    type Envelope: EnvelopeService;

    /// Initializes the driver and returns its HAL implementation.
    fn hal_init(&mut self) -> Result<Self::Hal, Error>;

    /// Runtime version string.
    fn version(&self) -> String;

    /// Activates the runtime.  Returns false on failure.
    fn activate(&mut self, hal: &Self::Hal) -> bool;

    /// Deactivates the runtime.
    fn deactivate(&mut self);

    /// Creates a distance basic detector over `length_m` meters starting at
    /// `start_m`, or None when the runtime rejects the configuration.
    fn create_distance_detector(
        &mut self,
        sensor: SensorId,
        start_m: f32,
        length_m: f32,
    ) -> Option<Self::Detector>;

    /// Creates an envelope service for `sweep`, or None when the runtime
    /// rejects the configuration.
    fn create_envelope_service(&mut self, sweep: &SweepConfig) -> Option<Self::Envelope>;
}

/// An activated runtime.  The runtime is deactivated when the session is
/// dropped, so handles created from it must be dropped first.
pub struct Session<'a, R: Runtime> {
    runtime: &'a mut R,
}

impl<'a, R: Runtime> Session<'a, R> {
    /// Activates `runtime` for the lifetime of the session.
    pub fn activate(runtime: &'a mut R, hal: &R::Hal) -> Result<Self, Error> {
        if !runtime.activate(hal) {
            return Err(Error::Activation);
        }
        debug!("radar system software {} activated", runtime.version());
        Ok(Session { runtime })
    }

    /// See [`Runtime::create_distance_detector`].
    pub fn create_distance_detector(
        &mut self,
        sensor: SensorId,
        start_m: f32,
        length_m: f32,
    ) -> Result<R::Detector, Error> {
        self.runtime
            .create_distance_detector(sensor, start_m, length_m)
            .ok_or(Error::Create("distance basic detector"))
    }

    /// See [`Runtime::create_envelope_service`].
    pub fn create_envelope_service(&mut self, sweep: &SweepConfig) -> Result<R::Envelope, Error> {
        self.runtime
            .create_envelope_service(sweep)
            .ok_or(Error::Create("envelope service"))
    }
}

impl<R: Runtime> Drop for Session<'_, R> {
    fn drop(&mut self) {
        self.runtime.deactivate();
        debug!("radar system software deactivated");
    }
}

/// Logs the geometry an envelope service settled on.
pub fn log_metadata(metadata: &EnvelopeMetadata) {
    let start = metadata.actual_start_m as f64;
    let length = metadata.actual_length_m as f64;
    tracing::info!(
        "envelope sweep: start {:.6} m, length {:.6} m, end {:.6} m, data length {}, resolution {:.6} m per bin",
        start,
        length,
        start + length,
        metadata.data_length,
        resolution(metadata)
    );
    if metadata.data_length == 0 {
        warn!("envelope service reports an empty sweep");
    }
}

/// Meters per envelope bin, `actual_length / data_length`, or 0 for an empty
/// sweep.
pub fn resolution(metadata: &EnvelopeMetadata) -> f64 {
    if metadata.data_length == 0 {
        return 0.0;
    }
    metadata.actual_length_m as f64 / metadata.data_length as f64
}
