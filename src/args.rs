// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{ffi::OsString, fmt, path::PathBuf, process::ExitCode, time::Duration};

use clap::{error::ErrorKind, Args, Parser};
use tracing::level_filters::LevelFilter;

use crate::rss::{SensorId, SweepConfig};

/// Configuration values rejected after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Sensor ids start at 1
    InvalidSensor(u32),
    /// Negative or non-finite range start
    InvalidRangeStart(f32),
    /// Range length that is not positive and finite
    InvalidRangeLength(f32),
    /// Update rate that is not positive and finite
    InvalidUpdateRate(f32),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidSensor(value) => write!(f, "invalid sensor: {}", value),
            Error::InvalidRangeStart(value) => write!(f, "invalid range start: {}", value),
            Error::InvalidRangeLength(value) => write!(f, "invalid range length: {}", value),
            Error::InvalidUpdateRate(value) => write!(f, "invalid update rate: {}", value),
        }
    }
}

/// Flags shared by every measurement mode.
#[derive(Args, Debug, Clone)]
pub struct Common {
    /// The position where the sensor is connected
    #[arg(short, long, env = "RADAR_SENSOR", default_value = "1")]
    pub sensor: u32,

    /// Directory the CSV log is written to
    #[arg(short = 'o', long, env = "RADAR_LOG_DIR", default_value = "log")]
    pub log_dir: PathBuf,

    /// Distance in meters of the reflector seen by the emulated sensor
    #[arg(long, env = "RADAR_TARGET", default_value = "0.35")]
    pub target: f32,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,
}

/// Log distance basic detector reflections to CSV.
#[derive(Parser, Debug, Clone)]
#[command(author, version, long_about = None)]
pub struct DistanceArgs {
    /// The number of reflections to get, 0 is infinite
    #[arg(short, long, env = "RADAR_COUNT", default_value = "0")]
    pub count: u32,

    /// The start range in meters where the detector will look for reflections
    #[arg(
        short = 'r',
        long,
        env = "RADAR_RANGE_START",
        default_value = "0.2",
        allow_negative_numbers = true
    )]
    pub range_start: f32,

    /// The range length in meters where the detector will look for
    /// reflections
    #[arg(
        short = 'l',
        long,
        env = "RADAR_RANGE_LENGTH",
        default_value = "0.4",
        allow_negative_numbers = true
    )]
    pub range_length: f32,

    /// Pause between reflections in milliseconds
    #[arg(short, long, env = "RADAR_PERIOD_MS", default_value = "100")]
    pub period_ms: u64,

    /// Flags shared with `radar-envelope`
    #[command(flatten)]
    pub common: Common,
}

/// Log envelope service sweeps to CSV.
#[derive(Parser, Debug, Clone)]
#[command(author, version, long_about = None)]
pub struct EnvelopeArgs {
    /// The number of sweeps to get, 0 is infinite
    #[arg(short, long, env = "RADAR_COUNT", default_value = "5")]
    pub count: u32,

    /// The requested start of the sweep in meters
    #[arg(
        short = 'r',
        long,
        env = "RADAR_RANGE_START",
        default_value = "0.1",
        allow_negative_numbers = true
    )]
    pub range_start: f32,

    /// The requested length of the sweep in meters
    #[arg(
        short = 'l',
        long,
        env = "RADAR_RANGE_LENGTH",
        default_value = "0.5",
        allow_negative_numbers = true
    )]
    pub range_length: f32,

    /// Streaming update rate in Hz
    #[arg(short, long, env = "RADAR_UPDATE_RATE", default_value = "100")]
    pub update_rate: f32,

    /// Extra pause between sweeps in milliseconds; the service already
    /// blocks until the next sweep
    #[arg(short, long, env = "RADAR_PERIOD_MS", default_value = "0")]
    pub period_ms: u64,

    /// Flags shared with `radar-distance`
    #[command(flatten)]
    pub common: Common,
}

/// Run configuration, fixed at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Iterations to run, 0 is infinite
    pub count: u32,
    /// Sensor to measure with
    pub sensor: SensorId,
    /// Start of the measured range in meters
    pub range_start: f32,
    /// Length of the measured range in meters
    pub range_length: f32,
    /// Streaming update rate, envelope service only
    pub update_rate: Option<f32>,
    /// Pause between iterations
    pub period: Duration,
    /// Directory of the CSV log
    pub log_dir: PathBuf,
    /// Emulated reflector distance in meters
    pub target: f32,
    /// Application and HAL log level
    pub log_level: LevelFilter,
    /// Tracy profiler broadcast
    pub tracy: bool,
}

impl Config {
    /// Sweep request for the envelope service.
    pub fn sweep(&self) -> SweepConfig {
        SweepConfig {
            sensor: self.sensor,
            start_m: self.range_start,
            length_m: self.range_length,
            update_rate_hz: self.update_rate.unwrap_or(DEFAULT_UPDATE_RATE),
        }
    }

    fn validate(self) -> Result<Self, Error> {
        if self.sensor == 0 {
            return Err(Error::InvalidSensor(self.sensor));
        }
        if !(self.range_start >= 0.0 && self.range_start.is_finite()) {
            return Err(Error::InvalidRangeStart(self.range_start));
        }
        if !(self.range_length > 0.0 && self.range_length.is_finite()) {
            return Err(Error::InvalidRangeLength(self.range_length));
        }
        if let Some(rate) = self.update_rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(Error::InvalidUpdateRate(rate));
            }
        }
        Ok(self)
    }
}

const DEFAULT_UPDATE_RATE: f32 = 100.0;

impl TryFrom<DistanceArgs> for Config {
    type Error = Error;

    fn try_from(args: DistanceArgs) -> Result<Self, Self::Error> {
        Config {
            count: args.count,
            sensor: args.common.sensor,
            range_start: args.range_start,
            range_length: args.range_length,
            update_rate: None,
            period: Duration::from_millis(args.period_ms),
            log_dir: args.common.log_dir,
            target: args.common.target,
            log_level: args.common.rust_log,
            tracy: args.common.tracy,
        }
        .validate()
    }
}

impl TryFrom<EnvelopeArgs> for Config {
    type Error = Error;

    fn try_from(args: EnvelopeArgs) -> Result<Self, Self::Error> {
        Config {
            count: args.count,
            sensor: args.common.sensor,
            range_start: args.range_start,
            range_length: args.range_length,
            update_rate: Some(args.update_rate),
            period: Duration::from_millis(args.period_ms),
            log_dir: args.common.log_dir,
            target: args.common.target,
            log_level: args.common.rust_log,
            tracy: args.common.tracy,
        }
        .validate()
    }
}

/// Reason to exit without running the acquisition loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    /// Help or version was requested
    Help(String),
    /// The command line was invalid
    Usage(String),
}

impl Exit {
    /// 0 for help, 1 for usage errors.
    pub fn code(&self) -> ExitCode {
        match self {
            Exit::Help(_) => ExitCode::SUCCESS,
            Exit::Usage(_) => ExitCode::FAILURE,
        }
    }

    /// Text to print before exiting.
    pub fn message(&self) -> &str {
        match self {
            Exit::Help(msg) | Exit::Usage(msg) => msg,
        }
    }

    /// Prints the message, help to stdout and usage errors to stderr, and
    /// returns the process exit code.
    pub fn report(self) -> ExitCode {
        match &self {
            Exit::Help(msg) => print!("{}", msg),
            Exit::Usage(msg) => eprint!("{}", msg),
        }
        self.code()
    }
}

impl From<clap::Error> for Exit {
    fn from(err: clap::Error) -> Self {
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Exit::Help(err.to_string()),
            _ => Exit::Usage(err.to_string()),
        }
    }
}

/// Parses the command line of the `P` front-end into a validated [`Config`].
pub fn parse<P, I, T>(args: I) -> Result<Config, Exit>
where
    P: Parser,
    Config: TryFrom<P, Error = Error>,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let parsed = P::try_parse_from(args)?;
    Config::try_from(parsed).map_err(|err| {
        Exit::Usage(format!(
            "error: {}\n\n{}\n\nFor more information, try '--help'.\n",
            err,
            P::command().render_usage()
        ))
    })
}
