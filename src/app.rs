// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Session wiring shared by the `radar-distance` and `radar-envelope`
//! binaries: open the log, bring up the HAL and runtime, create the
//! measurement handle and run the acquisition loop until it finishes or
//! Ctrl-C is pressed.

use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Local;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    acquisition::{self, Acquisition, DistanceSource, EnvelopeSource, Summary},
    args::Config,
    emulator::{EmulatedRuntime, EmulatorConfig},
    logfile,
    rss::{self, EnvelopeService as _, Hal as _, Runtime, Session},
    sink::Sink,
};

/// Errors that end a run with exit status 1.
#[derive(Debug)]
pub enum Error {
    /// The log file could not be created
    Open(PathBuf, io::Error),
    /// HAL init, activation or handle creation failed
    Rss(rss::Error),
    /// The acquisition loop aborted
    Acquisition(acquisition::Error),
}

impl std::error::Error for Error {}

impl From<rss::Error> for Error {
    fn from(err: rss::Error) -> Error {
        Error::Rss(err)
    }
}

impl From<acquisition::Error> for Error {
    fn from(err: acquisition::Error) -> Error {
        Error::Acquisition(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open(path, err) => write!(f, "unable to open {}: {}", path.display(), err),
            Error::Rss(err) => write!(f, "{}", err),
            Error::Acquisition(err) => write!(f, "{}", err),
        }
    }
}

/// Measurement handle driven by a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Distance basic detector
    Distance,
    /// Envelope service
    Envelope,
}

impl Mode {
    /// Prefix of the CSV log name.
    pub fn log_prefix(&self) -> Option<&'static str> {
        match self {
            Mode::Distance => None,
            Mode::Envelope => Some("envelope"),
        }
    }
}

/// Runs one measurement session on `runtime`.  The handle is destroyed and
/// the runtime deactivated before returning, on success and on failure.
pub fn run<R, W, C>(
    runtime: &mut R,
    mode: Mode,
    config: &Config,
    sink: &mut Sink<W, C>,
    stop: &AtomicBool,
) -> Result<Summary, Error>
where
    R: Runtime,
    W: Write,
    C: Write,
{
    let mut hal = runtime.hal_init()?;
    info!("radar system software version {}", runtime.version());
    hal.set_log_level(config.log_level.into());

    let mut session = Session::activate(runtime, &hal)?;
    let acquisition = Acquisition {
        count: config.count,
        period: config.period,
        tracy: config.tracy,
    };

    let summary = match mode {
        Mode::Distance => {
            let detector = session.create_distance_detector(
                config.sensor,
                config.range_start,
                config.range_length,
            )?;
            let mut source = DistanceSource::new(detector);
            acquisition.run(&mut source, sink, &hal, stop)?
        }
        Mode::Envelope => {
            let service = session.create_envelope_service(&config.sweep())?;
            rss::log_metadata(&service.metadata());
            let mut source = EnvelopeSource::new(service);
            acquisition.run(&mut source, sink, &hal, stop)?
        }
    };

    Ok(summary)
}

/// Emulated sensor matching the run configuration.
pub fn emulator_config(config: &Config) -> EmulatorConfig {
    EmulatorConfig {
        target: config.target,
        seed: rand::random(),
        ..Default::default()
    }
}

/// Opens a timestamped CSV log under the configured directory and runs a
/// session on the emulated runtime.  Blocks until the run ends.
pub fn launch(mode: Mode, config: &Config, stop: &AtomicBool) -> Result<Summary, Error> {
    let path = logfile::path(&config.log_dir, mode.log_prefix(), &Local::now());
    println!("Log will be saved to \"{}\"", path.display());
    let file = logfile::create(&path).map_err(|err| Error::Open(path.clone(), err))?;

    let mut sink = Sink::stdout(file, config.period);
    let mut runtime = EmulatedRuntime::new(emulator_config(config));
    run(&mut runtime, mode, config, &mut sink, stop)
}

/// Runs [`launch`] on a blocking thread while watching for Ctrl-C, and
/// converts the outcome into the process exit code.
pub async fn main(mode: Mode, config: Config) -> ExitCode {
    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn(stop_on_ctrl_c(stop.clone()));

    let task = tokio::task::spawn_blocking(move || launch(mode, &config, &stop));
    match task.await {
        Ok(Ok(_)) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("acquisition task failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// The first Ctrl-C ends the loop after the current measurement, a second
/// one exits immediately.
async fn stop_on_ctrl_c(stop: Arc<AtomicBool>) {
    if let Err(err) = signal::ctrl_c().await {
        warn!("unable to listen for ctrl-c: {}", err);
        return;
    }
    info!("stopping after the current measurement, press ctrl-c again to abort");
    stop.store(true, Ordering::Relaxed);

    if signal::ctrl_c().await.is_ok() {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use tracing::level_filters::LevelFilter;

    use super::*;

    fn config(count: u32) -> Config {
        Config {
            count,
            sensor: 1,
            range_start: 0.2,
            range_length: 0.4,
            update_rate: Some(100.0),
            period: Duration::ZERO,
            log_dir: PathBuf::from("log"),
            target: 0.35,
            log_level: LevelFilter::ERROR,
            tracy: false,
        }
    }

    fn emulator() -> EmulatedRuntime {
        EmulatedRuntime::new(EmulatorConfig {
            pace: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_log_prefix() {
        let time = Local::now();
        let distance = logfile::path(Path::new("log"), Mode::Distance.log_prefix(), &time);
        let envelope = logfile::path(Path::new("log"), Mode::Envelope.log_prefix(), &time);
        assert!(!distance.to_string_lossy().contains("envelope"));
        assert!(envelope
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("envelope_"));
    }

    #[test]
    fn test_distance_session() {
        let mut runtime = emulator();
        let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
        let stop = AtomicBool::new(false);

        let summary = run(&mut runtime, Mode::Distance, &config(4), &mut sink, &stop).unwrap();
        assert_eq!(summary.iterations, 4);
        assert!(!runtime.is_active());

        let (csv, _) = sink.into_parts().unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert!(csv.lines().all(|row| row.split(',').count() == 3));
    }

    #[test]
    fn test_envelope_session() {
        let mut runtime = emulator();
        let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
        let stop = AtomicBool::new(false);

        let summary = run(&mut runtime, Mode::Envelope, &config(2), &mut sink, &stop).unwrap();
        assert_eq!(summary.written, 2);

        let (csv, _) = sink.into_parts().unwrap();
        let csv = String::from_utf8(csv).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("sequence,peak_m,"));
        assert_eq!(rows[0].split(',').count(), rows[1].split(',').count());
    }

    #[test]
    fn test_activation_failure_is_fatal() {
        let mut runtime = EmulatedRuntime::new(EmulatorConfig {
            fail_activation: true,
            ..Default::default()
        });
        let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
        let stop = AtomicBool::new(false);

        let err = run(&mut runtime, Mode::Distance, &config(0), &mut sink, &stop).unwrap_err();
        assert!(matches!(err, Error::Rss(rss::Error::Activation)));
    }

    #[test]
    fn test_hal_init_failure_is_fatal() {
        let mut runtime = EmulatedRuntime::new(EmulatorConfig {
            fail_hal_init: true,
            ..Default::default()
        });
        let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
        let stop = AtomicBool::new(false);

        let err = run(&mut runtime, Mode::Envelope, &config(0), &mut sink, &stop).unwrap_err();
        assert!(matches!(err, Error::Rss(rss::Error::HalInit(_))));
        assert!(!runtime.is_active());

        let (csv, _) = sink.into_parts().unwrap();
        assert!(csv.is_empty());
    }

    #[test]
    fn test_oversized_sweep_fails_creation() {
        let stop = AtomicBool::new(false);
        for config in [
            Config {
                range_length: 40.0,
                ..config(1)
            },
            Config {
                update_rate: Some(1e-30),
                ..config(1)
            },
        ] {
            let mut runtime = emulator();
            let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
            let err = run(&mut runtime, Mode::Envelope, &config, &mut sink, &stop).unwrap_err();
            assert!(matches!(err, Error::Rss(rss::Error::Create(_))));
            assert!(!runtime.is_active());
        }
    }

    #[test]
    fn test_invalid_sensor_fails_creation() {
        let mut runtime = emulator();
        let mut sink = Sink::new(Vec::new(), io::sink(), Duration::ZERO);
        let stop = AtomicBool::new(false);
        let config = Config {
            sensor: 7,
            ..config(1)
        };

        let err = run(&mut runtime, Mode::Envelope, &config, &mut sink, &stop).unwrap_err();
        assert!(matches!(err, Error::Rss(rss::Error::Create(_))));
        assert!(!runtime.is_active());
    }

    #[test]
    fn test_launch_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("log");
        std::fs::write(&blocker, b"").unwrap();
        let config = Config {
            log_dir: blocker,
            ..config(1)
        };

        let err = launch(Mode::Distance, &config, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, Error::Open(_, _)));
    }
}
