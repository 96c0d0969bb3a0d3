// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Blocking acquisition loop.
//!
//! A [`Source`] wraps one measurement handle and turns each sweep into a
//! [`Sample`] in physical units.  [`Acquisition::run`] pulls samples one at a
//! time and hands them to the [`Sink`] until the iteration count runs out or
//! the stop flag is raised.  Per-sample failures are logged and skipped;
//! failing to start the source aborts the run.

use std::{
    fmt,
    io::Write,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tracing::{debug, info, instrument, warn};
use tracy_client::{frame_mark, plot};

use crate::{
    rss::{self, DistanceDetector, EnvelopeService, Hal, ServiceStatus},
    scale::Scale,
    sink::{self, Sink},
};

/// Fatal acquisition errors.
#[derive(Debug)]
pub enum Error {
    /// The source could not be started
    Start(rss::Error),
    /// The sample could not be written to the log
    Sink(sink::Error),
}

impl std::error::Error for Error {}

impl From<sink::Error> for Error {
    fn from(err: sink::Error) -> Error {
        Error::Sink(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Start(err) => write!(f, "unable to start measurement: {}", err),
            Error::Sink(err) => write!(f, "unable to write sample: {}", err),
        }
    }
}

/// Amplitude part of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amplitude<'a> {
    /// Amplitude of the strongest reflection
    Scalar(u16),
    /// Amplitude of every bin of the sweep
    Profile {
        /// Bin index to distance conversion
        scale: Scale,
        /// Amplitude per bin
        data: &'a [u16],
    },
}

/// One measurement in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<'a> {
    /// Iteration index, starting at 0
    pub sequence: u32,
    /// Distance in meters of the strongest reflection
    pub distance: f64,
    /// Reflection amplitude or sweep profile
    pub amplitude: Amplitude<'a>,
}

/// A measurement handle driven by the acquisition loop.
pub trait Source {
    /// Starts measuring.  Failure is fatal to the run.
    fn start(&mut self) -> Result<(), rss::Error>;

    /// Blocks until the next measurement is available.
    fn next(&mut self, sequence: u32) -> Result<Sample<'_>, rss::Error>;

    /// Stops measuring.  Called once when the loop ends.
    fn stop(&mut self) -> Result<(), rss::Error>;
}

/// Source backed by a distance basic detector.
pub struct DistanceSource<D: DistanceDetector> {
    detector: D,
}

impl<D: DistanceDetector> DistanceSource<D> {
    /// Wraps `detector`.
    pub fn new(detector: D) -> Self {
        DistanceSource { detector }
    }
}

impl<D: DistanceDetector> Source for DistanceSource<D> {
    fn start(&mut self) -> Result<(), rss::Error> {
        Ok(())
    }

    fn next(&mut self, sequence: u32) -> Result<Sample<'_>, rss::Error> {
        let reflection = self.detector.get_reflection()?;
        Ok(Sample {
            sequence,
            distance: reflection.distance as f64,
            amplitude: Amplitude::Scalar(reflection.amplitude),
        })
    }

    fn stop(&mut self) -> Result<(), rss::Error> {
        Ok(())
    }
}

/// Source backed by an envelope service.  The bin scale is read from the
/// service metadata on the first measurement and cached.
pub struct EnvelopeSource<S: EnvelopeService> {
    service: S,
    scale: Option<Scale>,
    data: Vec<u16>,
    active: bool,
}

impl<S: EnvelopeService> EnvelopeSource<S> {
    /// Wraps `service`, which is activated when the loop starts.
    pub fn new(service: S) -> Self {
        EnvelopeSource {
            service,
            scale: None,
            data: Vec::new(),
            active: false,
        }
    }

    /// Scale in use, once the first measurement has been requested.
    pub fn scale(&self) -> Option<Scale> {
        self.scale
    }

    fn scale_or_init(&mut self) -> Result<Scale, rss::Error> {
        if let Some(scale) = self.scale {
            return Ok(scale);
        }

        let metadata = self.service.metadata();
        let scale = Scale::from_metadata(&metadata)
            .ok_or(rss::Error::Service(ServiceStatus::FailureDataLength))?;
        debug!(
            "envelope scale: start {:.6} m, {:.6} m per bin, {} bins",
            scale.start(),
            scale.step(),
            scale.len()
        );
        self.data.resize(scale.len(), 0);
        self.scale = Some(scale);
        Ok(scale)
    }
}

impl<S: EnvelopeService> Source for EnvelopeSource<S> {
    fn start(&mut self) -> Result<(), rss::Error> {
        self.service.activate()?;
        self.active = true;
        Ok(())
    }

    fn next(&mut self, sequence: u32) -> Result<Sample<'_>, rss::Error> {
        let scale = self.scale_or_init()?;
        let info = self.service.get_next(&mut self.data)?;

        if info.missed_data {
            warn!("envelope sweep {} missed data", info.sequence_number);
        }
        if info.data_saturated {
            warn!("envelope sweep {} saturated", info.sequence_number);
        }
        if info.sensor_communication_error {
            warn!(
                "envelope sweep {} sensor communication error",
                info.sequence_number
            );
        }

        let peak = peak_index(&self.data);
        Ok(Sample {
            sequence,
            distance: scale.distance(peak),
            amplitude: Amplitude::Profile {
                scale,
                data: &self.data,
            },
        })
    }

    fn stop(&mut self) -> Result<(), rss::Error> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.service.deactivate()
    }
}

impl<S: EnvelopeService> Drop for EnvelopeSource<S> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("envelope service deactivate failed: {}", err);
        }
    }
}

/// Index of the first largest amplitude, 0 for an empty sweep.
pub fn peak_index(data: &[u16]) -> usize {
    data.iter()
        .enumerate()
        .fold((0, 0), |(best, max), (index, &value)| {
            if value > max {
                (index, value)
            } else {
                (best, max)
            }
        })
        .0
}

/// Counts reported when the loop finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Iterations run, including skipped ones
    pub iterations: u32,
    /// Samples written to the sink
    pub written: u32,
    /// Measurements that failed and were skipped
    pub skipped: u32,
}

/// Polling loop settings.
#[derive(Debug, Clone, Copy)]
pub struct Acquisition {
    /// Iterations to run, 0 runs until stopped
    pub count: u32,
    /// Pause after each iteration
    pub period: Duration,
    /// Emit Tracy frame marks and plots
    pub tracy: bool,
}

impl Acquisition {
    /// Starts `source` and writes one sample per iteration to `sink` until
    /// `count` iterations have run or `stop` is raised.  Sleeps `period`
    /// through `hal` between iterations.
    pub fn run<S, W, C, H>(
        &self,
        source: &mut S,
        sink: &mut Sink<W, C>,
        hal: &H,
        stop: &AtomicBool,
    ) -> Result<Summary, Error>
    where
        S: Source,
        W: Write,
        C: Write,
        H: Hal,
    {
        source.start().map_err(Error::Start)?;

        let mut summary = Summary::default();
        let mut remaining = self.count;

        while !stop.load(Ordering::Relaxed) {
            let written = self.iterate(source, sink, summary.iterations)?;
            if written {
                summary.written += 1;
            } else {
                summary.skipped += 1;
            }
            summary.iterations = summary.iterations.wrapping_add(1);

            if self.count > 0 {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }

            if !self.period.is_zero() {
                hal.sleep(self.period);
            }
        }

        sink.flush()?;
        if let Err(err) = source.stop() {
            warn!("unable to stop measurement: {}", err);
        }

        info!(
            "acquisition finished: {} iterations, {} written, {} skipped",
            summary.iterations, summary.written, summary.skipped
        );
        Ok(summary)
    }

    /// Runs one iteration.  Returns whether a sample was written.
    #[instrument(skip(self, source, sink))]
    fn iterate<S, W, C>(
        &self,
        source: &mut S,
        sink: &mut Sink<W, C>,
        sequence: u32,
    ) -> Result<bool, Error>
    where
        S: Source,
        W: Write,
        C: Write,
    {
        let sample = match source.next(sequence) {
            Ok(sample) => sample,
            Err(err) => {
                warn!("measurement {} skipped: {}", sequence, err);
                return Ok(false);
            }
        };

        if self.tracy {
            plot!("distance", sample.distance);
        }
        sink.write(&sample)?;
        self.tracy.then(frame_mark);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::rss::{EnvelopeMetadata, Reflection, ResultInfo};

    /// HAL that records sleeps and raises the stop flag after a number of
    /// them.
    struct StepHal<'a> {
        sleeps: Cell<u32>,
        stop_after: u32,
        stop: &'a AtomicBool,
    }

    impl Hal for StepHal<'_> {
        fn sleep(&self, _duration: Duration) {
            self.sleeps.set(self.sleeps.get() + 1);
            if self.sleeps.get() >= self.stop_after {
                self.stop.store(true, Ordering::Relaxed);
            }
        }

        fn log_level(&self) -> rss::LogLevel {
            rss::LogLevel::Error
        }

        fn set_log_level(&mut self, _level: rss::LogLevel) {}
    }

    /// Detector that fails on the listed calls.
    struct ScriptedDetector {
        calls: u32,
        failures: Vec<u32>,
    }

    impl DistanceDetector for ScriptedDetector {
        fn get_reflection(&mut self) -> Result<Reflection, rss::Error> {
            let call = self.calls;
            self.calls += 1;
            if self.failures.contains(&call) {
                return Err(ServiceStatus::FailureTimeout.into());
            }
            Ok(Reflection {
                distance: 0.25 + call as f32 * 0.01,
                amplitude: 1000 + call as u16,
            })
        }
    }

    fn detector(failures: Vec<u32>) -> DistanceSource<ScriptedDetector> {
        DistanceSource::new(ScriptedDetector {
            calls: 0,
            failures,
        })
    }

    struct FixedEnvelope {
        metadata: EnvelopeMetadata,
        activate: Result<(), rss::Error>,
        active: bool,
        metadata_reads: Cell<u32>,
    }

    impl FixedEnvelope {
        fn new(activate: Result<(), rss::Error>) -> Self {
            FixedEnvelope {
                metadata: EnvelopeMetadata {
                    actual_start_m: 0.1,
                    actual_length_m: 0.5,
                    data_length: 5,
                    stitch_count: 0,
                    step_length_m: 0.1,
                },
                activate,
                active: false,
                metadata_reads: Cell::new(0),
            }
        }
    }

    impl EnvelopeService for FixedEnvelope {
        fn metadata(&self) -> EnvelopeMetadata {
            self.metadata_reads.set(self.metadata_reads.get() + 1);
            self.metadata
        }

        fn activate(&mut self) -> Result<(), rss::Error> {
            self.activate.clone()?;
            self.active = true;
            Ok(())
        }

        fn deactivate(&mut self) -> Result<(), rss::Error> {
            self.active = false;
            Ok(())
        }

        fn get_next(&mut self, data: &mut [u16]) -> Result<ResultInfo, rss::Error> {
            if !self.active {
                return Err(ServiceStatus::FailureNotActive.into());
            }
            data.copy_from_slice(&[10, 20, 300, 40, 5]);
            Ok(ResultInfo::default())
        }
    }

    fn buffers() -> Sink<Vec<u8>, Vec<u8>> {
        Sink::new(Vec::new(), Vec::new(), Duration::from_millis(100))
    }

    fn rows(sink: Sink<Vec<u8>, Vec<u8>>) -> Vec<String> {
        let (csv, _) = sink.into_parts().unwrap();
        String::from_utf8(csv)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_bounded_count() {
        let stop = AtomicBool::new(false);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: u32::MAX,
            stop: &stop,
        };
        let mut source = detector(vec![]);
        let mut sink = buffers();
        let acquisition = Acquisition {
            count: 7,
            period: Duration::from_millis(100),
            tracy: false,
        };

        let summary = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                iterations: 7,
                written: 7,
                skipped: 0
            }
        );
        // no sleep after the final iteration
        assert_eq!(hal.sleeps.get(), 6);
        assert_eq!(rows(sink).len(), 7);
    }

    #[test]
    fn test_unbounded_runs_until_stopped() {
        let stop = AtomicBool::new(false);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: 250,
            stop: &stop,
        };
        let mut source = detector(vec![]);
        let mut sink = buffers();
        let acquisition = Acquisition {
            count: 0,
            period: Duration::from_millis(100),
            tracy: false,
        };

        let summary = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap();

        assert_eq!(summary.iterations, 250);
        assert_eq!(rows(sink).len(), 250);
    }

    #[test]
    fn test_stop_before_start() {
        let stop = AtomicBool::new(true);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: u32::MAX,
            stop: &stop,
        };
        let mut source = detector(vec![]);
        let mut sink = buffers();
        let acquisition = Acquisition {
            count: 3,
            period: Duration::ZERO,
            tracy: false,
        };

        let summary = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_failed_measurement_is_skipped() {
        let stop = AtomicBool::new(false);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: u32::MAX,
            stop: &stop,
        };
        let mut source = detector(vec![1, 3]);
        let mut sink = buffers();
        let acquisition = Acquisition {
            count: 5,
            period: Duration::ZERO,
            tracy: false,
        };

        let summary = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                iterations: 5,
                written: 3,
                skipped: 2
            }
        );
        let rows = rows(sink);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "0.00,0.250000,1000");
        assert_eq!(rows[1], "0.20,0.270000,1002");
        assert_eq!(rows[2], "0.40,0.290000,1004");
    }

    /// Log file that rejects every write.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_aborts() {
        let stop = AtomicBool::new(false);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: u32::MAX,
            stop: &stop,
        };
        let mut source = detector(vec![]);
        let mut sink = Sink::new(FullDisk, Vec::new(), Duration::ZERO);
        let acquisition = Acquisition {
            count: 5,
            period: Duration::from_millis(10),
            tracy: false,
        };

        let err = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap_err();
        assert!(matches!(err, Error::Sink(sink::Error::Io(_))));
        assert_eq!(source.detector.calls, 1);
        assert_eq!(hal.sleeps.get(), 0);
    }

    #[test]
    fn test_failed_activation_aborts() {
        let stop = AtomicBool::new(false);
        let hal = StepHal {
            sleeps: Cell::new(0),
            stop_after: u32::MAX,
            stop: &stop,
        };
        let mut source = EnvelopeSource::new(FixedEnvelope::new(Err(
            ServiceStatus::FailureUnspecified.into(),
        )));
        let mut sink = buffers();
        let acquisition = Acquisition {
            count: 0,
            period: Duration::from_millis(10),
            tracy: false,
        };

        let err = acquisition
            .run(&mut source, &mut sink, &hal, &stop)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Start(rss::Error::Service(ServiceStatus::FailureUnspecified))
        ));
        assert_eq!(hal.sleeps.get(), 0);
        assert!(rows(sink).is_empty());
    }

    #[test]
    fn test_envelope_scale_cached() {
        let mut source = EnvelopeSource::new(FixedEnvelope::new(Ok(())));
        source.start().unwrap();
        assert_eq!(source.scale(), None);

        for sequence in 0..3 {
            let sample = source.next(sequence).unwrap();
            assert_eq!(sample.sequence, sequence);
            // peak is bin 2 of 5 over 0.5 m starting at 0.1 m
            assert!((sample.distance - 0.3).abs() < 1e-6);
            match sample.amplitude {
                Amplitude::Profile { scale, data } => {
                    assert_eq!(scale.len(), 5);
                    assert_eq!(data, &[10, 20, 300, 40, 5]);
                }
                Amplitude::Scalar(_) => panic!("expected an envelope profile"),
            }
        }

        assert_eq!(source.service.metadata_reads.get(), 1);
        source.stop().unwrap();
        assert!(!source.service.active);
    }

    #[test]
    fn test_peak_index() {
        assert_eq!(peak_index(&[]), 0);
        assert_eq!(peak_index(&[0, 0, 0]), 0);
        assert_eq!(peak_index(&[1, 9, 3, 9]), 1);
        assert_eq!(peak_index(&[1, 2, 3, 4]), 3);
    }
}
