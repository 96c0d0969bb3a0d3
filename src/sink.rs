// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    fmt,
    io::{self, Write},
    time::Duration,
};

use csv::WriterBuilder;

use crate::acquisition::{Amplitude, Sample};

/// Output errors.
#[derive(Debug)]
pub enum Error {
    /// Console or log file write failed
    Io(io::Error),
    /// CSV encoding or write failed
    Csv(csv::Error),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Error {
        Error::Csv(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Csv(err) => write!(f, "csv error: {}", err),
        }
    }
}

/// Writes samples as console lines and CSV rows.
///
/// Reflection samples become `elapsed_s,distance_m,amplitude` rows where the
/// elapsed time is the sequence number times the loop period.  Envelope
/// samples become `sequence,peak_m,a0,a1,...` rows, preceded once by a header
/// holding the distance of every bin.  Rows are flushed as they are written.
pub struct Sink<W: Write, C: Write> {
    csv: csv::Writer<W>,
    console: C,
    period: Duration,
    header: bool,
}

impl<W: Write> Sink<W, io::Stdout> {
    /// Sink writing rows to `writer` and lines to stdout.
    pub fn stdout(writer: W, period: Duration) -> Self {
        Sink::new(writer, io::stdout(), period)
    }
}

impl<W: Write, C: Write> Sink<W, C> {
    /// Sink writing rows to `writer` and lines to `console`.  `period` is the
    /// loop period used for the elapsed time column.
    pub fn new(writer: W, console: C, period: Duration) -> Self {
        let csv = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);
        Sink {
            csv,
            console,
            period,
            header: false,
        }
    }

    /// Writes one console line and one CSV row for `sample`.
    pub fn write(&mut self, sample: &Sample) -> Result<(), Error> {
        match sample.amplitude {
            Amplitude::Scalar(amplitude) => self.write_reflection(sample, amplitude),
            Amplitude::Profile { scale, data } => {
                if !self.header {
                    let mut header = vec!["sequence".to_string(), "peak_m".to_string()];
                    header.extend(scale.distances().map(|d| format!("{:.6}", d)));
                    self.csv.write_record(&header)?;
                    self.header = true;
                }
                self.write_envelope(sample, data)
            }
        }
    }

    fn write_reflection(&mut self, sample: &Sample, amplitude: u16) -> Result<(), Error> {
        let elapsed = sample.sequence as f64 * self.period.as_secs_f64();

        writeln!(
            self.console,
            "time:{:5.2}, dis: {:.6}[m], amp:{}",
            elapsed, sample.distance, amplitude
        )?;
        self.csv.write_record([
            format!("{:.2}", elapsed),
            format!("{:.6}", sample.distance),
            amplitude.to_string(),
        ])?;
        self.csv.flush()?;
        Ok(())
    }

    fn write_envelope(&mut self, sample: &Sample, data: &[u16]) -> Result<(), Error> {
        let mut line = format!("#{:<6} peak: {:.6}[m] ", sample.sequence, sample.distance);
        for value in data {
            line.push_str(&format!("{:6}", value));
        }
        writeln!(self.console, "{}", line)?;

        let mut record = Vec::with_capacity(data.len() + 2);
        record.push(sample.sequence.to_string());
        record.push(format!("{:.6}", sample.distance));
        record.extend(data.iter().map(u16::to_string));
        self.csv.write_record(&record)?;
        self.csv.flush()?;
        Ok(())
    }

    /// Pushes buffered rows to the underlying writers.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.csv.flush()?;
        self.console.flush()?;
        Ok(())
    }

    /// Flushes and returns the CSV and console writers.
    pub fn into_parts(self) -> Result<(W, C), Error> {
        let Sink { csv, mut console, .. } = self;
        console.flush()?;
        let writer = csv.into_inner().map_err(|err| err.into_error())?;
        Ok((writer, console))
    }
}
