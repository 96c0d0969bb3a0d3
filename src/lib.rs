// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! RadarLog Library
//!
//! This library drives a pulsed coherent radar sensor through its Radar
//! System Software (RSS) runtime and logs the measurements to the console
//! and to CSV files.
//!
//! # Features
//!
//! - **Distance Detector** - Strongest reflection (distance, amplitude) per
//!   sweep
//! - **Envelope Service** - Full amplitude profile per sweep with bin to
//!   distance conversion
//! - **Acquisition Loop** - Bounded or unbounded blocking polling with
//!   skip-on-failure semantics
//! - **CSV Logging** - Timestamped log files, one per run
//! - **Emulator** - Software runtime for running without a sensor
//!
//! # Binaries
//!
//! - `radar-distance` - Log distance basic detector reflections
//! - `radar-envelope` - Log envelope service sweeps

#![warn(missing_docs)]

/// Acquisition loop and measurement sources
pub mod acquisition;

/// Session wiring shared by the binaries
pub mod app;

/// Command line front-end and run configuration
pub mod args;

/// Emulated RSS runtime
pub mod emulator;

/// CSV log file naming and creation
pub mod logfile;

/// Tracing subscriber setup
pub mod logging;

/// Radar System Software runtime interface
pub mod rss;

/// Bin index to distance conversion
pub mod scale;

/// Console and CSV output
pub mod sink;
