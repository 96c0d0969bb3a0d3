// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    fmt::Display,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeZone};
use tracing::debug;

/// Month, day, hour, minute and second of the start of the run.
pub const TIMESTAMP_FORMAT: &str = "%m_%d_%H_%M_%S";

/// Name of the CSV log for a run started at `time`, for example
/// `envelope_03_07_09_05_02.csv`.
pub fn file_name<Tz>(prefix: Option<&str>, time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stamp = time.format(TIMESTAMP_FORMAT);
    match prefix {
        Some(prefix) => format!("{}_{}.csv", prefix, stamp),
        None => format!("{}.csv", stamp),
    }
}

/// Full path of the CSV log under `dir`.
pub fn path<Tz>(dir: &Path, prefix: Option<&str>, time: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dir.join(file_name(prefix, time))
}

/// Creates the log file, and its directory when missing.  An existing file
/// is truncated.
pub fn create(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    debug!("creating log file {}", path.display());
    File::create(path)
}
