// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

/// Installs the global tracing subscriber: stderr, journald when available,
/// and Tracy when requested.  Records from the `log` facade are forwarded.
///
/// The console layer writes to stderr so it does not interleave with the
/// measurement lines printed on stdout.
pub fn init(level: LevelFilter, tracy: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracy.then(tracy_client::Client::start);

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(level);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };

    let tracy = match tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(level)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stderr_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}
