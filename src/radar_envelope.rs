// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::process::ExitCode;

use radarlog::{
    app::{self, Mode},
    args::{self, EnvelopeArgs},
    logging,
};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match args::parse::<EnvelopeArgs, _, _>(std::env::args_os()) {
        Ok(config) => config,
        Err(exit) => return exit.report(),
    };

    if let Err(err) = logging::init(config.log_level, config.tracy) {
        eprintln!("unable to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }

    app::main(Mode::Envelope, config).await
}
