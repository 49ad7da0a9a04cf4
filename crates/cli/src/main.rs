// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use consultrs::Cli;
use tracing_subscriber::EnvFilter;

fn setup_logging() {
    // e.g. CONSULT_LOG=consultrs=debug
    let filter = consultrs::env::log_filter()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging();
    if let Err(e) = consultrs::run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
