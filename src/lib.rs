//! rampcut - speed-ramped short video assembly.
//!
//! This is the library crate behind the `rampcut` binary. It turns an edit
//! plan into FFmpeg invocations, runs them clip by clip and concatenates
//! the results into one video.

pub mod commands;
pub mod config;
pub mod export;
pub mod project;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used. Logs go
/// to stderr so stdout carries only the progress transcript.
pub fn init_tracing(default_directive: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting rampcut v{}", env!("CARGO_PKG_VERSION"));
}
