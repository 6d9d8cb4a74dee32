//! Logging and metrics setup.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt,
    layer::SubscriberExt,
    prelude::*,
};

pub(crate) const FRAMES_TOTAL: &str = "hand_stream_frames_total";
pub(crate) const FRAMES_SKIPPED_TOTAL: &str = "hand_stream_frames_skipped_total";
pub(crate) const REPORTS_SENT_TOTAL: &str = "hand_stream_reports_sent_total";
pub(crate) const BYTES_SENT_TOTAL: &str = "hand_stream_bytes_sent_total";
pub(crate) const HANDS_DETECTED: &str = "hand_stream_hands_detected";
pub(crate) const FPS: &str = "hand_stream_fps";

/// Install the global fmt subscriber. `RUST_LOG` wins over `verbose`.
pub(crate) fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter),
        )
        .try_init();
}

/// Serve Prometheus metrics on `addr` and describe the session metrics.
pub(crate) fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start Prometheus exporter on {addr}"))?;

    metrics::describe_counter!(FRAMES_TOTAL, "Frames pulled from the camera");
    metrics::describe_counter!(
        FRAMES_SKIPPED_TOTAL,
        "Empty camera reads that were skipped"
    );
    metrics::describe_counter!(REPORTS_SENT_TOTAL, "Reports written to the client");
    metrics::describe_counter!(
        BYTES_SENT_TOTAL,
        metrics::Unit::Bytes,
        "Framed bytes written to the client"
    );
    metrics::describe_gauge!(HANDS_DETECTED, "Hands found in the latest frame");
    metrics::describe_gauge!(FPS, "Smoothed capture loop frame rate");
    tracing::info!("Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}
