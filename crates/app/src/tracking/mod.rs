//! Hand tracking streamer: captures camera frames, detects hands, and sends
//! per-frame landmark reports to one TCP client.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `session`: The capture → detect → send → display loop and teardown.
//! - `pipeline`: Per-frame detection and report building.
//! - `report`: Wire report types and the handedness policy.
//! - `wire`: Report framing on the byte stream.
//! - `transport`: Single-client TCP listener and connection.
//! - `display`: Preview window and headless sink.
//! - `annotation`: Skeleton and HUD drawing on raw frames.
//! - `probe`: Diagnostic client for a running streamer.
//! - `telemetry`: Tracing subscriber and Prometheus exporter setup.

pub use config::{ProbeCliArgs, ProbeConfig, StreamCliArgs, StreamConfig};
pub use probe::run_probe;
pub use session::run;
pub(crate) use telemetry::init_tracing;

mod annotation;
mod config;
mod display;
mod pipeline;
mod probe;
mod report;
mod session;
mod telemetry;
mod transport;
mod wire;
