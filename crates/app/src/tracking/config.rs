//! Configuration parsing for the streamer and the probe client.
//!
//! CLI arguments are translated once into [`StreamConfig`] / [`ProbeConfig`];
//! nothing downstream re-reads flags.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Result, bail};
use clap::Args;
use ml_core::DetectorOptions;

use crate::tracking::{report::HandednessPolicy, wire::Framing};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:65431";
pub const DEFAULT_DEVICE: &str = "0";

/// Canonical configuration for one streaming session.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    /// Address the server listens on for its single client.
    pub listen_addr: SocketAddr,
    /// Camera device index, device path or file.
    pub device: String,
    /// How reports are delimited on the socket.
    pub framing: Framing,
    /// How detector handedness maps to the reported label.
    pub handedness: HandednessPolicy,
    /// TorchScript hand landmark model.
    pub model_path: Option<PathBuf>,
    pub detector: DetectorOptions,
    /// Show the annotated preview window.
    pub display: bool,
    /// Serve Prometheus metrics here when set.
    pub metrics_addr: Option<SocketAddr>,
    pub verbose: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 65431)),
            device: DEFAULT_DEVICE.to_string(),
            framing: Framing::default(),
            handedness: HandednessPolicy::default(),
            model_path: None,
            detector: DetectorOptions::default(),
            display: true,
            metrics_addr: None,
            verbose: false,
        }
    }
}

/// CLI arguments accepted by the streamer.
#[derive(Debug, Args)]
pub struct StreamCliArgs {
    /// Address to listen on for the client.
    #[arg(long = "listen", value_name = "ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,
    /// Camera device index, /dev/video path or video file.
    #[arg(long = "device", value_name = "DEVICE", default_value = DEFAULT_DEVICE)]
    pub device: String,
    /// Framing used for reports on the socket.
    #[arg(long = "framing", value_enum, default_value_t = Framing::Ndjson)]
    pub framing: Framing,
    /// Whether to swap the detector's left/right label.
    #[arg(long = "handedness", value_enum, default_value_t = HandednessPolicy::Mirror)]
    pub handedness: HandednessPolicy,
    /// TorchScript hand landmark model.
    #[arg(long = "model", value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Minimum score for a newly detected hand.
    #[arg(long = "min-detection-confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub min_detection_confidence: f32,
    /// Minimum score to keep reporting a tracked hand.
    #[arg(long = "min-tracking-confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub min_tracking_confidence: f32,
    /// Maximum number of hands reported per frame.
    #[arg(long = "max-hands", value_name = "N", default_value_t = 2)]
    pub max_hands: usize,
    /// Run without the preview window.
    #[arg(long = "no-display", action = clap::ArgAction::SetTrue)]
    pub no_display: bool,
    /// Serve Prometheus metrics on this address.
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<StreamCliArgs> for StreamConfig {
    type Error = anyhow::Error;

    fn try_from(args: StreamCliArgs) -> Result<Self> {
        let detector = DetectorOptions {
            min_detection_confidence: args.min_detection_confidence,
            min_tracking_confidence: args.min_tracking_confidence,
            max_num_hands: args.max_hands,
        };
        detector.validate()?;

        if args.device.trim().is_empty() {
            bail!("--device must not be empty");
        }
        if let Some(path) = args.model.as_ref()
            && !path.is_file()
        {
            bail!("Model file {} does not exist", path.display());
        }
        if args.metrics_addr == Some(args.listen) {
            bail!("--metrics-addr must differ from --listen");
        }

        Ok(Self {
            listen_addr: args.listen,
            device: args.device,
            framing: args.framing,
            handedness: args.handedness,
            model_path: args.model,
            detector,
            display: !args.no_display,
            metrics_addr: args.metrics_addr,
            verbose: args.verbose,
        })
    }
}

/// Configuration for the probe client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub server_addr: SocketAddr,
    pub framing: Framing,
    /// Stop after this many reports; run until EOF when unset.
    pub max_reports: Option<u64>,
    pub verbose: bool,
}

/// CLI arguments accepted by the `probe` subcommand.
#[derive(Debug, Args)]
pub struct ProbeCliArgs {
    /// Server address to connect to.
    #[arg(long = "connect", value_name = "ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub connect: SocketAddr,
    /// Framing the server was started with.
    #[arg(long = "framing", value_enum, default_value_t = Framing::Ndjson)]
    pub framing: Framing,
    /// Exit after this many reports.
    #[arg(long = "max-reports", value_name = "N")]
    pub max_reports: Option<u64>,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<ProbeCliArgs> for ProbeConfig {
    type Error = anyhow::Error;

    fn try_from(args: ProbeCliArgs) -> Result<Self> {
        if args.max_reports == Some(0) {
            bail!("--max-reports must be at least 1");
        }
        Ok(Self {
            server_addr: args.connect,
            framing: args.framing,
            max_reports: args.max_reports,
            verbose: args.verbose,
        })
    }
}
