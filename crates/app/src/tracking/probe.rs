//! Diagnostic client that connects to a running streamer and logs what it
//! receives.

use std::{
    io::{BufRead, BufReader},
    net::TcpStream,
};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::tracking::{
    config::ProbeConfig,
    report::FrameReport,
    transport::TransportError,
    wire::{Framing, ReportReader},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub reports: u64,
    pub hands: u64,
}

pub fn run_probe(config: ProbeConfig) -> Result<ProbeSummary> {
    let addr = config.server_addr;
    let stream =
        TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
    info!(
        "Connected to {addr}, reading {} reports",
        config.framing.as_str()
    );
    let summary = probe_stream(BufReader::new(stream), config.framing, config.max_reports)
        .with_context(|| format!("failed to read reports from {addr}"))?;
    info!(
        "Probe finished: {} report(s), {} hand(s)",
        summary.reports, summary.hands
    );
    Ok(summary)
}

pub(crate) fn probe_stream<R: BufRead>(
    reader: R,
    framing: Framing,
    max_reports: Option<u64>,
) -> Result<ProbeSummary, TransportError> {
    let mut reader = ReportReader::new(reader, framing);
    let mut summary = ProbeSummary::default();
    while max_reports.is_none_or(|max| summary.reports < max) {
        let Some(report) = reader.next_report()? else {
            debug!("Server closed the stream");
            break;
        };
        summary.reports += 1;
        summary.hands += report.hands.len() as u64;
        info!("report #{}: {}", summary.reports, summarize(&report));
    }
    Ok(summary)
}

/// One-line description of a report: label and wrist pixel per hand.
pub(crate) fn summarize(report: &FrameReport) -> String {
    if report.hands.is_empty() {
        return "no hands".to_string();
    }
    report
        .hands
        .iter()
        .map(|hand| match hand.landmarks.first() {
            Some(wrist) => format!("{} wrist=({}, {})", hand.label.label(), wrist.x, wrist.y),
            None => format!("{} (no landmarks)", hand.label.label()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
