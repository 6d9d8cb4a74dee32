//! Byte framing for reports on the TCP stream.
//!
//! ```text
//! ndjson           {"hands":[...]}\n
//! length-prefixed  [u32 big-endian length][{"hands":[...]}]
//! raw              {"hands":[...]}{"hands":[...]}...
//! ```
//!
//! Compact JSON never contains a raw newline, so `ndjson` needs no escaping.
//! `raw` has no delimiter at all and only exists for consumers written against
//! the older unframed stream; readers must parse it incrementally.

use std::io::BufRead;

use clap::ValueEnum;
use serde_json::{StreamDeserializer, de::IoRead};

use crate::tracking::{report::FrameReport, transport::TransportError};

/// Largest payload accepted in `length-prefixed` mode.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// One JSON object per line.
    #[default]
    Ndjson,
    /// Four-byte big-endian length header before every payload.
    LengthPrefixed,
    /// Back-to-back JSON objects with no delimiter.
    Raw,
}

impl Framing {
    pub fn as_str(self) -> &'static str {
        match self {
            Framing::Ndjson => "ndjson",
            Framing::LengthPrefixed => "length-prefixed",
            Framing::Raw => "raw",
        }
    }
}

/// Append one framed payload to `out`.
pub fn encode_frame(
    framing: Framing,
    payload: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), TransportError> {
    match framing {
        Framing::Ndjson => {
            if payload.contains(&b'\n') {
                return Err(TransportError::EmbeddedNewline);
            }
            out.reserve(payload.len() + 1);
            out.extend_from_slice(payload);
            out.push(b'\n');
        }
        Framing::LengthPrefixed => {
            if payload.len() > MAX_PAYLOAD_LEN {
                return Err(TransportError::PayloadTooLarge {
                    len: payload.len(),
                    max: MAX_PAYLOAD_LEN,
                });
            }
            out.reserve(payload.len() + 4);
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(payload);
        }
        Framing::Raw => out.extend_from_slice(payload),
    }
    Ok(())
}

/// Decodes framed reports from a byte stream.
pub struct ReportReader<R: BufRead> {
    decoder: Decoder<R>,
}

enum Decoder<R: BufRead> {
    Delimited {
        inner: R,
        framing: Framing,
        buf: Vec<u8>,
    },
    Stream(StreamDeserializer<'static, IoRead<R>, FrameReport>),
}

impl<R: BufRead> ReportReader<R> {
    pub fn new(inner: R, framing: Framing) -> Self {
        let decoder = match framing {
            Framing::Raw => {
                Decoder::Stream(serde_json::Deserializer::from_reader(inner).into_iter())
            }
            Framing::Ndjson | Framing::LengthPrefixed => Decoder::Delimited {
                inner,
                framing,
                buf: Vec::with_capacity(4096),
            },
        };
        Self { decoder }
    }

    /// Next report, or `None` once the peer has closed the stream cleanly.
    pub fn next_report(&mut self) -> Result<Option<FrameReport>, TransportError> {
        match &mut self.decoder {
            Decoder::Stream(stream) => stream.next().transpose().map_err(TransportError::Decode),
            Decoder::Delimited {
                inner,
                framing: Framing::LengthPrefixed,
                buf,
            } => read_length_prefixed(inner, buf),
            Decoder::Delimited { inner, buf, .. } => read_line(inner, buf),
        }
    }
}

fn read_line<R: BufRead>(
    inner: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<FrameReport>, TransportError> {
    loop {
        buf.clear();
        let read = inner
            .read_until(b'\n', buf)
            .map_err(TransportError::Receive)?;
        if read == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }
        return serde_json::from_slice(buf)
            .map(Some)
            .map_err(TransportError::Decode);
    }
}

fn read_length_prefixed<R: BufRead>(
    inner: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<FrameReport>, TransportError> {
    if inner.fill_buf().map_err(TransportError::Receive)?.is_empty() {
        return Ok(None);
    }
    let mut header = [0u8; 4];
    inner
        .read_exact(&mut header)
        .map_err(TransportError::Receive)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(TransportError::PayloadTooLarge {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    buf.clear();
    buf.resize(len, 0);
    inner.read_exact(buf).map_err(TransportError::Receive)?;
    serde_json::from_slice(buf)
        .map(Some)
        .map_err(TransportError::Decode)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use ml_core::{Handedness, NormalizedLandmark};

    use super::*;
    use crate::tracking::report::{HandednessPolicy, tests::detection_with_middle_mcp};

    fn sample_payload() -> Vec<u8> {
        let detection =
            detection_with_middle_mcp(Handedness::Right, NormalizedLandmark::new(0.5, 0.5, -0.1));
        FrameReport::from_detections(&[detection], 640, 480, HandednessPolicy::Mirror)
            .to_json_bytes()
            .unwrap()
    }

    fn encode_all(framing: Framing, payloads: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for payload in payloads {
            encode_frame(framing, payload, &mut out).unwrap();
        }
        out
    }

    fn decode_all(framing: Framing, bytes: Vec<u8>) -> Vec<FrameReport> {
        let mut reader = ReportReader::new(Cursor::new(bytes), framing);
        let mut reports = Vec::new();
        while let Some(report) = reader.next_report().unwrap() {
            reports.push(report);
        }
        reports
    }

    #[test]
    fn ndjson_writes_one_line_per_report() {
        let payload = sample_payload();
        let bytes = encode_all(Framing::Ndjson, &[payload.clone(), payload.clone()]);
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(text.ends_with('\n'));
        assert_eq!(lines[0].as_bytes(), payload.as_slice());
    }

    #[test]
    fn ndjson_rejects_payloads_with_newlines() {
        let mut out = Vec::new();
        let err = encode_frame(Framing::Ndjson, b"{\n}", &mut out).unwrap_err();
        assert!(matches!(err, TransportError::EmbeddedNewline));
        assert!(out.is_empty());
    }

    #[test]
    fn length_prefix_is_big_endian_payload_length() {
        let payload = sample_payload();
        let bytes = encode_all(Framing::LengthPrefixed, &[payload.clone()]);
        assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], payload.as_slice());
    }

    #[test]
    fn oversized_payloads_are_rejected_both_ways() {
        let mut out = Vec::new();
        let big = vec![b' '; MAX_PAYLOAD_LEN + 1];
        let err = encode_frame(Framing::LengthPrefixed, &big, &mut out).unwrap_err();
        let TransportError::PayloadTooLarge { len, max } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!((len, max), (MAX_PAYLOAD_LEN + 1, MAX_PAYLOAD_LEN));

        let header = ((MAX_PAYLOAD_LEN + 1) as u32).to_be_bytes().to_vec();
        let mut reader = ReportReader::new(Cursor::new(header), Framing::LengthPrefixed);
        assert!(matches!(
            reader.next_report(),
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn every_framing_decodes_what_it_encodes() {
        let payload = sample_payload();
        let expected: FrameReport = serde_json::from_slice(&payload).unwrap();
        for framing in [Framing::Ndjson, Framing::LengthPrefixed, Framing::Raw] {
            let bytes = encode_all(framing, &[payload.clone(), payload.clone(), payload.clone()]);
            let reports = decode_all(framing, bytes);
            assert_eq!(reports.len(), 3, "{}", framing.as_str());
            assert!(reports.iter().all(|report| *report == expected));
        }
    }

    #[test]
    fn truncated_length_prefixed_frame_is_an_error() {
        let mut bytes = encode_all(Framing::LengthPrefixed, &[sample_payload()]);
        bytes.truncate(bytes.len() - 3);
        let mut reader = ReportReader::new(Cursor::new(bytes), Framing::LengthPrefixed);
        assert!(matches!(
            reader.next_report(),
            Err(TransportError::Receive(_))
        ));
    }

    #[test]
    fn ndjson_reader_skips_blank_lines_and_reports_garbage() {
        let mut bytes = b"\r\n\n".to_vec();
        bytes.extend(encode_all(Framing::Ndjson, &[sample_payload()]));
        bytes.extend_from_slice(b"not json\n");
        let mut reader = ReportReader::new(Cursor::new(bytes), Framing::Ndjson);

        assert_eq!(reader.next_report().unwrap().unwrap().hands.len(), 1);
        assert!(matches!(reader.next_report(), Err(TransportError::Decode(_))));
    }

    #[test]
    fn framing_names_match_cli_values() {
        for framing in Framing::value_variants() {
            let value = framing.to_possible_value().unwrap();
            assert_eq!(value.get_name(), framing.as_str());
        }
    }
}
