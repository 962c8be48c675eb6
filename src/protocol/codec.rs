//! Message encoding and decoding.
//!
//! Every message starts with a four byte tag, CRLF, and a content length
//! header:
//!
//! ```text
//! LRSP\r\nContent-Length: 94\r\nStatus: 200\r\n...
//! ```
//!
//! The full frame length is derived from the header alone, see
//! [`frame_length`]. Encoders and decoders share that formula.

use std::str;

use les_types::{LoadInfo, MessageKind, Status};

use crate::error::ProtocolError;

/// `TAG\r\ncontent-length: `, identical in length for every tag.
pub const HEADER_PREFIX_LEN: usize = 4 + 2 + CONTENT_LENGTH_FIELD.len();

/// Bytes peeked before a frame is read: enough for the header of any
/// content length up to six digits.
pub const PEEK_LEN: usize = 30;

const CONTENT_LENGTH_FIELD: &str = "content-length: ";
const CRLF: &[u8] = b"\r\n";

/// Number of decimal digits in `n`. Zero has one digit.
pub fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Total frame size for a message announcing `content_length` body bytes,
/// or `None` when that size does not fit in a `usize`.
pub fn frame_length(content_length: usize) -> Option<usize> {
    let header = HEADER_PREFIX_LEN + decimal_digits(content_length) + CRLF.len();
    header.checked_add(content_length)
}

/// The load request: `LREQ\r\ncontent-length: 0\r\n`.
pub fn encode_request() -> Vec<u8> {
    format!("{}\r\ncontent-length: 0\r\n", MessageKind::LoadRequest.tag()).into_bytes()
}

/// Encode a load response. Negative load estimates are reported as `0.000`.
pub fn encode_response(info: &LoadInfo) -> Vec<u8> {
    let body = format!(
        "Status: {}\r\nDelay-avg: {:.6}\r\nDelay-min: {}\r\nDelay-max: {}\r\nSamples: {}\r\nLoad-type: {:.3}\r\n",
        info.status.code(),
        info.weighted_avg,
        info.min,
        info.max,
        info.nsamples,
        info.reported_load(),
    );
    let mut out = format!(
        "{}\r\nContent-Length: {}\r\n",
        MessageKind::LoadResponse.tag(),
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

/// Parse the content length from the start of a message.
///
/// `bytes` may be a peeked prefix of the frame. The tag is not checked here.
/// Returns the content length; the header occupies
/// `frame_length(n) - n` bytes. Lengths whose frame size overflows are
/// rejected as malformed.
pub fn parse_header(bytes: &[u8]) -> Result<usize, ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::Truncated(bytes.len()));
    }

    let expected = [CRLF, CONTENT_LENGTH_FIELD.as_bytes()].concat();
    let rest = &bytes[4..];
    let matched = rest.len().min(expected.len());
    if !rest[..matched].eq_ignore_ascii_case(&expected[..matched]) {
        return Err(ProtocolError::MissingContentLength);
    }
    if matched < expected.len() {
        return Err(ProtocolError::IncompleteHeader);
    }

    let digits = &rest[expected.len()..];
    let end = digits
        .windows(2)
        .position(|w| w == CRLF)
        .ok_or_else(|| match digits.iter().position(|b| !b.is_ascii_digit() && *b != b'\r') {
            Some(_) => malformed_length(digits),
            None => ProtocolError::IncompleteHeader,
        })?;
    let digits = &digits[..end];

    let canonical = !digits.is_empty()
        && digits.iter().all(u8::is_ascii_digit)
        && (digits.len() == 1 || digits[0] != b'0');
    if !canonical {
        return Err(malformed_length(digits));
    }

    str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n| frame_length(n).is_some())
        .ok_or_else(|| malformed_length(digits))
}

fn malformed_length(digits: &[u8]) -> ProtocolError {
    ProtocolError::MalformedLength(String::from_utf8_lossy(digits).into_owned())
}

/// Decode a complete load response frame.
///
/// Field names are matched case-insensitively. `avg` and `sample_sum` are
/// not carried on the wire and come back as zero.
pub fn decode_response(bytes: &[u8]) -> Result<LoadInfo, ProtocolError> {
    match MessageKind::from_tag(bytes) {
        Some(MessageKind::LoadResponse) => {}
        _ => {
            let tag = &bytes[..bytes.len().min(4)];
            return Err(ProtocolError::UnknownTag(
                String::from_utf8_lossy(tag).into_owned(),
            ));
        }
    }

    let content_length = parse_header(bytes)?;
    let expected = frame_length(content_length)
        .ok_or_else(|| ProtocolError::MalformedLength(content_length.to_string()))?;
    if bytes.len() < expected {
        return Err(ProtocolError::ShortRead {
            expected,
            actual: bytes.len(),
        });
    }
    decode_response_body(&bytes[expected - content_length..expected])
}

/// Decode the field lines of a load response, without its header.
pub fn decode_response_body(body: &[u8]) -> Result<LoadInfo, ProtocolError> {
    let body = str::from_utf8(body).map_err(|_| ProtocolError::MalformedField {
        field: "body",
        value: String::from_utf8_lossy(body).into_owned(),
    })?;

    let mut status = None;
    let mut weighted_avg = None;
    let mut min = None;
    let mut max = None;
    let mut nsamples = None;
    let mut load_type = None;

    for line in body.split("\r\n").filter(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "status" => status = Some(field::<u16>("Status", value)?),
            "delay-avg" => weighted_avg = Some(field::<f64>("Delay-avg", value)?),
            "delay-min" => min = Some(field::<i64>("Delay-min", value)?),
            "delay-max" => max = Some(field::<i64>("Delay-max", value)?),
            "samples" => nsamples = Some(field::<u64>("Samples", value)?),
            "load-type" => load_type = Some(field::<f64>("Load-type", value)?),
            _ => {}
        }
    }

    Ok(LoadInfo::builder()
        .status(Status(status.ok_or(ProtocolError::MissingField("Status"))?))
        .weighted_avg(weighted_avg.ok_or(ProtocolError::MissingField("Delay-avg"))?)
        .min(min.ok_or(ProtocolError::MissingField("Delay-min"))?)
        .max(max.ok_or(ProtocolError::MissingField("Delay-max"))?)
        .nsamples(nsamples.ok_or(ProtocolError::MissingField("Samples"))?)
        .load_type(load_type.ok_or(ProtocolError::MissingField("Load-type"))?)
        .build())
}

fn field<T: str::FromStr>(name: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::MalformedField {
        field: name,
        value: value.to_string(),
    })
}
