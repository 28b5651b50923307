//! RTSP message codec (RFC 2326 §4, §6, §7).
//!
//! Parses one complete RTSP message (request or response) from its text
//! representation and serializes messages back to the wire. Framing —
//! reading header lines up to the blank line, then `Content-Length` body
//! bytes — is the connection reader's job; this module always sees a whole
//! message.
//!
//! Headers are kept as an ordered `(name, value)` sequence with
//! case-insensitive lookup, so a peer's `Cseq:` or `transport:` spelling
//! parses the same as the canonical form. `CSeq` values carry an optional
//! trailing method token (`CSeq: 2 DESCRIBE`); serialization always emits
//! it for requests so responses can be paired by eye in traces.

use crate::error::{ParseErrorKind, Result, RtspError};

/// Software identity sent in `User-Agent:` (requests) and `Server:`
/// (responses).
pub const PRODUCT: &str = "rtsp-mcu/0.1";

/// A parsed or under-construction RTSP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/room/audio`).
    pub uri: String,
    /// Sequence number pairing this request with its response.
    pub cseq: u32,
    /// Method token carried on the CSeq line, when present.
    pub cseq_method: Option<String>,
    /// Headers as ordered (name, value) pairs, excluding CSeq and
    /// Content-Length (held separately / computed).
    pub headers: Vec<(String, String)>,
    /// Message body (SDP for DESCRIBE/ANNOUNCE-style payloads).
    pub body: String,
}

impl RtspRequest {
    pub fn new(method: &str, uri: &str, cseq: u32) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            cseq,
            cseq_method: Some(method.to_string()),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup (RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    /// Serialize to the RTSP wire format.
    pub fn serialize(&self) -> String {
        let mut out = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        write_headers(
            &mut out,
            self.cseq,
            self.cseq_method.as_deref(),
            &self.headers,
            &self.body,
        );
        out
    }
}

/// A parsed or under-construction RTSP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspResponse {
    pub status: u16,
    pub reason: String,
    pub cseq: u32,
    /// Method token echoed from the request's CSeq line.
    pub cseq_method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RtspResponse {
    /// Build a response with the standard reason phrase for `status`,
    /// echoing the request's CSeq number and method token.
    pub fn new(status: u16, cseq: u32, cseq_method: Option<&str>) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            cseq,
            cseq_method: cseq_method.map(str::to_string),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn ok(cseq: u32, cseq_method: Option<&str>) -> Self {
        Self::new(200, cseq, cseq_method)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        lookup(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Serialize to the RTSP wire format.
    pub fn serialize(&self) -> String {
        let mut out = format!("RTSP/1.0 {} {}\r\n", self.status, self.reason);
        write_headers(
            &mut out,
            self.cseq,
            self.cseq_method.as_deref(),
            &self.headers,
            &self.body,
        );
        out
    }
}

/// Either side of the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtspMessage {
    Request(RtspRequest),
    Response(RtspResponse),
}

impl RtspMessage {
    pub fn serialize(&self) -> String {
        match self {
            Self::Request(r) => r.serialize(),
            Self::Response(r) => r.serialize(),
        }
    }
}

/// Standard reason phrase for the status codes this core emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        454 => "Session Not Found",
        455 => "Method Not Valid in This State",
        505 => "RTSP Version not supported",
        _ => "Unknown",
    }
}

/// Path segments of an RTSP request URI.
///
/// `rtsp://host:1554/room101/audio` → `["room101", "audio"]`
/// `/room101` → `["room101"]`
pub fn uri_path_segments(uri: &str) -> Vec<String> {
    if uri == "*" {
        return Vec::new();
    }
    let path = uri
        .strip_prefix("rtsp://")
        .map(|rest| rest.find('/').map(|i| &rest[i..]).unwrap_or(""))
        .unwrap_or(uri);
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Current time as an RFC 1123 `Date:` value (RFC 2326 §12.18).
pub fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse one complete RTSP message.
///
/// Fails with [`ParseErrorKind::NotRtsp`] when the first line is neither a
/// request line nor a status line, [`ParseErrorKind::MissingCSeq`] when no
/// CSeq number is present, and [`ParseErrorKind::EmptyPayload`] when
/// `Content-Length` promises more body than was framed.
pub fn parse(raw: &str) -> Result<RtspMessage> {
    let (head, body_raw) = split_head_body(raw);

    let mut lines = head.lines();
    let start_line = lines
        .next()
        .ok_or(RtspError::Parse(ParseErrorKind::NotRtsp))?;

    let mut headers = Vec::new();
    let mut cseq: Option<(u32, Option<String>)> = None;
    let mut content_length: usize = 0;

    for line in lines {
        if line.is_empty() {
            break;
        }
        let colon = line
            .find(':')
            .ok_or(RtspError::Parse(ParseErrorKind::InvalidHeader))?;
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();

        if name.eq_ignore_ascii_case("CSeq") {
            let mut tokens = value.split_whitespace();
            let number = tokens
                .next()
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or(RtspError::Parse(ParseErrorKind::MissingCSeq))?;
            cseq = Some((number, tokens.next().map(str::to_string)));
        } else if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value
                .parse()
                .map_err(|_| RtspError::Parse(ParseErrorKind::InvalidHeader))?;
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let (cseq, cseq_method) = cseq.ok_or(RtspError::Parse(ParseErrorKind::MissingCSeq))?;

    let body = if content_length > 0 {
        if body_raw.len() < content_length {
            return Err(RtspError::Parse(ParseErrorKind::EmptyPayload));
        }
        String::from_utf8_lossy(&body_raw.as_bytes()[..content_length]).into_owned()
    } else {
        String::new()
    };

    if let Some(rest) = start_line.strip_prefix("RTSP/") {
        // Status line: RTSP/1.0 <code> <reason>
        let mut parts = rest.splitn(3, ' ');
        let _version = parts.next();
        let status = parts
            .next()
            .and_then(|t| t.parse::<u16>().ok())
            .ok_or(RtspError::Parse(ParseErrorKind::NotRtsp))?;
        let reason = parts.next().unwrap_or("").to_string();
        return Ok(RtspMessage::Response(RtspResponse {
            status,
            reason,
            cseq,
            cseq_method,
            headers,
            body,
        }));
    }

    // Request line: <METHOD> <uri> RTSP/1.0
    let parts: Vec<&str> = start_line.split_whitespace().collect();
    if parts.len() != 3 || !parts[2].starts_with("RTSP/") {
        return Err(RtspError::Parse(ParseErrorKind::NotRtsp));
    }

    Ok(RtspMessage::Request(RtspRequest {
        method: parts[0].to_string(),
        uri: parts[1].to_string(),
        cseq,
        cseq_method,
        headers,
        body,
    }))
}

fn split_head_body(raw: &str) -> (&str, &str) {
    if let Some((head, body)) = raw.split_once("\r\n\r\n") {
        (head, body)
    } else if let Some((head, body)) = raw.split_once("\n\n") {
        (head, body)
    } else {
        (raw, "")
    }
}

fn lookup<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Headers serialized immediately after CSeq, in this order.
const ORDER_EARLY: [&str; 4] = ["Date", "Session", "Transport", "Content-Type"];

/// Headers serialized after Content-Length, in this order.
const ORDER_LATE: [&str; 7] = [
    "Range",
    "Cache-Control",
    "Public",
    "WWW-Authenticate",
    "Authorization",
    "User-Agent",
    "Server",
];

fn write_headers(
    out: &mut String,
    cseq: u32,
    cseq_method: Option<&str>,
    headers: &[(String, String)],
    body: &str,
) {
    match cseq_method {
        Some(method) => out.push_str(&format!("CSeq: {} {}\r\n", cseq, method)),
        None => out.push_str(&format!("CSeq: {}\r\n", cseq)),
    }

    let in_order = |name: &str| {
        ORDER_EARLY.iter().chain(ORDER_LATE.iter()).any(|o| o.eq_ignore_ascii_case(name))
    };

    for canonical in ORDER_EARLY {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(canonical) {
                out.push_str(&format!("{}: {}\r\n", canonical, value));
            }
        }
    }

    if !body.is_empty() {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }

    for canonical in ORDER_LATE {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(canonical) {
                out.push_str(&format!("{}: {}\r\n", canonical, value));
            }
        }
    }

    for (name, value) in headers {
        if !in_order(name)
            && !name.eq_ignore_ascii_case("CSeq")
            && !name.eq_ignore_ascii_case("Content-Length")
        {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
    }

    out.push_str("\r\n");
    out.push_str(body);
}
