//! Error types for the RTSP signaling core.

use std::fmt;

/// Errors that can occur in the RTSP signaling core.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP messages.
/// - **Negotiation**: [`Negotiation`](Self::Negotiation) — SDP or
///   Transport-header disagreement with the peer.
/// - **Auth**: [`Auth`](Self::Auth) — digest challenge/response failures.
/// - **Session**: [`MethodOutOfOrder`](Self::MethodOutOfOrder) — a method
///   arrived in a state where the transition tables do not allow it.
/// - **Admission**: [`Policy`](Self::Policy) — the server refused to create
///   a session for the connection.
/// - **Transport**: [`Io`](Self::Io), [`TransportClosed`](Self::TransportClosed)
///   — socket/network failures (these bypass the error response; the
///   connection is already dead).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP message (RFC 2326 §4).
    #[error("RTSP parse error: {0}")]
    Parse(ParseErrorKind),

    /// Digest authentication failed (RFC 2069 / RFC 2326 §16.49).
    #[error("authentication error: {0}")]
    Auth(AuthErrorKind),

    /// Codec or transport negotiation with the peer failed.
    #[error("negotiation error: {0}")]
    Negotiation(NegotiationErrorKind),

    /// A request method arrived outside the allowed state transitions.
    #[error("method {method} not valid in state {state}")]
    MethodOutOfOrder { method: String, state: &'static str },

    /// The server's admission policy rejected the connection.
    #[error("policy rejection: {0}")]
    Policy(PolicyErrorKind),

    /// The peer answered with a status the current state has no handler
    /// for (4xx/5xx outside the transition tables).
    #[error("unhandled peer response status {0}")]
    PeerStatus(u16),

    /// The peer closed the TCP connection or a send failed.
    #[error("transport closed")]
    TransportClosed,

    /// A listener address did not validate (`tcp:host:port`).
    #[error("invalid listener address: {0}")]
    BadListenerAddress(String),

    /// An outbound `rtsp://` URL did not validate.
    #[error("invalid RTSP URL: {0}")]
    BadUrl(String),
}

impl RtspError {
    /// RTSP status code this error maps to when answering the peer.
    ///
    /// `None` for errors that never produce a response (the connection is
    /// already unusable, or the failure is purely local).
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Parse(_) => Some(400),
            Self::Auth(AuthErrorKind::NoCredentials) => Some(401),
            Self::Auth(_) => Some(403),
            Self::MethodOutOfOrder { .. } => Some(455),
            Self::Policy(PolicyErrorKind::UnknownRoom) => Some(404),
            Self::Policy(PolicyErrorKind::SessionExists) => Some(454),
            Self::Policy(PolicyErrorKind::UnsupportedAgent) => Some(505),
            Self::Negotiation(_) => Some(400),
            _ => None,
        }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No `CSeq` header, or its value has no leading sequence number.
    MissingCSeq,
    /// First line is neither a request line nor a status line.
    NotRtsp,
    /// `Content-Length` promised a payload that is missing or short.
    EmptyPayload,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCSeq => write!(f, "CSeq header not found"),
            Self::NotRtsp => write!(f, "not an RTSP message"),
            Self::EmptyPayload => write!(f, "empty payload"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Specific kind of digest authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The request carried no `Authorization` header (challenge issued).
    NoCredentials,
    /// The supplied `response=` did not match the expected digest.
    BadResponse,
    /// A second 401 arrived after credentials were already installed.
    RepeatedChallenge,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no credentials supplied"),
            Self::BadResponse => write!(f, "digest response mismatch"),
            Self::RepeatedChallenge => write!(f, "repeated challenge"),
        }
    }
}

/// Specific kind of SDP/transport negotiation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationErrorKind {
    /// No payload type in the peer SDP matches a configured codec.
    NoCompatibleCodec,
    /// A media section lacks a usable `a=control:` attribute.
    BadControlAttr,
    /// The `Transport` header is missing a remote address or port.
    BadTransport,
}

impl fmt::Display for NegotiationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCompatibleCodec => write!(f, "no compatible codec"),
            Self::BadControlAttr => write!(f, "bad control attribute"),
            Self::BadTransport => write!(f, "incomplete transport header"),
        }
    }
}

/// Specific kind of admission-policy rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorKind {
    /// The URI path names no enabled room.
    UnknownRoom,
    /// A session for this peer address already exists.
    SessionExists,
    /// The peer announced an agent this server does not speak to (RealRTSP).
    UnsupportedAgent,
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRoom => write!(f, "unknown room"),
            Self::SessionExists => write!(f, "session already exists"),
            Self::UnsupportedAgent => write!(f, "unsupported agent"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
