//! `Transport` header negotiation (RFC 2326 §12.39).
//!
//! The header is a semicolon-separated token list:
//!
//! ```text
//! Client → Server:
//!   Transport: RTP/AVP;unicast;client_port=8000-8001
//!
//! Server → Client:
//!   Transport: RTP/AVP;unicast;client_port=8000-8001;source=192.0.2.10;server_port=5000-5001
//! ```
//!
//! Recognized keys: `unicast`, `source`, `client_port`, `server_port`,
//! `ssrc`, `mode`. The profile is treated as RTP over UDP whether the
//! peer writes `RTP/AVP` or `RTP/AVP/UDP`. Replies are rebuilt from the
//! peer's own token list — unrecognized tokens and their order survive,
//! only `source` and `server_port` are added — because several clients
//! reject responses that reshuffle the header.

use crate::error::{NegotiationErrorKind, Result, RtspError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Valueless token such as `RTP/AVP` or `unicast`.
    Flag(String),
    /// `key=value` token.
    Pair(String, String),
}

/// A parsed `Transport` header value preserving token order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParams {
    tokens: Vec<Token>,
}

impl TransportParams {
    /// Parse a header value. Never fails; unknown tokens are preserved.
    pub fn parse(header: &str) -> Self {
        let tokens = header
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| match t.split_once('=') {
                Some((key, value)) if !value.is_empty() => {
                    Token::Pair(key.to_string(), value.to_string())
                }
                // "key=" artifacts collapse to a bare token.
                Some((key, _)) => Token::Flag(key.to_string()),
                None => Token::Flag(t.to_string()),
            })
            .collect();
        Self { tokens }
    }

    /// Value of `key=...`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens.iter().find_map(|t| match t {
            Token::Pair(k, v) if k.eq_ignore_ascii_case(key) => Some(v.as_str()),
            _ => None,
        })
    }

    /// Update `key=value`, appending when the key is new. An empty value
    /// leaves a bare token.
    pub fn set(&mut self, key: &str, value: &str) {
        let token = if value.is_empty() {
            Token::Flag(key.to_string())
        } else {
            Token::Pair(key.to_string(), value.to_string())
        };
        for t in &mut self.tokens {
            let name = match t {
                Token::Flag(k) | Token::Pair(k, _) => k.as_str(),
            };
            if name.eq_ignore_ascii_case(key) {
                *t = token;
                return;
            }
        }
        self.tokens.push(token);
    }

    /// Parse a `key=lo-hi` port range, returning the pair.
    pub fn port_pair(&self, key: &str) -> Option<(u16, u16)> {
        let value = self.get(key)?;
        let (lo, hi) = value.split_once('-')?;
        Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
    }

    /// Re-serialize as a header value.
    pub fn to_header(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Flag(k) => k.clone(),
                Token::Pair(k, v) => format!("{}={}", k, v),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Peer RTP endpoint extracted from transport negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub ip: String,
    pub port: u16,
}

fn require_endpoint(ip: String, port: u16) -> Result<RemoteEndpoint> {
    if ip.is_empty() || ip == "0.0.0.0" || port == 0 {
        return Err(RtspError::Negotiation(NegotiationErrorKind::BadTransport));
    }
    Ok(RemoteEndpoint { ip, port })
}

/// Where an inbound SETUP's peer wants RTP sent: `client_port` plus the
/// connection's peer host.
pub fn remote_from_request(params: &TransportParams, peer_host: &str) -> Result<RemoteEndpoint> {
    let port = params.port_pair("client_port").map(|(rtp, _)| rtp).unwrap_or(0);
    require_endpoint(peer_host.to_string(), port)
}

/// Where a SETUP response's server receives RTP: `source` (falling back
/// to the TCP peer host) plus `server_port`.
pub fn remote_from_response(
    params: &TransportParams,
    fallback_host: &str,
) -> Result<RemoteEndpoint> {
    let ip = params
        .get("source")
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback_host)
        .to_string();
    let port = params.port_pair("server_port").map(|(rtp, _)| rtp).unwrap_or(0);
    require_endpoint(ip, port)
}

/// `Transport` value for an outbound SETUP request.
pub fn client_request_value(local_port: u16) -> String {
    format!(
        "RTP/AVP/UDP;unicast;client_port={}-{}",
        local_port,
        local_port + 1
    )
}

/// `Transport` value answering an inbound SETUP: the peer's own token
/// list with `source` and `server_port` added.
pub fn server_reply_value(request_value: &str, nat_ip: &str, local_port: u16) -> String {
    let mut params = TransportParams::parse(request_value);
    params.set("source", nat_ip);
    params.set(
        "server_port",
        &format!("{}-{}", local_port, local_port + 1),
    );
    params.to_header()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_with_unknown_tokens() {
        let value =
            "RTP/AVP/UDP;unicast;source=192.168.1.1;client_port=5002-5003;server_port=52069-52070;ssrc=C7F3A123;mode=play";
        let params = TransportParams::parse(value);
        assert_eq!(params.to_header(), value);
        assert_eq!(params.get("ssrc"), Some("C7F3A123"));
        assert_eq!(params.port_pair("client_port"), Some((5002, 5003)));
    }

    #[test]
    fn empty_value_collapses_to_bare_token() {
        let params = TransportParams::parse("RTP/AVP;unicast;mode=;client_port=8000-8001");
        assert_eq!(params.to_header(), "RTP/AVP;unicast;mode;client_port=8000-8001");
    }

    #[test]
    fn set_replaces_in_place_and_appends_new() {
        let mut params = TransportParams::parse("RTP/AVP;unicast;source=old");
        params.set("source", "192.0.2.10");
        params.set("server_port", "5000-5001");
        assert_eq!(
            params.to_header(),
            "RTP/AVP;unicast;source=192.0.2.10;server_port=5000-5001"
        );
    }

    #[test]
    fn server_reply_preserves_peer_token_order() {
        let reply = server_reply_value(
            "RTP/AVP;unicast;client_port=8000-8001",
            "192.0.2.10",
            5000,
        );
        assert_eq!(
            reply,
            "RTP/AVP;unicast;client_port=8000-8001;source=192.0.2.10;server_port=5000-5001"
        );
    }

    #[test]
    fn client_request_value_format() {
        assert_eq!(
            client_request_value(7078),
            "RTP/AVP/UDP;unicast;client_port=7078-7079"
        );
    }

    #[test]
    fn remote_from_request_uses_peer_host() {
        let params = TransportParams::parse("RTP/AVP;unicast;client_port=55986-55987");
        let remote = remote_from_request(&params, "198.51.100.7").unwrap();
        assert_eq!(remote.ip, "198.51.100.7");
        assert_eq!(remote.port, 55986);
    }

    #[test]
    fn remote_from_request_without_ports_fails() {
        let params = TransportParams::parse("RTP/AVP;unicast");
        assert!(remote_from_request(&params, "198.51.100.7").is_err());
    }

    #[test]
    fn remote_from_response_prefers_source() {
        let params = TransportParams::parse(
            "RTP/AVP;unicast;source=203.0.113.5;client_port=5002-5003;server_port=52069-52070",
        );
        let remote = remote_from_response(&params, "198.51.100.7").unwrap();
        assert_eq!(remote.ip, "203.0.113.5");
        assert_eq!(remote.port, 52069);
    }

    #[test]
    fn remote_from_response_falls_back_to_peer_host() {
        let params = TransportParams::parse("RTP/AVP;unicast;server_port=52069-52070");
        let remote = remote_from_response(&params, "198.51.100.7").unwrap();
        assert_eq!(remote.ip, "198.51.100.7");
    }

    #[test]
    fn wildcard_source_is_incomplete() {
        let params = TransportParams::parse("RTP/AVP;unicast;source=0.0.0.0;server_port=5000-5001");
        assert!(remote_from_response(&params, "").is_err());
    }
}
