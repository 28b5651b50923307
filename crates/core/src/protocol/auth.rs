//! HTTP-Digest MD5 authentication for RTSP (RFC 2069 subset).
//!
//! Realm-scoped, nonce-based, no quality-of-protection:
//!
//! ```text
//! HA1      = MD5(username:realm:password)
//! HA2      = MD5(method:uri)
//! response = MD5(HA1:nonce:HA2)
//! ```
//!
//! The server issues a challenge in `WWW-Authenticate:` and verifies the
//! `response=` parameter of `Authorization:`; the client parses the
//! challenge and computes the same chain. Nonces are random per session
//! and never reused.

use md5::{Digest, Md5};

use crate::error::{AuthErrorKind, Result, RtspError};

/// Realm announced in server challenges.
pub const DEFAULT_REALM: &str = "openmcu-ru";

/// One digest challenge: scheme, realm, and a per-session nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub scheme: String,
    pub realm: String,
    pub nonce: String,
}

impl DigestChallenge {
    /// New challenge with a random nonce.
    pub fn new(realm: &str) -> Self {
        use rand::RngExt;
        let mut rng = rand::rng();
        Self {
            scheme: "Digest".to_string(),
            realm: realm.to_string(),
            nonce: format!("{:08x}{:08x}", rng.random::<u32>(), rng.random::<u32>()),
        }
    }

    /// `WWW-Authenticate:` header value.
    pub fn header_value(&self) -> String {
        format!(
            "{} realm=\"{}\",nonce=\"{}\",algorithm=MD5",
            self.scheme, self.realm, self.nonce
        )
    }

    /// Parse a `WWW-Authenticate:` challenge received from a server.
    pub fn parse(value: &str) -> Result<Self> {
        let (scheme, params) = value
            .trim()
            .split_once(' ')
            .ok_or(RtspError::Auth(AuthErrorKind::RepeatedChallenge))?;
        let realm = param(params, "realm");
        let nonce = param(params, "nonce");
        match (realm, nonce) {
            (Some(realm), Some(nonce)) => Ok(Self {
                scheme: scheme.to_string(),
                realm,
                nonce,
            }),
            _ => Err(RtspError::Auth(AuthErrorKind::RepeatedChallenge)),
        }
    }
}

/// Parameters extracted from a peer's `Authorization:` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub username: String,
    pub uri: String,
    pub response: String,
}

/// Parse an `Authorization: Digest ...` header.
pub fn parse_authorization(value: &str) -> Option<AuthorizationParams> {
    let (_scheme, params) = value.trim().split_once(' ')?;
    Some(AuthorizationParams {
        username: param(params, "username")?,
        uri: param(params, "uri")?,
        response: param(params, "response")?,
    })
}

/// The digest response for `(username, password, realm, nonce, method, uri)`.
pub fn compute_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
}

/// `Authorization:` header value for an outbound authenticated request.
pub fn authorization_header(
    username: &str,
    password: &str,
    challenge: &DigestChallenge,
    method: &str,
    uri: &str,
) -> String {
    let response = compute_response(
        username,
        password,
        &challenge.realm,
        &challenge.nonce,
        method,
        uri,
    );
    format!(
        "{} username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        challenge.scheme, username, challenge.realm, challenge.nonce, uri, response
    )
}

/// Verify a peer's `Authorization:` against the issued challenge.
///
/// The expected digest is recomputed from the configured credentials and
/// the uri the peer signed; only the `response=` parameter is compared.
pub fn verify(
    username: &str,
    password: &str,
    challenge: &DigestChallenge,
    method: &str,
    authorization: &str,
) -> bool {
    let Some(params) = parse_authorization(authorization) else {
        return false;
    };
    let expected = compute_response(
        username,
        password,
        &challenge.realm,
        &challenge.nonce,
        method,
        &params.uri,
    );
    expected == params.response
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::new_with_prefix(input).finalize())
}

/// Extract a `key="value"` or `key=value` parameter from a digest
/// parameter list.
fn param(params: &str, key: &str) -> Option<String> {
    for part in params.split(',') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(key) {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }
    None
}
