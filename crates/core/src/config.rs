//! Signaling configuration.
//!
//! One [`Config`] covers both roles: the server side (listeners, enabled
//! room paths, challenge credentials) and the client side (codec
//! preferences, dial credentials). Defaults produce a working server on
//! `0.0.0.0:1554` with PCMU audio and H.264 video.

use std::time::Duration;

/// Default room joined by inbound sessions.
pub const DEFAULT_ROOM: &str = "room101";

/// Default signaling listener (`host:port`).
pub const DEFAULT_LISTENER: &str = "0.0.0.0:1554";

/// Signaling configuration consumed by the server, sessions, and dialer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Master switch; a disabled config starts no listeners.
    pub enable: bool,
    /// Listener endpoints, each `tcp:host:port` (the `tcp:` prefix is
    /// optional). Host `0.0.0.0` binds the wildcard address.
    pub listeners: Vec<String>,
    /// Room joined by inbound sessions.
    pub room_name: String,
    /// Digest username (both roles).
    pub user_name: String,
    /// Digest password. Non-empty on the server side arms the 401 challenge.
    pub password: String,
    /// Preferred audio encoding name (e.g. `PCMU`, `OPUS`).
    pub audio_codec: String,
    /// Preferred video encoding name (e.g. `H264`, `VP8`).
    pub video_codec: String,
    /// Video picture size as `WxH`.
    pub video_resolution: String,
    /// Inbound video bandwidth cap in kbit/s (SDP `b=AS:`).
    pub bandwidth_from: u32,
    /// Inbound video frame rate in frames/s.
    pub frame_rate_from: u32,
    /// Display name announced for outbound calls; empty uses the URL path.
    pub display_name: String,
    /// Room paths served to inbound peers; a path absent here answers 404.
    pub enabled_paths: Vec<String>,
    /// Deadline for every transitional state (everything except
    /// None/Playing/TornDown).
    pub setup_deadline: Duration,
    /// NAT-public address reported to peers in `Transport: source=`.
    pub nat_ip: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable: true,
            listeners: vec![DEFAULT_LISTENER.to_string()],
            room_name: DEFAULT_ROOM.to_string(),
            user_name: String::new(),
            password: String::new(),
            audio_codec: "PCMU".to_string(),
            video_codec: "H264".to_string(),
            video_resolution: "352x288".to_string(),
            bandwidth_from: 256,
            frame_rate_from: 10,
            display_name: String::new(),
            enabled_paths: vec![DEFAULT_ROOM.to_string()],
            setup_deadline: Duration::from_secs(10),
            nat_ip: "0.0.0.0".to_string(),
        }
    }
}

impl Config {
    /// Parse `video_resolution` into `(width, height)`.
    ///
    /// Malformed values fall back to CIF (352x288).
    pub fn video_size(&self) -> (u32, u32) {
        let mut it = self.video_resolution.split('x');
        let w = it.next().and_then(|s| s.trim().parse().ok());
        let h = it.next().and_then(|s| s.trim().parse().ok());
        match (w, h) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => (352, 288),
        }
    }

    /// Whether `path` names a room this server will answer DESCRIBE for.
    pub fn is_path_enabled(&self, path: &str) -> bool {
        !path.is_empty() && self.enabled_paths.iter().any(|p| p == path)
    }
}
