//! Boundaries to the conference and media subsystems.
//!
//! The signaling core never moves RTP itself. On a successful PLAY it
//! hands one [`MediaChannelParams`] per negotiated medium to a
//! [`MediaBridge`], and registers the session with a
//! [`ConferenceManager`]. Both are traits so the surrounding endpoint (or
//! a test) supplies the real thing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::caps::MediaKind;
use crate::error::Result;

/// Conference room membership, keyed by the session's call token.
pub trait ConferenceManager: Send + Sync {
    /// Add `member_id` to `room`, creating the room if needed.
    fn join(&self, room: &str, member_id: &str, label: &str) -> Result<()>;

    /// Remove `member_id` from whatever room it joined. Idempotent.
    fn leave(&self, member_id: &str);
}

/// Everything the media subsystem needs to run one RTP channel.
#[derive(Debug, Clone)]
pub struct MediaChannelParams {
    pub kind: MediaKind,
    pub payload_type: u8,
    /// Local RTP port (RTCP is implicitly `local_port + 1`).
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    /// Encoding name as negotiated (e.g. `PCMU`, `H264`).
    pub encoding: String,
    pub clock: u32,
    pub fmtp: String,
}

/// RTP channel lifecycle owned by the media subsystem.
///
/// Port pairs are reserved before SETUP and stay owned by the session
/// until teardown; the negotiator only reports them.
pub trait MediaBridge: Send + Sync {
    /// Reserve an even RTP port; the matching RTCP port is `port + 1`.
    fn reserve_port_pair(&self, kind: MediaKind) -> Result<u16>;

    /// Start an RTP channel for `member_id` with the negotiated parameters.
    fn open_channel(&self, member_id: &str, params: MediaChannelParams) -> Result<()>;

    /// Stop all channels and release reserved ports for `member_id`.
    fn close_channels(&self, member_id: &str);
}

/// In-process conference registry that only tracks membership.
///
/// Useful for the CLI and for tests; a real deployment wires the
/// surrounding conferencing endpoint in instead.
#[derive(Default)]
pub struct LocalConference {
    members: RwLock<HashMap<String, String>>,
}

impl LocalConference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Room the member currently sits in, if any.
    pub fn room_of(&self, member_id: &str) -> Option<String> {
        self.members.read().get(member_id).cloned()
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }
}

impl ConferenceManager for LocalConference {
    fn join(&self, room: &str, member_id: &str, label: &str) -> Result<()> {
        self.members
            .write()
            .insert(member_id.to_string(), room.to_string());
        tracing::info!(room, member_id, label, "member joined conference");
        Ok(())
    }

    fn leave(&self, member_id: &str) {
        if self.members.write().remove(member_id).is_some() {
            tracing::info!(member_id, "member left conference");
        }
    }
}

const RTP_PORT_MIN: u64 = 5000;
const RTP_PORT_MAX: u64 = 65534;

/// Port-reserving media bridge with no actual RTP I/O.
///
/// Port pairs come from a monotonic even counter starting at 5000,
/// wrapping back when the range is exhausted. Channel opens are recorded
/// so callers can inspect what was negotiated.
#[derive(Default)]
pub struct PortCounterBridge {
    next_port: AtomicU64,
    channels: RwLock<HashMap<String, Vec<MediaChannelParams>>>,
}

impl PortCounterBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_port: AtomicU64::new(RTP_PORT_MIN),
            channels: RwLock::new(HashMap::new()),
        })
    }

    /// Channels currently open for `member_id`.
    pub fn channels_of(&self, member_id: &str) -> Vec<MediaChannelParams> {
        self.channels
            .read()
            .get(member_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl MediaBridge for PortCounterBridge {
    fn reserve_port_pair(&self, kind: MediaKind) -> Result<u16> {
        let rtp = self.next_port.fetch_add(2, Ordering::SeqCst);
        let rtp = if rtp > RTP_PORT_MAX {
            self.next_port.store(RTP_PORT_MIN, Ordering::SeqCst);
            self.next_port.fetch_add(2, Ordering::SeqCst)
        } else {
            rtp
        };
        tracing::trace!(kind = kind.as_str(), rtp_port = rtp, "reserved RTP port pair");
        Ok(rtp as u16)
    }

    fn open_channel(&self, member_id: &str, params: MediaChannelParams) -> Result<()> {
        tracing::info!(
            member_id,
            kind = params.kind.as_str(),
            encoding = %params.encoding,
            payload_type = params.payload_type,
            local_port = params.local_port,
            remote = %format!("{}:{}", params.remote_ip, params.remote_port),
            "media channel opened"
        );
        self.channels
            .write()
            .entry(member_id.to_string())
            .or_default()
            .push(params);
        Ok(())
    }

    fn close_channels(&self, member_id: &str) {
        if let Some(closed) = self.channels.write().remove(member_id) {
            tracing::info!(member_id, channels = closed.len(), "media channels closed");
        }
    }
}
