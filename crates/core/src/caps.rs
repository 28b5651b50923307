//! Codec capability slots.
//!
//! A [`CapabilityEntry`] describes one negotiable RTP codec: its encoding
//! name and clock rate (as they appear in an SDP `a=rtpmap:` line), the
//! payload type carrying it, and — once negotiation completes — the remote
//! endpoint the media subsystem should exchange RTP with.
//!
//! Sessions keep two maps keyed by payload type: `local_caps` (what this
//! MCU is configured to speak) and `remote_caps` (what was agreed with the
//! peer). [`default_catalog`] seeds the local side.

use std::collections::BTreeMap;

/// Audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// SDP media name (`m=<this> ...`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Capability maps are keyed by RTP payload type (0–127).
pub type CapMap = BTreeMap<u8, CapabilityEntry>;

/// One negotiable codec slot.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    /// Encoding name as written in `a=rtpmap:` (upper case, e.g. `PCMU`).
    pub name: String,
    pub kind: MediaKind,
    /// RTP payload type carrying this codec.
    pub payload: u8,
    /// RTP clock rate in Hz.
    pub clock: u32,
    /// Encoding parameters after the clock rate (e.g. opus channel count).
    pub params: String,
    /// `a=fmtp:` value, empty when none.
    pub fmtp: String,
    /// Video bandwidth cap in kbit/s (SDP `b=AS:`), 0 when unset.
    pub bandwidth: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Peer RTP address, filled by transport negotiation.
    pub remote_ip: String,
    /// Peer RTP port, filled by transport negotiation.
    pub remote_port: u16,
    /// SDP `a=control:` attribute for this media section.
    pub control: String,
}

impl CapabilityEntry {
    pub fn new(name: &str, kind: MediaKind, payload: u8, clock: u32, params: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            payload,
            clock,
            params: params.to_string(),
            fmtp: String::new(),
            bandwidth: 0,
            width: 0,
            height: 0,
            frame_rate: 0,
            remote_ip: String::new(),
            remote_port: 0,
            control: String::new(),
        }
    }

    /// `<ENC>/<clock>[/<params>]` — the `a=rtpmap:` value after the
    /// payload type.
    pub fn rtpmap_value(&self) -> String {
        if self.params.is_empty() {
            format!("{}/{}", self.name, self.clock)
        } else {
            format!("{}/{}/{}", self.name, self.clock, self.params)
        }
    }

    /// Whether transport negotiation filled in a usable peer endpoint.
    pub fn has_remote_endpoint(&self) -> bool {
        !self.remote_ip.is_empty() && self.remote_ip != "0.0.0.0" && self.remote_port != 0
    }
}

/// Payload type assigned to a dynamic audio codec with no static number.
pub const DYNAMIC_AUDIO_PT: u8 = 96;

/// Payload type assigned to a dynamic video codec with no static number.
pub const DYNAMIC_VIDEO_PT: u8 = 97;

/// Codecs this MCU knows how to negotiate, keyed by payload type.
///
/// Static payload types follow RFC 3551 §6; dynamic codecs sit at 96+.
pub fn default_catalog() -> CapMap {
    let mut caps = CapMap::new();
    for entry in [
        CapabilityEntry::new("PCMU", MediaKind::Audio, 0, 8000, ""),
        CapabilityEntry::new("PCMA", MediaKind::Audio, 8, 8000, ""),
        CapabilityEntry::new("G722", MediaKind::Audio, 9, 8000, ""),
        CapabilityEntry::new("OPUS", MediaKind::Audio, DYNAMIC_AUDIO_PT, 48000, "2"),
        CapabilityEntry::new("H261", MediaKind::Video, 31, 90000, ""),
        CapabilityEntry::new("H263", MediaKind::Video, 34, 90000, ""),
        CapabilityEntry::new("H264", MediaKind::Video, DYNAMIC_VIDEO_PT, 90000, ""),
        CapabilityEntry::new("VP8", MediaKind::Video, 98, 90000, ""),
    ] {
        caps.insert(entry.payload, entry);
    }
    caps
}

/// Encoding name and clock for a static payload type (RFC 3551 §6),
/// used when peer SDP lists a static type without an `a=rtpmap:` line.
pub fn static_payload_info(pt: u8) -> Option<(&'static str, u32, MediaKind)> {
    match pt {
        0 => Some(("PCMU", 8000, MediaKind::Audio)),
        8 => Some(("PCMA", 8000, MediaKind::Audio)),
        9 => Some(("G722", 8000, MediaKind::Audio)),
        31 => Some(("H261", 90000, MediaKind::Video)),
        34 => Some(("H263", 90000, MediaKind::Video)),
        _ => None,
    }
}

/// Find a capability by encoding name (case-insensitive).
pub fn find_by_name<'a>(caps: &'a CapMap, name: &str) -> Option<&'a CapabilityEntry> {
    caps.values().find(|c| c.name.eq_ignore_ascii_case(name))
}
