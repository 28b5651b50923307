//! SDP offer/answer exchange (RFC 4566).
//!
//! Two directions:
//!
//! - **Ingest** ([`parse_offer`]): a peer's session description is scanned
//!   for `m=audio`/`m=video` sections; each payload type is resolved
//!   through its `a=rtpmap:` line (or the static table for RFC 3551
//!   types), and the first codec per section that matches a locally
//!   configured capability is selected.
//!
//! - **Answer** ([`build_answer`]): the description returned by DESCRIBE,
//!   advertising the configured audio/video slots in recvonly direction:
//!
//! ```text
//! v=0
//! o=- <sid> <sid> IN IP4 rtsp-mcu
//! s=Unnamed
//! i=N/A
//! c=IN IP4 0.0.0.0
//! t=0 0
//! a=recvonly
//! a=type:unicast
//! a=charset:UTF-8
//! a=control:rtsp://host:1554/room101
//! m=audio 0 RTP/AVP 0
//! a=rtpmap:0 PCMU/8000
//! a=control:rtsp://host:1554/room101/audio
//! m=video 0 RTP/AVP 97
//! b=AS:256
//! a=rtpmap:97 H264/90000
//! a=control:rtsp://host:1554/room101/video
//! ```
//!
//! The answer body includes its trailing blank line, so its length is the
//! exact `Content-Length` value.

use crate::caps::{self, CapMap, CapabilityEntry, MediaKind};

/// Result of parsing a peer session description against local capabilities.
#[derive(Debug, Default)]
pub struct SdpSelection {
    /// Peer capabilities keyed by payload type.
    pub caps: CapMap,
    /// Selected audio payload type, if any audio codec matched.
    pub audio_pt: Option<u8>,
    /// Selected video payload type, if any video codec matched.
    pub video_pt: Option<u8>,
}

struct MediaSection {
    kind: MediaKind,
    pts: Vec<u8>,
    ip: String,
    bandwidth: u32,
    control: String,
    rtpmap: Vec<(u8, String, u32, String)>,
    fmtp: Vec<(u8, String)>,
}

/// Parse a peer SDP and select one payload type per media kind.
///
/// Selection walks each section's payload types in offer order and picks
/// the first whose encoding name matches an entry in `local_caps`.
/// Unmatched media simply stay unselected; the caller decides whether a
/// session with no selected codec is viable.
pub fn parse_offer(sdp: &str, local_caps: &CapMap) -> SdpSelection {
    let mut session_ip = String::new();
    let mut sections: Vec<MediaSection> = Vec::new();

    for line in sdp.lines() {
        let line = line.trim_end();
        if let Some(value) = line.strip_prefix("c=") {
            let ip = connection_ip(value);
            match sections.last_mut() {
                Some(section) => section.ip = ip,
                None => session_ip = ip,
            }
        } else if let Some(value) = line.strip_prefix("m=") {
            if let Some(section) = parse_media_line(value) {
                sections.push(section);
            }
        } else if let Some(section) = sections.last_mut() {
            if let Some(value) = line.strip_prefix("b=AS:") {
                section.bandwidth = value.trim().parse().unwrap_or(0);
            } else if let Some(value) = line.strip_prefix("a=rtpmap:") {
                if let Some(entry) = parse_rtpmap(value) {
                    section.rtpmap.push(entry);
                }
            } else if let Some(value) = line.strip_prefix("a=fmtp:") {
                if let Some((pt, rest)) = value.split_once(' ') {
                    if let Ok(pt) = pt.trim().parse() {
                        section.fmtp.push((pt, rest.trim().to_string()));
                    }
                }
            } else if let Some(value) = line.strip_prefix("a=control:") {
                section.control = value.trim().to_string();
            }
        }
    }

    let mut selection = SdpSelection::default();

    for section in sections {
        let ip = if section.ip.is_empty() {
            session_ip.clone()
        } else {
            section.ip.clone()
        };

        for &pt in &section.pts {
            let known = section
                .rtpmap
                .iter()
                .find(|(p, ..)| *p == pt)
                .map(|(_, name, clock, params)| (name.clone(), *clock, params.clone()))
                .or_else(|| {
                    caps::static_payload_info(pt)
                        .filter(|(_, _, kind)| *kind == section.kind)
                        .map(|(name, clock, _)| (name.to_string(), clock, String::new()))
                });
            let Some((name, clock, params)) = known else {
                continue;
            };

            let mut entry = CapabilityEntry::new(&name, section.kind, pt, clock, &params);
            entry.remote_ip = ip.clone();
            entry.bandwidth = section.bandwidth;
            entry.control = section.control.clone();
            if let Some((_, fmtp)) = section.fmtp.iter().find(|(p, _)| *p == pt) {
                entry.fmtp = fmtp.clone();
            }
            selection.caps.insert(pt, entry);

            let selected = match section.kind {
                MediaKind::Audio => &mut selection.audio_pt,
                MediaKind::Video => &mut selection.video_pt,
            };
            if selected.is_none() && caps::find_by_name(local_caps, &name).is_some() {
                *selected = Some(pt);
            }
        }
    }

    selection
}

fn connection_ip(value: &str) -> String {
    // c=IN IP4 192.0.2.1
    value.split_whitespace().nth(2).unwrap_or("").to_string()
}

fn parse_media_line(value: &str) -> Option<MediaSection> {
    // m=audio 0 RTP/AVP 0 8 96
    let mut tokens = value.split_whitespace();
    let kind = match tokens.next()? {
        "audio" => MediaKind::Audio,
        "video" => MediaKind::Video,
        _ => return None,
    };
    let _port = tokens.next()?;
    let _profile = tokens.next()?;
    let pts = tokens.filter_map(|t| t.parse().ok()).collect();
    Some(MediaSection {
        kind,
        pts,
        ip: String::new(),
        bandwidth: 0,
        control: String::new(),
        rtpmap: Vec::new(),
        fmtp: Vec::new(),
    })
}

fn parse_rtpmap(value: &str) -> Option<(u8, String, u32, String)> {
    // a=rtpmap:96 OPUS/48000/2
    let (pt, rest) = value.split_once(' ')?;
    let pt = pt.trim().parse().ok()?;
    let mut parts = rest.trim().split('/');
    let name = parts.next()?.to_uppercase();
    let clock = parts.next()?.parse().ok()?;
    let params = parts.next().unwrap_or("").to_string();
    Some((pt, name, clock, params))
}

/// Build the recvonly session description answered to DESCRIBE.
///
/// `origin_id` is a stable per-session identifier reused for both the
/// `o=` session id and version fields. The returned body ends with a
/// blank line, so `body.len()` is the `Content-Length` to advertise.
pub fn build_answer(
    local_uri: &str,
    origin_id: &str,
    caps: &CapMap,
    audio_pt: Option<u8>,
    video_pt: Option<u8>,
) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=- {} {} IN IP4 rtsp-mcu\r\n", origin_id, origin_id));
    sdp.push_str("s=Unnamed\r\n");
    sdp.push_str("i=N/A\r\n");
    sdp.push_str("c=IN IP4 0.0.0.0\r\n");
    sdp.push_str("t=0 0\r\n");
    sdp.push_str("a=recvonly\r\n");
    sdp.push_str("a=type:unicast\r\n");
    sdp.push_str("a=charset:UTF-8\r\n");
    sdp.push_str(&format!("a=control:{}\r\n", local_uri));

    if let Some(cap) = audio_pt.and_then(|pt| caps.get(&pt)) {
        sdp.push_str(&format!("m=audio 0 RTP/AVP {}\r\n", cap.payload));
        sdp.push_str(&format!("a=rtpmap:{} {}\r\n", cap.payload, cap.rtpmap_value()));
        sdp.push_str(&format!("a=control:{}/audio\r\n", local_uri));
    }

    if let Some(cap) = video_pt.and_then(|pt| caps.get(&pt)) {
        sdp.push_str(&format!("m=video 0 RTP/AVP {}\r\n", cap.payload));
        sdp.push_str(&format!("b=AS:{}\r\n", cap.bandwidth));
        sdp.push_str(&format!("a=rtpmap:{} {}/90000\r\n", cap.payload, cap.name));
        if !cap.fmtp.is_empty() {
            sdp.push_str(&format!("a=fmtp:{} {}\r\n", cap.payload, cap.fmtp));
        }
        sdp.push_str(&format!("a=control:{}/video\r\n", local_uri));
    }

    // Trailing blank line is part of the advertised payload.
    sdp.push_str("\r\n");
    sdp
}
