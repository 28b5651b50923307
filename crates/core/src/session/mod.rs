//! RTSP session state machine.
//!
//! One [`Session`] is one RTSP dialog, in either role:
//!
//! ```text
//! Outbound (we pull from a peer):
//!   None -> Describe -> SetupAudio -> SetupVideo -> Play -> Playing
//!                                  \______________/
//!                                   (audio-only skips SetupVideo)
//!   Playing -> Teardown -> TornDown
//!
//! Inbound (a peer pushes into a room):
//!   None -> Describe -> Setup -> Playing -> TornDown
//!   (OPTIONS answered in any state; TEARDOWN terminates from any state)
//! ```
//!
//! The state enum is the union of both roles; the dispatch tables guard
//! wrong-direction and out-of-order events, answering 455 without
//! mutating state. All transitions happen under the per-session mutex,
//! which stays held across the synchronous response send so CSeq
//! advancement, state mutation, and the outgoing write are atomic.
//!
//! Every state except `None`, `Playing`, and `TornDown` arms a deadline;
//! the owning connection thread polls [`Session::poll_deadline`] between
//! reads and expiry forces `TornDown`.

pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::caps::{self, CapMap, MediaKind};
use crate::conference::{ConferenceManager, MediaBridge, MediaChannelParams};
use crate::config::Config;
use crate::error::{
    AuthErrorKind, NegotiationErrorKind, ParseErrorKind, Result, RtspError,
};
use crate::transport::SignalSender;
use crate::protocol::auth::{self, DigestChallenge};
use crate::protocol::message::{self, PRODUCT, RtspMessage, RtspRequest, RtspResponse};
use crate::protocol::sdp;

const METHOD_OPTIONS: &str = "OPTIONS";
const METHOD_DESCRIBE: &str = "DESCRIBE";
const METHOD_SETUP: &str = "SETUP";
const METHOD_PLAY: &str = "PLAY";
const METHOD_TEARDOWN: &str = "TEARDOWN";

/// Methods advertised in the `Public:` header.
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, TEARDOWN, PLAY";

/// Which side opened the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A peer connected to one of our listeners and pushes media.
    Inbound,
    /// We dialed the peer and pull its stream into a room.
    Outbound,
}

/// Session state; the union of the client and server sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtspState {
    None,
    Describe,
    /// Server side: at least one SETUP answered.
    Setup,
    /// Client side: SETUP for the audio stream in flight.
    SetupAudio,
    /// Client side: SETUP for the video stream in flight.
    SetupVideo,
    /// Client side: PLAY in flight.
    Play,
    Playing,
    Teardown,
    TornDown,
}

impl RtspState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Describe => "Describe",
            Self::Setup => "Setup",
            Self::SetupAudio => "SetupAudio",
            Self::SetupVideo => "SetupVideo",
            Self::Play => "Play",
            Self::Playing => "Playing",
            Self::Teardown => "Teardown",
            Self::TornDown => "TornDown",
        }
    }

    /// States that wait on the peer and therefore carry a deadline.
    fn is_transitional(&self) -> bool {
        !matches!(self, Self::None | Self::Playing | Self::TornDown)
    }
}

/// Why a session ended, reported to the conferencing shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEndReason {
    EndedByLocalUser,
    EndedByRemoteUser,
    EndedByNoCompatibleCodec,
    EndedByTransport,
    EndedByAuthFailure,
    EndedByProtocolError,
}

/// One RTSP dialog bound to a conference room.
///
/// All mutable state sits behind one mutex; see the module docs for the
/// locking contract.
pub struct Session {
    call_token: String,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    direction: Direction,
    state: RtspState,
    end_reason: Option<CallEndReason>,

    remote_uri: String,
    local_uri: String,
    rtsp_path: String,
    room: String,
    member_label: String,

    session_token: String,
    cseq: u32,

    local_caps: CapMap,
    remote_caps: CapMap,
    audio_pt: Option<u8>,
    video_pt: Option<u8>,
    audio_local_port: u16,
    video_local_port: u16,

    username: String,
    password: String,
    /// Server: challenge issued to the peer. Client: challenge received
    /// from the peer after the first 401.
    challenge: Option<DigestChallenge>,

    nat_ip: String,
    remote_application: String,

    deadline: Option<Instant>,
    deadline_window: Duration,
    joined: bool,

    sender: Arc<dyn SignalSender>,
    conference: Arc<dyn ConferenceManager>,
    media: Arc<dyn MediaBridge>,
}

impl Session {
    /// Create the server-side session for an admitted inbound connection.
    ///
    /// Capabilities come from the configured codec names; RTP port pairs
    /// for each selected medium are reserved here, before any SETUP.
    pub fn inbound(
        call_token: &str,
        request_uri: &str,
        config: &Config,
        sender: Arc<dyn SignalSender>,
        conference: Arc<dyn ConferenceManager>,
        media: Arc<dyn MediaBridge>,
    ) -> Result<Arc<Self>> {
        let local_caps = caps::default_catalog();
        let mut remote_caps = CapMap::new();
        let mut audio_pt = None;
        let mut video_pt = None;

        if let Some(cap) = caps::find_by_name(&local_caps, &config.audio_codec) {
            let cap = cap.clone();
            audio_pt = Some(cap.payload);
            remote_caps.insert(cap.payload, cap);
        }
        if let Some(cap) = caps::find_by_name(&local_caps, &config.video_codec) {
            let mut cap = cap.clone();
            let (width, height) = config.video_size();
            cap.width = width;
            cap.height = height;
            cap.frame_rate = config.frame_rate_from;
            cap.bandwidth = config.bandwidth_from;
            video_pt = Some(cap.payload);
            remote_caps.insert(cap.payload, cap);
        }

        if audio_pt.is_none() && video_pt.is_none() {
            tracing::warn!(
                call_token,
                audio_codec = %config.audio_codec,
                video_codec = %config.video_codec,
                "cannot create session without codecs"
            );
            return Err(RtspError::Negotiation(NegotiationErrorKind::NoCompatibleCodec));
        }

        let audio_local_port = match audio_pt {
            Some(_) => media.reserve_port_pair(MediaKind::Audio)?,
            None => 0,
        };
        let video_local_port = match video_pt {
            Some(_) => media.reserve_port_pair(MediaKind::Video)?,
            None => 0,
        };

        let rtsp_path = message::uri_path_segments(request_uri)
            .first()
            .cloned()
            .unwrap_or_default();

        let challenge = if config.password.is_empty() {
            None
        } else {
            Some(DigestChallenge::new(auth::DEFAULT_REALM))
        };

        let session = Arc::new(Self {
            call_token: call_token.to_string(),
            inner: Mutex::new(SessionInner {
                direction: Direction::Inbound,
                state: RtspState::None,
                end_reason: None,
                remote_uri: sender.peer_host(),
                local_uri: request_uri.to_string(),
                member_label: format!("RTSP {} ({})", rtsp_path, sender.peer_host()),
                rtsp_path,
                room: config.room_name.clone(),
                session_token: random_token(),
                cseq: 1,
                local_caps,
                remote_caps,
                audio_pt,
                video_pt,
                audio_local_port,
                video_local_port,
                username: config.user_name.clone(),
                password: config.password.clone(),
                challenge,
                nat_ip: config.nat_ip.clone(),
                remote_application: String::new(),
                deadline: None,
                deadline_window: config.setup_deadline,
                joined: false,
                sender,
                conference,
                media,
            }),
        });

        tracing::info!(call_token, uri = request_uri, "inbound session created");
        Ok(session)
    }

    /// Create the client-side session for an outbound pull.
    ///
    /// `remote_uri` must already be normalized (`rtsp://host:port/path`).
    /// Port pairs for both media are reserved up front; the peer SDP
    /// decides which are used.
    pub fn outbound(
        call_token: &str,
        room: &str,
        remote_uri: &str,
        username: &str,
        password: &str,
        config: &Config,
        sender: Arc<dyn SignalSender>,
        conference: Arc<dyn ConferenceManager>,
        media: Arc<dyn MediaBridge>,
    ) -> Result<Arc<Self>> {
        let audio_local_port = media.reserve_port_pair(MediaKind::Audio)?;
        let video_local_port = media.reserve_port_pair(MediaKind::Video)?;

        let rtsp_path = message::uri_path_segments(remote_uri)
            .first()
            .cloned()
            .unwrap_or_default();
        let member_label = if config.display_name.is_empty() {
            rtsp_path.clone()
        } else {
            config.display_name.clone()
        };

        let session = Arc::new(Self {
            call_token: call_token.to_string(),
            inner: Mutex::new(SessionInner {
                direction: Direction::Outbound,
                state: RtspState::None,
                end_reason: None,
                remote_uri: remote_uri.to_string(),
                local_uri: String::new(),
                rtsp_path,
                room: room.to_string(),
                member_label,
                session_token: String::new(),
                cseq: 1,
                local_caps: caps::default_catalog(),
                remote_caps: CapMap::new(),
                audio_pt: None,
                video_pt: None,
                audio_local_port,
                video_local_port,
                username: username.to_string(),
                password: password.to_string(),
                challenge: None,
                nat_ip: config.nat_ip.clone(),
                remote_application: String::new(),
                deadline: None,
                deadline_window: config.setup_deadline,
                joined: false,
                sender,
                conference,
                media,
            }),
        });

        tracing::info!(call_token, uri = remote_uri, room, "outbound session created");
        Ok(session)
    }

    pub fn call_token(&self) -> &str {
        &self.call_token
    }

    pub fn state(&self) -> RtspState {
        self.inner.lock().state
    }

    pub fn direction(&self) -> Direction {
        self.inner.lock().direction
    }

    pub fn end_reason(&self) -> Option<CallEndReason> {
        self.inner.lock().end_reason
    }

    pub fn session_token(&self) -> String {
        self.inner.lock().session_token.clone()
    }

    /// Peer software, from `User-Agent:`/`Server:` headers.
    pub fn remote_application(&self) -> String {
        self.inner.lock().remote_application.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == RtspState::TornDown
    }

    /// Kick off an outbound dialog by sending DESCRIBE.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = inner.send_describe();
        if let Err(err) = &result {
            inner.clear(&self.call_token, reason_for(err));
        }
        result
    }

    /// Process one framed RTSP message from the peer.
    ///
    /// Holds the session mutex for the whole call — parse, state
    /// mutation, and the response send are atomic. A returned error means
    /// the session was cleared and the connection should close.
    pub fn on_received(&self, data: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == RtspState::TornDown {
            return Err(RtspError::TransportClosed);
        }

        tracing::trace!(
            call_token = %self.call_token,
            bytes = data.len(),
            "received message"
        );

        let result = inner.handle_message(&self.call_token, data);
        if let Err(err) = &result {
            tracing::warn!(call_token = %self.call_token, error = %err, "session error");
            inner.clear(&self.call_token, reason_for(err));
        }
        result
    }

    /// Locally end the call.
    ///
    /// While Playing in the outbound role, a best-effort TEARDOWN goes out
    /// first; nothing waits for the peer's acknowledgement.
    pub fn close(&self, reason: CallEndReason) {
        let mut inner = self.inner.lock();
        inner.clear(&self.call_token, reason);
    }

    /// Expire the armed deadline, if any. Returns true when the session
    /// was torn down because of it.
    pub fn poll_deadline(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                tracing::warn!(
                    call_token = %self.call_token,
                    state = inner.state.name(),
                    "state deadline expired"
                );
                inner.clear(&self.call_token, CallEndReason::EndedByRemoteUser);
                true
            }
            _ => false,
        }
    }
}

impl SessionInner {
    fn handle_message(&mut self, token: &str, data: &str) -> Result<()> {
        let msg = match message::parse(data) {
            Ok(msg) => msg,
            Err(err) => {
                if self.direction == Direction::Inbound {
                    let resp = RtspResponse::new(400, 0, None)
                        .add_header("Date", &message::http_date())
                        .add_header("Server", PRODUCT);
                    let _ = self.send(&resp.serialize());
                }
                return Err(err);
            }
        };

        match (self.direction, msg) {
            (Direction::Inbound, RtspMessage::Request(req)) => self.handle_request(token, req),
            (Direction::Outbound, RtspMessage::Response(resp)) => {
                self.handle_response(token, resp)
            }
            (_, other) => {
                tracing::warn!(call_token = token, "message for the wrong role");
                Err(RtspError::MethodOutOfOrder {
                    method: match other {
                        RtspMessage::Request(r) => r.method,
                        RtspMessage::Response(r) => format!("status {}", r.status),
                    },
                    state: self.state.name(),
                })
            }
        }
    }

    // ---- inbound (server role) ----------------------------------------

    fn handle_request(&mut self, token: &str, req: RtspRequest) -> Result<()> {
        tracing::debug!(
            call_token = token,
            method = %req.method,
            uri = %req.uri,
            cseq = req.cseq,
            state = self.state.name(),
            "request"
        );

        if let Some(agent) = req.get_header("User-Agent").or(req.get_header("Server")) {
            self.remote_application = agent.to_string();
        }

        if req.method != METHOD_OPTIONS && !self.check_auth(token, &req)? {
            return Ok(());
        }

        match req.method.as_str() {
            METHOD_OPTIONS => self.on_request_options(&req),
            METHOD_DESCRIBE if self.state == RtspState::None => self.on_request_describe(&req),
            METHOD_SETUP
                if matches!(self.state, RtspState::Describe | RtspState::Setup) =>
            {
                self.on_request_setup(&req)
            }
            METHOD_PLAY if self.state == RtspState::Setup => self.on_request_play(token, &req),
            METHOD_TEARDOWN => self.on_request_teardown(token, &req),
            _ => {
                // Outside the transition table: refuse without touching state.
                tracing::warn!(
                    call_token = token,
                    method = %req.method,
                    state = self.state.name(),
                    "method not valid in this state"
                );
                self.reply(self.base_response(455, &req))
            }
        }
    }

    /// Returns `Ok(true)` when the request may proceed, `Ok(false)` when a
    /// challenge was sent, and an error when verification failed.
    fn check_auth(&mut self, token: &str, req: &RtspRequest) -> Result<bool> {
        let Some(challenge) = self.challenge.clone() else {
            return Ok(true);
        };

        let Some(authorization) = req.get_header("Authorization") else {
            let resp = self
                .base_response(401, req)
                .add_header("WWW-Authenticate", &challenge.header_value());
            self.reply(resp)?;
            return Ok(false);
        };

        if auth::verify(
            &self.username,
            &self.password,
            &challenge,
            &req.method,
            authorization,
        ) {
            Ok(true)
        } else {
            tracing::warn!(call_token = token, "authorization failure");
            self.reply(self.base_response(403, req))?;
            Err(RtspError::Auth(AuthErrorKind::BadResponse))
        }
    }

    fn on_request_options(&mut self, req: &RtspRequest) -> Result<()> {
        let resp = self
            .base_response(200, req)
            .add_header("Public", PUBLIC_METHODS);
        self.reply(resp)
    }

    fn on_request_describe(&mut self, req: &RtspRequest) -> Result<()> {
        let sdp = sdp::build_answer(
            &self.local_uri,
            &self.session_token,
            &self.remote_caps,
            self.audio_pt,
            self.video_pt,
        );
        let resp = self
            .base_response(200, req)
            .add_header("Content-Type", "application/sdp")
            .add_header("Cache-Control", "no-cache")
            .with_body(sdp);
        self.reply(resp)?;
        self.set_state(RtspState::Describe);
        Ok(())
    }

    fn on_request_setup(&mut self, req: &RtspRequest) -> Result<()> {
        let media_segment = message::uri_path_segments(&req.uri)
            .last()
            .cloned()
            .unwrap_or_default();
        let selected = match media_segment.as_str() {
            "audio" => self.audio_pt.map(|pt| (pt, self.audio_local_port)),
            "video" => self.video_pt.map(|pt| (pt, self.video_local_port)),
            _ => None,
        };
        let Some((pt, local_port)) = selected else {
            tracing::warn!(uri = %req.uri, "SETUP for unknown media path");
            return self.reply(self.base_response(455, req));
        };

        let transport_value = req.get_header("Transport").unwrap_or_default().to_string();
        let params = transport::TransportParams::parse(&transport_value);
        let remote = match transport::remote_from_request(&params, &self.sender.peer_host()) {
            Ok(remote) => remote,
            Err(err) => {
                self.reply(self.base_response(400, req))?;
                return Err(err);
            }
        };

        if local_port == 0 {
            self.reply(self.base_response(400, req))?;
            return Err(RtspError::Negotiation(NegotiationErrorKind::BadTransport));
        }

        if let Some(cap) = self.remote_caps.get_mut(&pt) {
            cap.remote_ip = remote.ip;
            cap.remote_port = remote.port;
        }

        let reply_transport =
            transport::server_reply_value(&transport_value, &self.nat_ip, local_port);
        let session_token = self.session_token.clone();
        let resp = self
            .base_response(200, req)
            .add_header("Session", &session_token)
            .add_header("Transport", &reply_transport);
        self.reply(resp)?;
        self.set_state(RtspState::Setup);
        Ok(())
    }

    fn on_request_play(&mut self, token: &str, req: &RtspRequest) -> Result<()> {
        self.conference.join(&self.room, token, &self.member_label)?;
        self.joined = true;
        self.open_media_channels(token)?;

        let session_token = self.session_token.clone();
        let resp = self
            .base_response(200, req)
            .add_header("Session", &session_token)
            .add_header("Range", "npt=0.000-");
        self.reply(resp)?;
        self.set_state(RtspState::Playing);
        Ok(())
    }

    fn on_request_teardown(&mut self, token: &str, req: &RtspRequest) -> Result<()> {
        let session_token = self.session_token.clone();
        let resp = self
            .base_response(200, req)
            .add_header("Session", &session_token);
        self.reply(resp)?;
        self.clear(token, CallEndReason::EndedByRemoteUser);
        Ok(())
    }

    /// Response skeleton echoing the request's CSeq and method token.
    fn base_response(&self, status: u16, req: &RtspRequest) -> RtspResponse {
        let method = req.cseq_method.as_deref().unwrap_or(&req.method);
        RtspResponse::new(status, req.cseq, Some(method))
            .add_header("Date", &message::http_date())
            .add_header("Server", PRODUCT)
    }

    fn reply(&self, resp: RtspResponse) -> Result<()> {
        tracing::debug!(status = resp.status, cseq = resp.cseq, "response");
        self.send(&resp.serialize())
    }

    // ---- outbound (client role) ---------------------------------------

    fn handle_response(&mut self, token: &str, resp: RtspResponse) -> Result<()> {
        tracing::debug!(
            call_token = token,
            status = resp.status,
            cseq = resp.cseq,
            state = self.state.name(),
            "response"
        );

        if let Some(agent) = resp.get_header("Server").or(resp.get_header("User-Agent")) {
            self.remote_application = agent.to_string();
        }

        match self.state {
            RtspState::Describe if resp.status == 200 => self.on_response_describe(&resp),
            RtspState::Describe if resp.status == 401 => self.on_response_unauthorized(&resp),
            RtspState::SetupAudio | RtspState::SetupVideo if resp.status == 200 => {
                self.on_response_setup(&resp)
            }
            RtspState::Play if resp.status == 200 => self.on_response_play(token),
            RtspState::Teardown | RtspState::TornDown => Ok(()),
            _ => Err(RtspError::PeerStatus(resp.status)),
        }
    }

    fn on_response_unauthorized(&mut self, resp: &RtspResponse) -> Result<()> {
        if self.challenge.is_some() {
            // One retry only.
            return Err(RtspError::Auth(AuthErrorKind::RepeatedChallenge));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(RtspError::Auth(AuthErrorKind::NoCredentials));
        }
        let value = resp
            .get_header("WWW-Authenticate")
            .ok_or(RtspError::Auth(AuthErrorKind::NoCredentials))?;
        self.challenge = Some(DigestChallenge::parse(value)?);
        self.send_describe()
    }

    fn on_response_describe(&mut self, resp: &RtspResponse) -> Result<()> {
        if resp.body.is_empty() {
            return Err(RtspError::Parse(ParseErrorKind::EmptyPayload));
        }

        let selection = sdp::parse_offer(&resp.body, &self.local_caps);
        self.remote_caps = selection.caps;
        self.audio_pt = selection.audio_pt;
        self.video_pt = selection.video_pt;

        let pt = self
            .audio_pt
            .or(self.video_pt)
            .ok_or(RtspError::Negotiation(NegotiationErrorKind::NoCompatibleCodec))?;
        self.send_setup(pt)
    }

    fn on_response_setup(&mut self, resp: &RtspResponse) -> Result<()> {
        // The token announced on the first SETUP response is the session
        // identity; any ";timeout=" parameter is stripped.
        if self.session_token.is_empty() {
            if let Some(value) = resp.get_header("Session") {
                self.session_token = value
                    .split(';')
                    .next()
                    .unwrap_or(value)
                    .trim()
                    .to_string();
            }
        }

        let pt = match self.state {
            RtspState::SetupAudio => self.audio_pt,
            _ => self.video_pt,
        }
        .ok_or(RtspError::Negotiation(NegotiationErrorKind::NoCompatibleCodec))?;

        let params =
            transport::TransportParams::parse(resp.get_header("Transport").unwrap_or_default());
        let remote = transport::remote_from_response(&params, &self.sender.peer_host())?;
        if let Some(cap) = self.remote_caps.get_mut(&pt) {
            cap.remote_ip = remote.ip;
            cap.remote_port = remote.port;
        }

        if self.state == RtspState::SetupAudio {
            if let Some(video_pt) = self.video_pt {
                return self.send_setup(video_pt);
            }
        }
        self.send_play()
    }

    fn on_response_play(&mut self, token: &str) -> Result<()> {
        self.conference.join(&self.room, token, &self.member_label)?;
        self.joined = true;
        self.open_media_channels(token)?;
        self.set_state(RtspState::Playing);
        Ok(())
    }

    fn send_describe(&mut self) -> Result<()> {
        let uri = self.remote_uri.clone();
        let req = self
            .outbound_request(METHOD_DESCRIBE, &uri)
            .add_header("Accept", "application/sdp");
        self.send_request(req)?;
        self.set_state(RtspState::Describe);
        Ok(())
    }

    fn send_setup(&mut self, pt: u8) -> Result<()> {
        let cap = self
            .remote_caps
            .get(&pt)
            .ok_or(RtspError::Negotiation(NegotiationErrorKind::NoCompatibleCodec))?;
        if cap.control.is_empty() {
            tracing::warn!("capability attribute \"control\" not found");
            return Err(RtspError::Negotiation(NegotiationErrorKind::BadControlAttr));
        }
        let uri = if cap.control.starts_with("rtsp") {
            cap.control.clone()
        } else {
            format!("{}/{}", self.remote_uri, cap.control)
        };

        let is_audio = Some(pt) == self.audio_pt;
        let local_port = if is_audio {
            self.audio_local_port
        } else {
            self.video_local_port
        };

        let mut req = self
            .outbound_request(METHOD_SETUP, &uri)
            .add_header("Transport", &transport::client_request_value(local_port));
        if !self.session_token.is_empty() {
            let token = self.session_token.clone();
            req = req.add_header("Session", &token);
        }
        self.send_request(req)?;

        self.set_state(if is_audio {
            RtspState::SetupAudio
        } else {
            RtspState::SetupVideo
        });
        Ok(())
    }

    fn send_play(&mut self) -> Result<()> {
        let uri = self.remote_uri.clone();
        let token = self.session_token.clone();
        let req = self
            .outbound_request(METHOD_PLAY, &uri)
            .add_header("Session", &token)
            .add_header("Range", "npt=0.000-");
        self.send_request(req)?;
        self.set_state(RtspState::Play);
        Ok(())
    }

    fn send_teardown(&mut self) -> Result<()> {
        let uri = self.remote_uri.clone();
        let token = self.session_token.clone();
        let req = self
            .outbound_request(METHOD_TEARDOWN, &uri)
            .add_header("Session", &token);
        self.send_request(req)?;
        self.set_state(RtspState::Teardown);
        Ok(())
    }

    /// Request skeleton with the next CSeq, digest credentials when a
    /// challenge is installed, and the User-Agent string.
    fn outbound_request(&mut self, method: &str, uri: &str) -> RtspRequest {
        let cseq = self.cseq;
        self.cseq += 1;

        let mut req = RtspRequest::new(method, uri, cseq);
        if method != METHOD_OPTIONS {
            if let Some(challenge) = &self.challenge {
                req = req.add_header(
                    "Authorization",
                    &auth::authorization_header(
                        &self.username,
                        &self.password,
                        challenge,
                        method,
                        uri,
                    ),
                );
            }
        }
        req.add_header("User-Agent", PRODUCT)
    }

    fn send_request(&self, req: RtspRequest) -> Result<()> {
        tracing::debug!(method = %req.method, uri = %req.uri, cseq = req.cseq, "send request");
        self.send(&req.serialize())
    }

    // ---- shared -------------------------------------------------------

    fn send(&self, data: &str) -> Result<()> {
        self.sender
            .send(data.as_bytes())
            .map_err(|_| RtspError::TransportClosed)
    }

    /// Hand every negotiated medium to the media subsystem. In Playing,
    /// each selected capability must carry a usable remote endpoint.
    fn open_media_channels(&mut self, token: &str) -> Result<()> {
        for pt in [self.audio_pt, self.video_pt].into_iter().flatten() {
            let cap = self
                .remote_caps
                .get(&pt)
                .ok_or(RtspError::Negotiation(NegotiationErrorKind::NoCompatibleCodec))?;
            if !cap.has_remote_endpoint() {
                return Err(RtspError::Negotiation(NegotiationErrorKind::BadTransport));
            }
            let local_port = match cap.kind {
                MediaKind::Audio => self.audio_local_port,
                MediaKind::Video => self.video_local_port,
            };
            tracing::info!(
                call_token = token,
                kind = cap.kind.as_str(),
                encoding = %cap.name,
                remote = %format!("{}:{}", cap.remote_ip, cap.remote_port),
                "media negotiated"
            );
            self.media.open_channel(
                token,
                MediaChannelParams {
                    kind: cap.kind,
                    payload_type: cap.payload,
                    local_port,
                    remote_ip: cap.remote_ip.clone(),
                    remote_port: cap.remote_port,
                    encoding: cap.name.clone(),
                    clock: cap.clock,
                    fmtp: cap.fmtp.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn set_state(&mut self, state: RtspState) {
        tracing::debug!(
            old_state = self.state.name(),
            new_state = state.name(),
            "state transition"
        );
        self.state = state;
        self.deadline = if state.is_transitional() {
            Some(Instant::now() + self.deadline_window)
        } else {
            None
        };
    }

    /// Release everything and reach `TornDown`. Idempotent.
    fn clear(&mut self, token: &str, reason: CallEndReason) {
        if self.state == RtspState::TornDown {
            return;
        }

        if self.direction == Direction::Outbound
            && self.state == RtspState::Playing
            && reason == CallEndReason::EndedByLocalUser
        {
            // Best effort; nothing waits for the peer's 200.
            let _ = self.send_teardown();
        }

        if self.joined {
            self.conference.leave(token);
            self.joined = false;
        }
        self.media.close_channels(token);

        self.state = RtspState::TornDown;
        self.end_reason = Some(reason);
        self.deadline = None;

        tracing::info!(call_token = token, reason = ?reason, "session cleared");
    }
}

fn random_token() -> String {
    use rand::RngExt;
    rand::rng().random::<u32>().to_string()
}

/// Map a fatal session error to the reason reported to the shell.
fn reason_for(err: &RtspError) -> CallEndReason {
    match err {
        RtspError::Negotiation(_) => CallEndReason::EndedByNoCompatibleCodec,
        RtspError::Auth(_) => CallEndReason::EndedByAuthFailure,
        RtspError::Io(_) | RtspError::TransportClosed => CallEndReason::EndedByTransport,
        RtspError::Parse(_) => CallEndReason::EndedByProtocolError,
        _ => CallEndReason::EndedByRemoteUser,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conference::{LocalConference, PortCounterBridge};

    const PEER: &str = "198.51.100.7";
    const TOKEN: &str = "198.51.100.7:40000";
    const ROOM_URI: &str = "rtsp://192.0.2.10:1554/room101";

    /// Captures outgoing frames instead of writing to a socket.
    #[derive(Default)]
    struct MockSender {
        frames: Mutex<Vec<String>>,
    }

    impl MockSender {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().clone()
        }

        fn last(&self) -> String {
            self.frames.lock().last().cloned().unwrap_or_default()
        }
    }

    impl SignalSender for MockSender {
        fn send(&self, data: &[u8]) -> std::io::Result<()> {
            self.frames
                .lock()
                .push(String::from_utf8_lossy(data).into_owned());
            Ok(())
        }

        fn peer_host(&self) -> String {
            PEER.to_string()
        }
    }

    struct Fixture {
        session: Arc<Session>,
        sender: Arc<MockSender>,
        conference: Arc<LocalConference>,
        bridge: Arc<PortCounterBridge>,
    }

    fn inbound_fixture(config: Config) -> Fixture {
        let sender = MockSender::new();
        let conference = LocalConference::new();
        let bridge = PortCounterBridge::new();
        let session = Session::inbound(
            TOKEN,
            ROOM_URI,
            &config,
            sender.clone(),
            conference.clone(),
            bridge.clone(),
        )
        .unwrap();
        Fixture {
            session,
            sender,
            conference,
            bridge,
        }
    }

    fn outbound_fixture(config: Config, username: &str, password: &str) -> Fixture {
        let sender = MockSender::new();
        let conference = LocalConference::new();
        let bridge = PortCounterBridge::new();
        let session = Session::outbound(
            "out:1",
            "room101",
            "rtsp://example.com:554/stream",
            username,
            password,
            &config,
            sender.clone(),
            conference.clone(),
            bridge.clone(),
        )
        .unwrap();
        Fixture {
            session,
            sender,
            conference,
            bridge,
        }
    }

    fn drive_inbound_to_setup(f: &Fixture) {
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n"))
            .unwrap();
        f.session
            .on_received(&format!(
                "SETUP {ROOM_URI}/audio RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n"
            ))
            .unwrap();
        f.session
            .on_received(&format!(
                "SETUP {ROOM_URI}/video RTSP/1.0\r\nCSeq: 4\r\nTransport: RTP/AVP;unicast;client_port=8002-8003\r\n\r\n"
            ))
            .unwrap();
    }

    #[test]
    fn inbound_options_answers_public_list() {
        let f = inbound_fixture(Config::default());
        f.session
            .on_received(&format!("OPTIONS {ROOM_URI} RTSP/1.0\r\nCSeq: 1\r\n\r\n"))
            .unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(frame.contains("CSeq: 1 OPTIONS\r\n"));
        assert!(frame.contains(&format!("Public: {}\r\n", PUBLIC_METHODS)));
        assert!(frame.contains("Date: "));
        assert!(frame.contains(&format!("Server: {}\r\n", PRODUCT)));
        assert_eq!(f.session.state(), RtspState::None);
    }

    #[test]
    fn inbound_describe_returns_sdp() {
        let f = inbound_fixture(Config::default());
        f.session
            .on_received(&format!(
                "DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n"
            ))
            .unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(frame.contains("Content-Type: application/sdp\r\n"));
        assert!(frame.contains(&format!("a=control:{ROOM_URI}\r\n")));
        assert!(frame.contains("m=audio 0 RTP/AVP 0\r\n"));
        assert!(frame.contains("m=video 0 RTP/AVP 97\r\n"));
        assert_eq!(f.session.state(), RtspState::Describe);

        // Advertised Content-Length covers the body up to and including
        // its trailing blank line.
        let length: usize = frame
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        let body_start = frame.find("\r\n\r\n").unwrap() + 4;
        assert_eq!(frame.len() - body_start, length);
    }

    #[test]
    fn inbound_describe_challenges_when_password_configured() {
        let config = Config {
            user_name: "alice".to_string(),
            password: "secret".to_string(),
            ..Config::default()
        };
        let f = inbound_fixture(config);
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("RTSP/1.0 401 Unauthorized\r\n"));
        assert!(frame.contains("WWW-Authenticate: Digest realm=\"openmcu-ru\",nonce=\""));
        assert!(frame.contains("algorithm=MD5"));
        // Challenge does not advance the state machine.
        assert_eq!(f.session.state(), RtspState::None);
    }

    #[test]
    fn inbound_describe_with_valid_digest_succeeds() {
        let config = Config {
            user_name: "alice".to_string(),
            password: "secret".to_string(),
            ..Config::default()
        };
        let f = inbound_fixture(config);
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();

        let challenge =
            DigestChallenge::parse(header_value(&f.sender.last(), "WWW-Authenticate")).unwrap();
        let authorization =
            auth::authorization_header("alice", "secret", &challenge, "DESCRIBE", ROOM_URI);
        f.session
            .on_received(&format!(
                "DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 3\r\nAuthorization: {authorization}\r\n\r\n"
            ))
            .unwrap();

        assert!(f.sender.last().starts_with("RTSP/1.0 200 OK\r\n"));
        assert_eq!(f.session.state(), RtspState::Describe);
    }

    #[test]
    fn inbound_bad_digest_is_forbidden_and_fatal() {
        let config = Config {
            user_name: "alice".to_string(),
            password: "secret".to_string(),
            ..Config::default()
        };
        let f = inbound_fixture(config);
        let bad = "Digest username=\"alice\", realm=\"openmcu-ru\", nonce=\"x\", \
                   uri=\"rtsp://h/room\", response=\"00000000000000000000000000000000\"";
        let result = f.session.on_received(&format!(
            "DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\nAuthorization: {bad}\r\n\r\n"
        ));

        assert!(result.is_err());
        assert!(f.sender.last().starts_with("RTSP/1.0 403 Forbidden\r\n"));
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByAuthFailure)
        );
    }

    #[test]
    fn inbound_play_before_setup_is_455_and_not_fatal() {
        let f = inbound_fixture(Config::default());
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();
        f.session
            .on_received(&format!("PLAY {ROOM_URI} RTSP/1.0\r\nCSeq: 3\r\n\r\n"))
            .unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("RTSP/1.0 455 Method Not Valid in This State\r\n"));
        assert!(frame.contains("CSeq: 3 PLAY\r\n"));
        assert_eq!(f.session.state(), RtspState::Describe);
        assert_eq!(f.session.end_reason(), None);
    }

    #[test]
    fn inbound_setup_to_unknown_media_is_455() {
        let f = inbound_fixture(Config::default());
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();
        f.session
            .on_received(&format!(
                "SETUP {ROOM_URI}/subtitles RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n"
            ))
            .unwrap();
        assert!(f.sender.last().starts_with("RTSP/1.0 455 "));
        assert_eq!(f.session.state(), RtspState::Describe);
    }

    #[test]
    fn inbound_setup_rewrites_transport() {
        let config = Config {
            nat_ip: "192.0.2.10".to_string(),
            ..Config::default()
        };
        let f = inbound_fixture(config);
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();
        f.session
            .on_received(&format!(
                "SETUP {ROOM_URI}/audio RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n"
            ))
            .unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("RTSP/1.0 200 OK\r\n"));
        let transport = header_value(&frame, "Transport");
        assert!(transport.starts_with("RTP/AVP;unicast;client_port=8000-8001;source=192.0.2.10;server_port="));
        assert_eq!(f.session.state(), RtspState::Setup);
        assert!(!f.session.session_token().is_empty());
    }

    #[test]
    fn inbound_setup_without_client_port_is_fatal() {
        let f = inbound_fixture(Config::default());
        f.session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\nCSeq: 2\r\n\r\n"))
            .unwrap();
        let result = f.session.on_received(&format!(
            "SETUP {ROOM_URI}/audio RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP;unicast\r\n\r\n"
        ));
        assert!(result.is_err());
        assert!(f.sender.last().starts_with("RTSP/1.0 400 Bad Request\r\n"));
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByNoCompatibleCodec)
        );
    }

    #[test]
    fn inbound_full_dialog_reaches_playing() {
        let f = inbound_fixture(Config::default());
        drive_inbound_to_setup(&f);

        let setup_token = f.session.session_token();
        f.session
            .on_received(&format!(
                "PLAY {ROOM_URI} RTSP/1.0\r\nCSeq: 5\r\nSession: {setup_token}\r\n\r\n"
            ))
            .unwrap();

        assert_eq!(f.session.state(), RtspState::Playing);
        let frame = f.sender.last();
        assert!(frame.contains(&format!("Session: {setup_token}\r\n")));
        assert!(frame.contains("Range: npt=0.000-\r\n"));

        // The session token is fixed at the first SETUP response and
        // echoed identically on PLAY (I5).
        for frame in f.sender.frames().iter().skip(2) {
            assert!(frame.contains(&format!("Session: {setup_token}\r\n")));
        }

        // Member joined, channels opened toward the peer address.
        assert_eq!(f.conference.room_of(TOKEN).as_deref(), Some("room101"));
        let channels = f.bridge.channels_of(TOKEN);
        assert_eq!(channels.len(), 2);
        for channel in &channels {
            assert_eq!(channel.remote_ip, PEER);
            assert_eq!(channel.local_port % 2, 0);
            assert_ne!(channel.local_port, 0);
        }
    }

    #[test]
    fn inbound_teardown_while_playing_releases_everything() {
        let f = inbound_fixture(Config::default());
        drive_inbound_to_setup(&f);
        let token = f.session.session_token();
        f.session
            .on_received(&format!(
                "PLAY {ROOM_URI} RTSP/1.0\r\nCSeq: 5\r\nSession: {token}\r\n\r\n"
            ))
            .unwrap();
        f.session
            .on_received(&format!(
                "TEARDOWN {ROOM_URI} RTSP/1.0\r\nCSeq: 6\r\nSession: {token}\r\n\r\n"
            ))
            .unwrap();

        assert!(f.sender.last().starts_with("RTSP/1.0 200 OK\r\n"));
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByRemoteUser)
        );
        assert!(f.conference.room_of(TOKEN).is_none());
        assert!(f.bridge.channels_of(TOKEN).is_empty());
    }

    #[test]
    fn inbound_parse_error_is_fatal() {
        let f = inbound_fixture(Config::default());
        let result = f
            .session
            .on_received(&format!("DESCRIBE {ROOM_URI} RTSP/1.0\r\n\r\n"));
        assert!(result.is_err());
        assert!(f.sender.last().starts_with("RTSP/1.0 400 Bad Request\r\n"));
        assert_eq!(f.session.state(), RtspState::TornDown);
    }

    #[test]
    fn outbound_connect_sends_describe() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();

        let frame = f.sender.last();
        assert!(frame.starts_with("DESCRIBE rtsp://example.com:554/stream RTSP/1.0\r\n"));
        assert!(frame.contains("CSeq: 1 DESCRIBE\r\n"));
        assert!(frame.contains("Accept: application/sdp\r\n"));
        assert!(frame.contains(&format!("User-Agent: {}\r\n", PRODUCT)));
        assert_eq!(f.session.state(), RtspState::Describe);
    }

    fn peer_sdp() -> String {
        "v=0\r\n\
         o=- 1 1 IN IP4 cam\r\n\
         s=Cam\r\n\
         c=IN IP4 203.0.113.5\r\n\
         t=0 0\r\n\
         m=audio 0 RTP/AVP 0\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=control:audio\r\n\
         m=video 0 RTP/AVP 96\r\n\
         a=rtpmap:96 H264/90000\r\n\
         a=control:video\r\n"
            .to_string()
    }

    fn describe_ok(cseq: u32) -> String {
        let sdp = peer_sdp();
        format!(
            "RTSP/1.0 200 OK\r\nCSeq: {cseq} DESCRIBE\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
            sdp.len(),
            sdp
        )
    }

    #[test]
    fn outbound_full_dialog_reaches_playing() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();
        f.session.on_received(&describe_ok(1)).unwrap();

        // DESCRIBE answer triggers SETUP of the audio stream at its
        // control URI, joined onto the base URL.
        let setup_audio = f.sender.last();
        assert!(setup_audio.starts_with("SETUP rtsp://example.com:554/stream/audio RTSP/1.0\r\n"));
        assert!(setup_audio.contains("Transport: RTP/AVP/UDP;unicast;client_port="));
        assert_eq!(f.session.state(), RtspState::SetupAudio);

        f.session
            .on_received(
                "RTSP/1.0 200 OK\r\nCSeq: 2 SETUP\r\nSession: 555666;timeout=60\r\nTransport: RTP/AVP;unicast;source=203.0.113.5;client_port=5000-5001;server_port=52000-52001\r\n\r\n",
            )
            .unwrap();

        let setup_video = f.sender.last();
        assert!(setup_video.starts_with("SETUP rtsp://example.com:554/stream/video RTSP/1.0\r\n"));
        // The learned session token is echoed bare, without the timeout
        // parameter.
        assert!(setup_video.contains("Session: 555666\r\n"));
        assert_eq!(f.session.state(), RtspState::SetupVideo);

        f.session
            .on_received(
                "RTSP/1.0 200 OK\r\nCSeq: 3 SETUP\r\nSession: 555666\r\nTransport: RTP/AVP;unicast;client_port=5002-5003;server_port=52002-52003\r\n\r\n",
            )
            .unwrap();

        let play = f.sender.last();
        assert!(play.starts_with("PLAY rtsp://example.com:554/stream RTSP/1.0\r\n"));
        assert!(play.contains("Session: 555666\r\n"));
        assert!(play.contains("Range: npt=0.000-\r\n"));
        assert_eq!(f.session.state(), RtspState::Play);

        f.session
            .on_received("RTSP/1.0 200 OK\r\nCSeq: 4 PLAY\r\nSession: 555666\r\n\r\n")
            .unwrap();

        assert_eq!(f.session.state(), RtspState::Playing);
        assert_eq!(f.conference.room_of("out:1").as_deref(), Some("room101"));

        let channels = f.bridge.channels_of("out:1");
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.remote_ip == "203.0.113.5"));

        // CSeq values of outbound requests are strictly increasing (I3).
        let cseqs: Vec<u32> = f
            .sender
            .frames()
            .iter()
            .filter_map(|frame| {
                frame
                    .lines()
                    .find_map(|l| l.strip_prefix("CSeq: "))
                    .and_then(|v| v.split_whitespace().next())
                    .and_then(|v| v.parse().ok())
            })
            .collect();
        assert_eq!(cseqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn outbound_retries_describe_with_digest() {
        let f = outbound_fixture(Config::default(), "alice", "secret");
        f.session.start().unwrap();

        f.session
            .on_received(
                "RTSP/1.0 401 Unauthorized\r\nCSeq: 1 DESCRIBE\r\nWWW-Authenticate: Digest realm=\"testrealm\",nonce=\"abc123\",algorithm=MD5\r\n\r\n",
            )
            .unwrap();

        let retry = f.sender.last();
        assert!(retry.starts_with("DESCRIBE rtsp://example.com:554/stream RTSP/1.0\r\n"));
        assert!(retry.contains("CSeq: 2 DESCRIBE\r\n"));
        let authorization = header_value(&retry, "Authorization").to_string();
        let challenge = DigestChallenge {
            scheme: "Digest".to_string(),
            realm: "testrealm".to_string(),
            nonce: "abc123".to_string(),
        };
        assert!(auth::verify(
            "alice",
            "secret",
            &challenge,
            "DESCRIBE",
            &authorization
        ));

        // Subsequent authenticated requests reuse the credentials.
        f.session.on_received(&describe_ok(2)).unwrap();
        assert!(f.sender.last().contains("Authorization: Digest username=\"alice\""));
    }

    #[test]
    fn outbound_second_challenge_aborts() {
        let f = outbound_fixture(Config::default(), "alice", "secret");
        f.session.start().unwrap();
        let challenge_frame =
            "RTSP/1.0 401 Unauthorized\r\nCSeq: 1 DESCRIBE\r\nWWW-Authenticate: Digest realm=\"r\",nonce=\"n\",algorithm=MD5\r\n\r\n";
        f.session.on_received(challenge_frame).unwrap();

        let second =
            "RTSP/1.0 401 Unauthorized\r\nCSeq: 2 DESCRIBE\r\nWWW-Authenticate: Digest realm=\"r\",nonce=\"n2\",algorithm=MD5\r\n\r\n";
        assert!(f.session.on_received(second).is_err());
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByAuthFailure)
        );
    }

    #[test]
    fn outbound_challenge_without_credentials_aborts() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();
        let challenge_frame =
            "RTSP/1.0 401 Unauthorized\r\nCSeq: 1 DESCRIBE\r\nWWW-Authenticate: Digest realm=\"r\",nonce=\"n\",algorithm=MD5\r\n\r\n";
        assert!(f.session.on_received(challenge_frame).is_err());
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByAuthFailure)
        );
    }

    #[test]
    fn outbound_describe_without_match_ends_with_codec_reason() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();
        let sdp = "v=0\r\nm=audio 0 RTP/AVP 102\r\na=rtpmap:102 AMR/8000\r\n";
        let frame = format!(
            "RTSP/1.0 200 OK\r\nCSeq: 1 DESCRIBE\r\nContent-Length: {}\r\n\r\n{}",
            sdp.len(),
            sdp
        );
        assert!(f.session.on_received(&frame).is_err());
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByNoCompatibleCodec)
        );
    }

    #[test]
    fn outbound_error_status_tears_down() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();
        let frame = "RTSP/1.0 404 Not Found\r\nCSeq: 1 DESCRIBE\r\n\r\n";
        assert!(f.session.on_received(frame).is_err());
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByRemoteUser)
        );
    }

    #[test]
    fn outbound_local_close_while_playing_sends_teardown() {
        let f = outbound_fixture(Config::default(), "", "");
        f.session.start().unwrap();
        f.session.on_received(&describe_ok(1)).unwrap();
        f.session
            .on_received(
                "RTSP/1.0 200 OK\r\nCSeq: 2 SETUP\r\nSession: 777\r\nTransport: RTP/AVP;unicast;server_port=52000-52001\r\n\r\n",
            )
            .unwrap();
        f.session
            .on_received(
                "RTSP/1.0 200 OK\r\nCSeq: 3 SETUP\r\nSession: 777\r\nTransport: RTP/AVP;unicast;server_port=52002-52003\r\n\r\n",
            )
            .unwrap();
        f.session
            .on_received("RTSP/1.0 200 OK\r\nCSeq: 4 PLAY\r\n\r\n")
            .unwrap();
        assert_eq!(f.session.state(), RtspState::Playing);

        f.session.close(CallEndReason::EndedByLocalUser);

        let teardown = f.sender.last();
        assert!(teardown.starts_with("TEARDOWN rtsp://example.com:554/stream RTSP/1.0\r\n"));
        assert!(teardown.contains("Session: 777\r\n"));
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByLocalUser)
        );
        assert!(f.bridge.channels_of("out:1").is_empty());
        assert!(f.conference.room_of("out:1").is_none());
    }

    #[test]
    fn transitional_state_deadline_expires() {
        let config = Config {
            setup_deadline: Duration::ZERO,
            ..Config::default()
        };
        let f = outbound_fixture(config, "", "");
        f.session.start().unwrap();
        assert_eq!(f.session.state(), RtspState::Describe);

        assert!(f.session.poll_deadline());
        assert_eq!(f.session.state(), RtspState::TornDown);
        assert_eq!(
            f.session.end_reason(),
            Some(CallEndReason::EndedByRemoteUser)
        );
    }

    #[test]
    fn playing_state_has_no_deadline() {
        let config = Config {
            setup_deadline: Duration::ZERO,
            ..Config::default()
        };
        let f = inbound_fixture(config);
        drive_inbound_to_setup(&f);
        let token = f.session.session_token();
        f.session
            .on_received(&format!(
                "PLAY {ROOM_URI} RTSP/1.0\r\nCSeq: 5\r\nSession: {token}\r\n\r\n"
            ))
            .unwrap();
        assert_eq!(f.session.state(), RtspState::Playing);
        assert!(!f.session.poll_deadline());
    }

    /// Extract a header value out of a raw frame.
    fn header_value<'a>(frame: &'a str, name: &str) -> &'a str {
        frame
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case(name).then(|| value.trim())
            })
            .unwrap_or_else(|| panic!("header {name} not found in frame:\n{frame}"))
    }
}
