//! Server side: listeners, admission policy, and the live session table.
//!
//! An [`RtspServer`] owns a set of TCP listeners (config `listeners`,
//! default `0.0.0.0:1554`). Each accepted connection reads one RTSP
//! message and is either rejected with an immediate error status or
//! admitted as a new inbound [`Session`] keyed by the peer address.
//!
//! Admission checks, in order:
//!
//! | Condition | Status |
//! |-----------|--------|
//! | a session for this peer address already exists | 454 |
//! | the first message does not parse as a request | 400 |
//! | the peer announces a RealMedia agent | 505 |
//! | the first method is not OPTIONS or DESCRIBE | 455 |
//! | the URI path names no enabled room | 404 |
//!
//! The session table mutex is never held across a send on a session's
//! connection; immediate error replies go to the raw socket before any
//! session exists.

use std::collections::HashMap;
use std::net::{IpAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::conference::{ConferenceManager, MediaBridge};
use crate::error::{Result, RtspError};
use crate::protocol::message::{self, PRODUCT, RtspMessage};
use crate::session::{CallEndReason, PUBLIC_METHODS, Session};
use crate::transport::tcp::{self, FrameReader, ReadOutcome, TcpSignalSender};
use crate::transport::SignalSender;

/// RTSP signaling server: listener set plus live session registry.
#[derive(Clone)]
pub struct RtspServer {
    shared: Arc<ServerShared>,
}

struct ServerShared {
    config: Config,
    conference: Arc<dyn ConferenceManager>,
    media: Arc<dyn MediaBridge>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Normalized listener address → accept-loop running flag.
    listeners: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl RtspServer {
    pub fn new(
        config: Config,
        conference: Arc<dyn ConferenceManager>,
        media: Arc<dyn MediaBridge>,
    ) -> Self {
        Self {
            shared: Arc::new(ServerShared {
                config,
                conference,
                media,
                sessions: RwLock::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start every configured listener. Individual bad addresses are
    /// logged and skipped, matching how a reconfigured server keeps its
    /// remaining listeners alive.
    pub fn start(&self) -> Result<()> {
        if !self.shared.config.enable {
            tracing::info!("RTSP server disabled by configuration");
            return Ok(());
        }
        for address in self.shared.config.listeners.clone() {
            if address.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.add_listener(&address) {
                tracing::warn!(address, error = %e, "listener not started");
            }
        }
        Ok(())
    }

    /// Bind and start one listener (`tcp:host:port`; the prefix is
    /// optional). Host `0.0.0.0` binds the wildcard; any other host must
    /// name a local address or the bind fails.
    pub fn add_listener(&self, address: &str) -> Result<()> {
        let normalized = normalize_listener(address);
        let (host, port) = listener_host_port(&normalized)
            .ok_or_else(|| RtspError::BadListenerAddress(address.to_string()))?;
        if port == 0 {
            return Err(RtspError::BadListenerAddress(address.to_string()));
        }
        if host != "0.0.0.0" && host.parse::<IpAddr>().is_err() {
            return Err(RtspError::BadListenerAddress(address.to_string()));
        }

        let listener = TcpListener::bind((host.as_str(), port))?;
        listener.set_nonblocking(true)?;

        let running = Arc::new(AtomicBool::new(true));
        self.shared
            .listeners
            .lock()
            .insert(normalized.clone(), running.clone());

        tracing::info!(address = %normalized, "RTSP listener started");

        let server = self.clone();
        thread::spawn(move || tcp::accept_loop(listener, server, running));
        Ok(())
    }

    /// Stop and forget one listener. Established sessions stay up.
    pub fn remove_listener(&self, address: &str) {
        let normalized = normalize_listener(address);
        if let Some(running) = self.shared.listeners.lock().remove(&normalized) {
            running.store(false, Ordering::SeqCst);
            tracing::info!(address = %normalized, "RTSP listener removed");
        }
    }

    /// Whether some listener covers `host:port` (a wildcard listener
    /// covers any host on its port).
    pub fn has_listener(&self, host: &str, port: u16) -> bool {
        self.shared.listeners.lock().keys().any(|addr| {
            listener_host_port(addr).is_some_and(|(listener_host, listener_port)| {
                listener_port == port && (listener_host == host || listener_host == "0.0.0.0")
            })
        })
    }

    /// Stop all listeners and clear every live session.
    pub fn stop(&self) {
        for (_, running) in self.shared.listeners.lock().drain() {
            running.store(false, Ordering::SeqCst);
        }
        let sessions: Vec<Arc<Session>> =
            self.shared.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close(CallEndReason::EndedByLocalUser);
        }
        tracing::info!("RTSP server stopped");
    }

    pub fn get_session(&self, call_token: &str) -> Option<Arc<Session>> {
        self.shared.sessions.read().get(call_token).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.read().len()
    }

    /// Call tokens of the live sessions.
    pub fn session_tokens(&self) -> Vec<String> {
        self.shared.sessions.read().keys().cloned().collect()
    }

    pub(crate) fn remove_session(&self, call_token: &str) -> Option<Arc<Session>> {
        let removed = self.shared.sessions.write().remove(call_token);
        if removed.is_some() {
            let total = self.shared.sessions.read().len();
            tracing::debug!(call_token, total_sessions = total, "session removed");
        }
        removed
    }

    /// One accepted connection: read the first message, admit or reject,
    /// then pump frames into the session until it terminates.
    pub(crate) fn handle_connection(&self, stream: TcpStream) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };
        let call_token = peer_addr.to_string();
        tracing::info!(%peer_addr, "client connected");

        if stream.set_read_timeout(Some(tcp::READ_POLL)).is_err() {
            return;
        }
        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };
        let sender: Arc<dyn SignalSender> = Arc::new(TcpSignalSender::new(stream, peer_addr));
        let mut reader = FrameReader::new(reader_stream);

        // The peer gets one setup window to produce its first message.
        let first_deadline = Instant::now() + self.shared.config.setup_deadline;
        let first = loop {
            match reader.read_frame() {
                Ok(ReadOutcome::Frame(frame)) => break frame,
                Ok(ReadOutcome::Timeout) => {
                    if Instant::now() >= first_deadline {
                        tracing::warn!(%peer_addr, "no request within setup deadline");
                        return;
                    }
                }
                Ok(ReadOutcome::Eof) | Err(_) => return,
            }
        };

        let Some(session) = self.admit(&call_token, &first, sender) else {
            tracing::info!(%peer_addr, "connection rejected");
            return;
        };

        if session.on_received(&first).is_ok() && !session.is_terminated() {
            tcp::run_message_loop(&mut reader, &session);
        }

        session.close(CallEndReason::EndedByTransport);
        self.remove_session(&call_token);
        tracing::info!(%peer_addr, "client disconnected");
    }

    /// Apply the admission policy to a connection's first message.
    fn admit(
        &self,
        call_token: &str,
        raw: &str,
        sender: Arc<dyn SignalSender>,
    ) -> Option<Arc<Session>> {
        let req = match self.screen(call_token, raw) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(call_token, error = %e, "connection refused");
                send_admission_error(&*sender, e.status_code().unwrap_or(400));
                return None;
            }
        };

        let session = match Session::inbound(
            call_token,
            &req.uri,
            &self.shared.config,
            sender,
            self.shared.conference.clone(),
            self.shared.media.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(call_token, error = %e, "session creation failed");
                return None;
            }
        };

        self.shared
            .sessions
            .write()
            .insert(call_token.to_string(), session.clone());
        let total = self.shared.sessions.read().len();
        tracing::debug!(call_token, total_sessions = total, "session admitted");
        Some(session)
    }

    /// Admission checks, strictest first; see the module docs for the
    /// status each rejection maps to.
    fn screen(&self, call_token: &str, raw: &str) -> Result<message::RtspRequest> {
        use crate::error::PolicyErrorKind;

        if self.shared.sessions.read().contains_key(call_token) {
            return Err(RtspError::Policy(PolicyErrorKind::SessionExists));
        }

        let req = match message::parse(raw)? {
            RtspMessage::Request(req) => req,
            RtspMessage::Response(_) => {
                return Err(RtspError::Parse(crate::error::ParseErrorKind::NotRtsp));
            }
        };

        if let Some(agent) = req.get_header("User-Agent") {
            if agent.contains("RealMedia") {
                tracing::warn!(call_token, agent, "RealRTSP is not supported");
                return Err(RtspError::Policy(PolicyErrorKind::UnsupportedAgent));
            }
        }

        if req.method != "OPTIONS" && req.method != "DESCRIBE" {
            return Err(RtspError::MethodOutOfOrder {
                method: req.method,
                state: "None",
            });
        }

        let path = message::uri_path_segments(&req.uri)
            .first()
            .cloned()
            .unwrap_or_default();
        if !self.shared.config.is_path_enabled(&path) {
            return Err(RtspError::Policy(PolicyErrorKind::UnknownRoom));
        }

        Ok(req)
    }
}

/// Immediate rejection before any session exists: status line plus the
/// `Public` list, no CSeq echo.
fn send_admission_error(sender: &dyn SignalSender, status: u16) {
    let frame = format!(
        "RTSP/1.0 {} {}\r\nDate: {}\r\nPublic: {}\r\nServer: {}\r\n\r\n",
        status,
        message::reason_phrase(status),
        message::http_date(),
        PUBLIC_METHODS,
        PRODUCT,
    );
    let _ = sender.send(frame.as_bytes());
}

/// Strip spaces and the optional `tcp:` prefix.
fn normalize_listener(address: &str) -> String {
    let address = address.replace(' ', "");
    match address.strip_prefix("tcp:") {
        Some(rest) => rest.to_string(),
        None => address,
    }
}

fn listener_host_port(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}
