//! TCP signaling plumbing: message framing, the socket-backed
//! [`SignalSender`], and the per-listener accept loop.
//!
//! Framing follows RFC 2326 §4: header lines up to a blank line, then
//! exactly `Content-Length` body bytes. Reads poll with a short timeout
//! so connection threads can enforce session deadlines between frames;
//! partial frames survive across polls.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::server::RtspServer;
use crate::session::{CallEndReason, Session};
use crate::transport::SignalSender;

/// Read timeout between deadline polls.
pub const READ_POLL: Duration = Duration::from_secs(1);

/// Socket-backed [`SignalSender`].
pub struct TcpSignalSender {
    stream: Mutex<TcpStream>,
    peer: SocketAddr,
}

impl TcpSignalSender {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Mutex::new(stream),
            peer,
        }
    }
}

impl SignalSender for TcpSignalSender {
    fn send(&self, data: &[u8]) -> std::io::Result<()> {
        let mut stream = self.stream.lock();
        stream.write_all(data)
    }

    fn peer_host(&self) -> String {
        self.peer.ip().to_string()
    }
}

/// One attempt to read a frame.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete RTSP message.
    Frame(String),
    /// Peer closed the connection.
    Eof,
    /// Read timeout expired with the frame still incomplete.
    Timeout,
}

/// Incremental reader assembling framed RTSP messages from a stream.
///
/// Keeps partial head lines and body bytes across timeouts, so a slow
/// peer cannot corrupt framing.
pub struct FrameReader {
    reader: BufReader<TcpStream>,
    partial: String,
    head: String,
    content_len: Option<usize>,
    body: Vec<u8>,
}

impl FrameReader {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
            partial: String::new(),
            head: String::new(),
            content_len: None,
            body: Vec::new(),
        }
    }

    /// Read until one complete message, EOF, or a poll timeout.
    pub fn read_frame(&mut self) -> std::io::Result<ReadOutcome> {
        loop {
            if let Some(needed) = self.content_len {
                while self.body.len() < needed {
                    let mut chunk = vec![0u8; needed - self.body.len()];
                    match self.reader.read(&mut chunk) {
                        Ok(0) => return Ok(ReadOutcome::Eof),
                        Ok(n) => self.body.extend_from_slice(&chunk[..n]),
                        Err(e) if is_timeout(&e) => return Ok(ReadOutcome::Timeout),
                        Err(e) => return Err(e),
                    }
                }
                let mut frame = std::mem::take(&mut self.head);
                frame.push_str(&String::from_utf8_lossy(&self.body));
                self.body.clear();
                self.content_len = None;
                return Ok(ReadOutcome::Frame(frame));
            }

            match self.reader.read_line(&mut self.partial) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(_) => {
                    if !self.partial.ends_with('\n') {
                        // Stream ended mid-line; next read reports EOF.
                        continue;
                    }
                    let line = std::mem::take(&mut self.partial);
                    let blank = line == "\r\n" || line == "\n";
                    if blank && self.head.trim().is_empty() {
                        // Stray blank line between messages.
                        self.head.clear();
                        continue;
                    }
                    self.head.push_str(&line);
                    if blank {
                        let needed = content_length_of(&self.head);
                        if needed == 0 {
                            return Ok(ReadOutcome::Frame(std::mem::take(&mut self.head)));
                        }
                        self.content_len = Some(needed);
                    }
                }
                Err(e) if is_timeout(&e) => return Ok(ReadOutcome::Timeout),
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn content_length_of(head: &str) -> usize {
    head.lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("Content-Length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0)
}

/// Drive a session from its connection thread until it terminates.
///
/// Frames dispatch into the session; timeouts poll the state deadline; a
/// dead socket clears the session with `EndedByTransport`.
pub(crate) fn run_message_loop(reader: &mut FrameReader, session: &Arc<Session>) {
    loop {
        match reader.read_frame() {
            Ok(ReadOutcome::Frame(frame)) => {
                if session.on_received(&frame).is_err() || session.is_terminated() {
                    return;
                }
            }
            Ok(ReadOutcome::Timeout) => {
                if session.poll_deadline() || session.is_terminated() {
                    return;
                }
            }
            Ok(ReadOutcome::Eof) | Err(_) => {
                session.close(CallEndReason::EndedByTransport);
                return;
            }
        }
    }
}

/// Non-blocking TCP accept loop for one listener.
///
/// Checks the `running` flag between accepts with a 50ms poll interval so
/// [`RtspServer::stop`](crate::server::RtspServer::stop) can terminate it
/// promptly.
pub(crate) fn accept_loop(listener: TcpListener, server: RtspServer, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let server = server.clone();
                thread::spawn(move || server.handle_connection(stream));
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}
