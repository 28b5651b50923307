//! Network transport for RTSP signaling.
//!
//! Signaling runs over TCP, one connection per dialog, one OS thread per
//! connection performing blocking reads ([`tcp`]). Sessions never touch
//! sockets directly: they write through the [`SignalSender`] capability
//! and receive one callback per framed message.
//!
//! RTP media transport is owned by the media subsystem and is out of
//! scope here; sessions only negotiate its endpoints.

pub mod tcp;

pub use tcp::{FrameReader, ReadOutcome, TcpSignalSender};

/// Write side of a signaling connection.
///
/// [`send`](Self::send) is synchronous and must not re-enter the session:
/// it is called while the per-session mutex is held.
pub trait SignalSender: Send + Sync {
    /// Write one serialized RTSP message to the peer.
    fn send(&self, data: &[u8]) -> std::io::Result<()>;

    /// Peer host without the port, used as the RTP fallback address.
    fn peer_host(&self) -> String;
}
