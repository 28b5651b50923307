//! # rtsp-mcu — RTSP signaling core for a multipoint conferencing unit
//!
//! Establishes RTSP sessions in both roles — outbound pull from a remote
//! stream and inbound push into a conference room — negotiating codecs
//! via SDP and RTP endpoints via the `Transport` header, with digest
//! authentication on both sides. Media itself never flows through this
//! crate: on PLAY, each session hands the negotiated
//! `{payload type, local port, remote ip:port, codec}` tuples to the
//! media subsystem behind the [`MediaBridge`] trait.
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Message parsing, session lifecycle, transport negotiation |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Offer ingest and recvonly answer generation |
//! | [RFC 2069](https://tools.ietf.org/html/rfc2069) | HTTP Digest | Challenge/response authentication |
//! | [RFC 3551](https://tools.ietf.org/html/rfc3551) | RTP A/V profile | Static payload type table |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  RtspServer    — listeners, admission, table  │
//! │  ClientDialer  — outbound pulls               │
//! ├───────────────────────────────────────────────┤
//! │  Session       — dual-role state machine      │
//! │  session::transport — Transport header        │
//! ├───────────────────────────────────────────────┤
//! │  protocol      — message codec, SDP, digest   │
//! │  caps          — codec capability slots       │
//! ├───────────────────────────────────────────────┤
//! │  transport     — TCP framing, accept loop     │
//! │  conference    — room/media boundary traits   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtsp_mcu::{Config, RtspServer};
//! use rtsp_mcu::conference::{LocalConference, PortCounterBridge};
//!
//! let server = RtspServer::new(
//!     Config::default(),
//!     LocalConference::new(),
//!     PortCounterBridge::new(),
//! );
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`RtspServer`]: listener set, admission policy, live sessions.
//! - [`client`] — [`ClientDialer`]: outbound `rtsp://` pulls.
//! - [`session`] — [`Session`] state machine and `Transport` negotiation.
//! - [`protocol`] — message codec, SDP offer/answer, digest auth.
//! - [`caps`] — codec capability catalog.
//! - [`conference`] — [`ConferenceManager`]/[`MediaBridge`] boundary traits.
//! - [`transport`] — TCP framing and the [`transport::SignalSender`] capability.
//! - [`config`] — [`Config`] and defaults.
//! - [`error`] — [`RtspError`] taxonomy and [`Result`] alias.

pub mod caps;
pub mod client;
pub mod conference;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{ClientDialer, RtspUrl};
pub use conference::{ConferenceManager, MediaBridge, MediaChannelParams};
pub use config::Config;
pub use error::{Result, RtspError};
pub use server::RtspServer;
pub use session::{CallEndReason, Direction, RtspState, Session};
