use clap::Parser;
use rtsp_mcu::conference::{LocalConference, PortCounterBridge};
use rtsp_mcu::{CallEndReason, ClientDialer, Config, RtspServer};
use std::io;

#[derive(Parser)]
#[command(
    name = "rtsp-mcu-server",
    about = "RTSP signaling server for conference rooms"
)]
struct Args {
    /// Listener endpoints (host:port), comma separated
    #[arg(long, short, default_value = "0.0.0.0:1554")]
    listener: String,

    /// Room joined by inbound sessions
    #[arg(long, default_value = "room101")]
    room: String,

    /// Room paths answered to inbound peers, comma separated
    #[arg(long, default_value = "room101")]
    paths: String,

    /// Preferred audio codec
    #[arg(long, default_value = "PCMU")]
    audio_codec: String,

    /// Preferred video codec
    #[arg(long, default_value = "H264")]
    video_codec: String,

    /// Video picture size as WxH
    #[arg(long, default_value = "352x288")]
    resolution: String,

    /// Inbound video bandwidth cap in kbit/s
    #[arg(long, default_value_t = 256)]
    bandwidth: u32,

    /// Inbound video frame rate
    #[arg(long, default_value_t = 10)]
    frame_rate: u32,

    /// Digest username
    #[arg(long, default_value = "")]
    username: String,

    /// Digest password; non-empty arms the 401 challenge
    #[arg(long, default_value = "")]
    password: String,

    /// NAT-public address reported in Transport source=
    #[arg(long, default_value = "0.0.0.0")]
    nat_ip: String,

    /// Optional rtsp:// URL to pull into the room on startup
    #[arg(long)]
    pull: Option<String>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let split = |s: &str| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    };

    let config = Config {
        listeners: split(&args.listener),
        room_name: args.room.clone(),
        enabled_paths: split(&args.paths),
        audio_codec: args.audio_codec,
        video_codec: args.video_codec,
        video_resolution: args.resolution,
        bandwidth_from: args.bandwidth,
        frame_rate_from: args.frame_rate,
        user_name: args.username,
        password: args.password,
        nat_ip: args.nat_ip,
        ..Config::default()
    };

    let conference = LocalConference::new();
    let bridge = PortCounterBridge::new();

    let server = RtspServer::new(config.clone(), conference.clone(), bridge.clone());
    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    let pulled = args.pull.and_then(|url| {
        let dialer = ClientDialer::new(config, conference, bridge);
        match dialer.connect(&args.room, &url, "outbound:1") {
            Ok(session) => Some(session),
            Err(e) => {
                eprintln!("Failed to dial {}: {}", url, e);
                None
            }
        }
    });

    println!(
        "RTSP signaling on {} — press Enter to stop",
        args.listener
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    if let Some(session) = pulled {
        session.close(CallEndReason::EndedByLocalUser);
    }
    server.stop();
}
