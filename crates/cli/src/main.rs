mod source;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::Parser;
use rtsp::{Server, ServerConfig, SharedParameterSets};

use source::FileSource;

#[derive(Parser)]
#[command(
    name = "rtsp-live",
    about = "Single-viewer RTSP server for live H.264 streams"
)]
struct Args {
    /// Bind address (ip:port)
    #[arg(long, short, default_value_t = rtsp::server::DEFAULT_BIND_ADDR)]
    bind: SocketAddr,

    /// Host advertised in the SDP origin line
    #[arg(long)]
    public_host: Option<String>,

    /// Stamp RTP timestamps at a fixed frame rate instead of wall-clock time
    #[arg(long)]
    frame_rate: Option<u32>,

    /// Largest RTP packet in bytes
    #[arg(long, default_value_t = rtsp::media::h264::DEFAULT_MTU)]
    mtu: usize,

    /// Annex B H.264 file to loop as the live source
    #[arg(long, short)]
    input: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        public_host: args.public_host,
        frame_rate: args.frame_rate,
        mtu: args.mtu,
        ..ServerConfig::default()
    };

    let fps = args.frame_rate.unwrap_or(30);
    let source = match args.input.as_deref().map(|p| FileSource::open(p, fps)) {
        Some(Ok(source)) => Some(source),
        Some(Err(e)) => {
            eprintln!("Failed to load input: {}", e);
            return;
        }
        None => None,
    };

    let parameter_sets = SharedParameterSets::new();
    let mut server = Server::with_config(&args.bind.to_string(), config, parameter_sets.clone());

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    let feeding = Arc::new(AtomicBool::new(true));
    let feeder = source.map(|source| {
        let encoder = server.ingest_handle();
        let running = feeding.clone();
        thread::spawn(move || source.run(encoder, parameter_sets, running))
    });

    println!("RTSP server on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "stdin closed");
    }

    feeding.store(false, Ordering::SeqCst);
    if let Some(handle) = feeder
        && handle.join().is_err()
    {
        tracing::warn!("source thread panicked");
    }
    server.stop();
}
