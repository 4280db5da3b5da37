use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quicklane::endpoint::UdpEndpoint;
use quicklane::sender::{SenderConfig, SenderSession};

/// Sends a file to a quicklane receiver over UDP.
#[derive(Parser, Debug)]
#[command(name = "quicklane-sender", about = "Send a file over the quicklane transport")]
struct Args {
    /// Loss-detection time threshold, in seconds. 0 disables the time
    /// detector (at least one of --time/--number must stay non-zero).
    #[arg(short = 't', long = "time", default_value_t = 0.1)]
    time: f64,

    /// Packet-number reordering threshold, in packets. 0 disables the
    /// reordering detector.
    #[arg(short = 'n', long = "number", default_value_t = 10)]
    number: u32,

    /// Path of the file to send.
    #[arg(long, default_value = "file.txt")]
    file: PathBuf,

    /// Receiver address.
    #[arg(long, default_value = "127.0.0.1:9997")]
    peer: SocketAddr,

    /// Local address to bind the sending socket to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = SenderConfig {
        time_threshold: Duration::from_secs_f64(args.time.max(0.0)),
        reordering_threshold: args.number,
        file_path: args.file,
        peer_addr: args.peer,
        bind_addr: args.bind,
        ..SenderConfig::default()
    };

    let config = match config.validated() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let endpoint = match UdpEndpoint::bind(config.bind_addr) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind sending socket");
            return ExitCode::FAILURE;
        }
    };

    let mut session = SenderSession::new(endpoint, config);
    match session.run() {
        Ok(()) => {
            tracing::info!(stats = ?session.stats(), "file transfer complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "sender session failed");
            ExitCode::FAILURE
        }
    }
}
