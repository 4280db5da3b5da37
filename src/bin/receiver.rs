use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quicklane::endpoint::UdpEndpoint;
use quicklane::receiver::{ReceiverConfig, ReceiverSession};
use quicklane::QuicError;

/// Receives a file from a quicklane sender over UDP.
#[derive(Parser, Debug)]
#[command(name = "quicklane-receiver", about = "Receive a file over the quicklane transport")]
struct Args {
    /// Maximum ACK coalescing delay, in milliseconds.
    #[arg(short = 'd', long = "delay", default_value_t = 20)]
    delay: u16,

    /// Local address to bind the listening socket to.
    #[arg(long, default_value = "0.0.0.0:9997")]
    bind: SocketAddr,

    /// Path the reassembled file is written to.
    #[arg(long, default_value = "received.txt")]
    output: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = ReceiverConfig {
        ack_delay_ms: args.delay,
        bind_addr: args.bind,
        output_path: args.output,
        ..ReceiverConfig::default()
    };

    let endpoint = match UdpEndpoint::bind(config.bind_addr) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind listening socket");
            return ExitCode::FAILURE;
        }
    };

    let mut session = ReceiverSession::new(endpoint, config);
    match session.run() {
        Ok(()) => {
            tracing::info!(ack_packets = session.ack_packets_sent(), "session closed gracefully");
            ExitCode::SUCCESS
        }
        Err(QuicError::IdleTimeout) => {
            tracing::info!(ack_packets = session.ack_packets_sent(), "idle timeout, ending session gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "receiver session failed");
            ExitCode::FAILURE
        }
    }
}
