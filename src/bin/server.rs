//! KCP echo server binary.
//!
//! # Usage
//!
//! ```bash
//! kcp-echo-server 0.0.0.0 9001
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use kcp_echo_bench::server::{EchoServer, EchoServerBuilder};
use kcp_echo_bench::transport::LossConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// KCP echo server
#[derive(Parser, Debug)]
#[command(name = "kcp-echo-server")]
#[command(about = "Echo every KCP message back to its sender")]
#[command(version)]
struct Args {
    /// Address to bind to
    address: IpAddr,

    /// UDP port to bind to
    port: u16,

    /// Percentage of datagrams dropped in each direction (0-100)
    #[arg(long, default_value = "0")]
    loss: u32,

    /// Maximum concurrent peers
    #[arg(long, default_value = "1024")]
    max_peers: usize,

    /// Seconds of silence before a peer is forgotten
    #[arg(long, default_value = "30")]
    idle_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = EchoServerBuilder::new()
        .bind_addr(SocketAddr::new(args.address, args.port))
        .loss(LossConfig::with_loss(args.loss))
        .max_peers(args.max_peers)
        .peer_idle_timeout(Duration::from_secs(args.idle_timeout))
        .build();

    let server = EchoServer::bind(config).await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let stats = server.run().await?;
    tracing::info!(
        "Echoed {} messages to {} peers ({} evicted)",
        stats.echoed,
        stats.peers,
        stats.evicted
    );

    Ok(())
}
