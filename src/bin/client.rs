//! KCP echo benchmark client.
//!
//! # Usage
//!
//! ```bash
//! # Echo 16-byte messages against a server on 127.0.0.1:9001
//! kcp-echo-client 9000 127.0.0.1 9001 16
//!
//! # Drop 10% of datagrams in each direction, stop after 1000 round trips
//! kcp-echo-client 9000 127.0.0.1 9001 16 --loss 10 --seed 7 --count 1000
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use kcp_echo_bench::core::constants::DEFAULT_CONVERSATION_ID;
use kcp_echo_bench::session::{Session, SessionConfigBuilder};
use kcp_echo_bench::transport::LossConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// KCP round-trip latency benchmark client
#[derive(Parser, Debug)]
#[command(name = "kcp-echo-client")]
#[command(about = "Measure KCP echo round-trip latency over UDP")]
#[command(version)]
struct Args {
    /// Local UDP port to bind
    bind_port: u16,

    /// Echo server address
    server_ip: IpAddr,

    /// Echo server port
    server_port: u16,

    /// Echo payload size in bytes
    payload_size: usize,

    /// Percentage of datagrams dropped in each direction (0-100)
    #[arg(long, default_value = "0")]
    loss: u32,

    /// Percentage of surviving datagrams with one byte flipped (0-100)
    #[arg(long, default_value = "0")]
    damage: u32,

    /// Seed for the loss simulator
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many round trips
    #[arg(long)]
    count: Option<u64>,

    /// Conversation id
    #[arg(long, default_value_t = DEFAULT_CONVERSATION_ID)]
    conv: u32,

    /// Maintenance tick interval in milliseconds
    #[arg(long, default_value = "5")]
    tick_ms: u64,

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

    let mut builder = SessionConfigBuilder::new()
        .local_port(args.bind_port)
        .peer_addr(SocketAddr::new(args.server_ip, args.server_port))
        .conversation_id(args.conv)
        .payload_size(args.payload_size)
        .tick_interval(Duration::from_millis(args.tick_ms))
        .loss(LossConfig {
            loss_ratio: args.loss,
            damage_ratio: args.damage,
            seed: args.seed,
        });
    if let Some(count) = args.count {
        builder = builder.max_round_trips(count);
    }

    let session = Session::bind(builder.build()).await?;
    tracing::info!("Client bound on {}", session.local_addr()?);

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            handle.stop();
        }
    });

    let summary = session.run().await?;

    tracing::info!(
        round_trips = summary.round_trips,
        reports = summary.reports.len(),
        mismatches = summary.mismatches,
        rejected = summary.rejected_sends,
        inbound_dropped = summary.inbound_dropped,
        outbound_dropped = summary.outbound_dropped,
        "Benchmark finished"
    );

    Ok(())
}
