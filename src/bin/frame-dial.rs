//! Load generator for frame-router.
//!
//! Spawns a number of concurrent dialers. Each one repeatedly connects to
//! one of the targets, sends a single packet on a rotating routing key,
//! reads the `pong` when it dialed the ping route, and hangs up.

use bytes::Bytes;
use clap::Parser;
use frame_router::codec::{Codec, PacketCodec};
use frame_router::handlers::PING_ROUTE;
use frame_router::packet::{Packet, PacketType, HEADER_LEN};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "frame-dial")]
#[command(version = "0.1.0")]
#[command(about = "Load generator for frame-router", long_about = None)]
struct Args {
    /// Server address to dial; repeat to spread load round-robin
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    addr: Vec<SocketAddr>,

    /// Concurrent dialers
    #[arg(short = 'n', long, default_value_t = 100)]
    connections: usize,

    /// Routing keys to rotate through
    #[arg(short, long, value_delimiter = ',', default_value = "1000,2000,3000")]
    routes: Vec<u32>,

    /// Pause between dials of one dialer, in milliseconds
    #[arg(short, long, default_value_t = 100)]
    interval_ms: u64,

    /// Dials per dialer before stopping (runs forever when omitted)
    #[arg(long)]
    rounds: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.addr.is_empty() || args.routes.is_empty() {
        return Err("at least one address and one route are required".into());
    }

    info!(
        targets = args.addr.len(),
        connections = args.connections,
        routes = ?args.routes,
        "Starting dialers"
    );

    let args = Arc::new(args);
    let sent = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::with_capacity(args.connections);

    for dialer in 0..args.connections {
        let args = Arc::clone(&args);
        let sent = Arc::clone(&sent);
        tasks.push(tokio::spawn(async move {
            let codec = PacketCodec::default();
            let mut round = 0u64;
            while args.rounds.map_or(true, |limit| round < limit) {
                let slot = dialer + round as usize;
                let addr = args.addr[slot % args.addr.len()];
                let route = args.routes[slot % args.routes.len()];

                match dial(&codec, addr, route, format!("dialer-{dialer}-{round}")).await {
                    Ok(()) => {
                        sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!(dialer, addr = %addr, error = %e, "Dial failed"),
                }

                round += 1;
                tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
            }
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Dialer panicked");
        }
    }

    info!(sent = sent.load(Ordering::Relaxed), "Done");
    Ok(())
}

async fn dial(codec: &PacketCodec, addr: SocketAddr, route: u32, body: String) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;

    let packet = Packet::new(route, PacketType::Ping, Bytes::from(body));
    let frame = codec
        .encode(&packet)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    stream.write_all(&frame).await?;

    if route == PING_ROUTE {
        // Replies carry type 0, so read them raw rather than through the
        // server-side decoder.
        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let length = u32::from_be_bytes([header[6], header[7], header[8], header[9]]);
        let mut reply = vec![0u8; length as usize];
        stream.read_exact(&mut reply).await?;
        debug!(route, reply = %String::from_utf8_lossy(&reply), "Received reply");
    }

    Ok(())
}
