// pongmatch coordinator
// Pairs waiting players FIFO and relays their WebRTC handshake
//
// Usage: cargo run --bin signaling-server -- --bind 0.0.0.0:8080

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use pongmatch::logging;
use pongmatch::matchmaking::{self, Coordinator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PONGMATCH_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_server();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Coordinator listening on {} (ws: /ws, health: /health)", listener.local_addr()?);

    matchmaking::serve(listener, Coordinator::new()).await?;
    Ok(())
}
