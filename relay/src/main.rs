use clap::Parser;
use log::info;
use relay::network::RelayServer;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of phones on the bus
    #[arg(short, long, default_value = "16")]
    max_peers: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value = "5")]
    peer_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting relay on {} (max {} peers)", address, args.max_peers);

    let mut relay = RelayServer::new(
        &address,
        args.max_peers,
        Duration::from_secs(args.peer_timeout_secs),
    )
    .await?;

    let shutdown = relay.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            shutdown.shutdown();
        }
    });

    relay.run().await
}
