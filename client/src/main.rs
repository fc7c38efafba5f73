use clap::Parser;
use client::config::SessionConfig;
use client::network::BusClient;
use client::phone::Phone;
use client::questions::QuestionBank;
use log::info;
use shared::PlayerId;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 'r', long, default_value = "127.0.0.1:8080")]
    relay: String,

    /// Unique id of this player
    #[arg(short = 'p', long)]
    player_id: u32,

    /// Display name shown on leaderboards
    #[arg(short = 'n', long, default_value = "")]
    name: String,

    /// Claim host authority at startup
    #[arg(long)]
    host: bool,

    /// JSON question bank replacing the built-in questions
    #[arg(short = 'q', long)]
    questions: Option<PathBuf>,

    /// Timer resolution in milliseconds
    #[arg(short = 't', long, default_value = "50")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let bank = match &args.questions {
        Some(path) => QuestionBank::load(path)?,
        None => QuestionBank::builtin(),
    };
    let name = if args.name.trim().is_empty() {
        format!("Player {}", args.player_id)
    } else {
        args.name.clone()
    };

    info!("Starting player {} ({})...", args.player_id, name);
    info!("Connecting to relay: {}", args.relay);
    if args.host {
        info!("Claiming host: 'settings', 'start', 'reset', 'host <id>'");
    }
    info!("Answer with 1-4; 'logout' / 'rejoin' to sit out");

    let phone = Phone::new(PlayerId(args.player_id), &name, SessionConfig::default(), bank);
    let mut client =
        BusClient::new(&args.relay, phone, Duration::from_millis(args.tick_ms.max(1))).await?;

    client.run(args.host).await?;

    Ok(())
}
