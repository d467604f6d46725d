use clap::Parser;
use server::dispatcher::Dispatcher;
use server::listener::Listener;
use server::profile::{MemoryStore, ProfileStore};
use server::registry::Registry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Main-method of the application.
/// Parses command-line arguments, then wires up the profile store, the accept
/// loop and the dispatcher.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "6789")]
        port: u16,
        /// Path to the JSON accounts file seeding the profile store
        #[clap(short, long, default_value = "accounts.json")]
        accounts: String,
        /// Seconds between matchmaking pairing passes
        #[clap(long, default_value = "15")]
        pairing_period: u64,
        /// Maximum signed-in sessions
        #[clap(long, default_value = "100")]
        max_sessions: usize,
        /// Maximum concurrent battles
        #[clap(long, default_value = "50")]
        max_battles: usize,
    }

    env_logger::init();
    let args = Args::parse();

    let store: Arc<dyn ProfileStore> = Arc::new(MemoryStore::from_file(Path::new(&args.accounts))?);
    let registry = Arc::new(Registry::new(args.max_sessions, args.max_battles));
    let (admission_tx, admission_rx) = mpsc::channel(args.max_sessions);

    let listener = Listener::bind(
        &format!("{}:{}", args.host, args.port),
        admission_tx,
        Arc::clone(&registry),
        Arc::clone(&store),
    )
    .await?;

    let dispatcher = Dispatcher::new(
        admission_rx,
        Arc::clone(&registry),
        Arc::clone(&store),
        Duration::from_secs(args.pairing_period),
    );

    let listener_handle = tokio::spawn(listener.run());
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = listener_handle => {
            if let Err(e) = result {
                eprintln!("Listener task panicked: {}", e);
            }
        }
        result = dispatcher_handle => {
            if let Err(e) = result {
                eprintln!("Dispatcher task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
