use clap::Parser;
use log::{error, info};
use server::config::ArenaConfig;
use server::network::Server;
use server::stats::{LogStatsSink, StatsReporter};
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments, loads the room table and runs the server until Ctrl+C.
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
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// JSON room table; the built-in lobby and arenas are used when omitted
        #[clap(short, long)]
        rooms: Option<PathBuf>,
    }

    env_logger::init();
    let args = Args::parse();

    let config = match &args.rooms {
        Some(path) => {
            info!("Loading room table from {}", path.display());
            ArenaConfig::load(path)?
        }
        None => ArenaConfig::default(),
    };

    let stats = StatsReporter::spawn(LogStatsSink);
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, &config, stats).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
