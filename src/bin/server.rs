//! LodeDB Server Binary
//!
//! Loads the YAML config, opens the database, and serves the line
//! protocol until SIGINT/SIGTERM. Exit code 0 on clean shutdown,
//! non-zero on any startup failure.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use lodedb::{Config, Database, Result, Server};

/// LodeDB Server
#[derive(Parser, Debug)]
#[command(name = "lodedb-server")]
#[command(about = "Persistent keyspace/table database over a line-delimited TCP protocol")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("lodedb-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let host = config.host.clone();

    let db = Database::open(config)?;
    let server = Server::bind(db.clone())?;

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
        .map_err(|e| lodedb::LodeError::Internal(format!("cannot install signal handler: {}", e)))?;

    // The readiness line external tooling waits for
    println!("Listening host={} port={}", host, server.local_addr()?.port());
    std::io::stdout().flush()?;

    server.run()?;
    db.shutdown();
    Ok(())
}
