mod config;
mod error;
mod logging;
mod report;
mod sources;
mod storage;
mod traits;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Settings;
use log::{error, info};
use std::io::{self, Write};
use storage::Store;
use traits::ResultSource;

#[derive(Parser)]
#[command(name = "speed-logger", version)]
#[command(about = "Start a speedtest or show results on localhost website", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts a single speedtest and stores the result
    StartTest,
    /// Starts a server on localhost that shows the results (not implemented yet)
    StartServer,
    /// Shows all recorded speed tests
    ShowAll,
    /// Create the SQLite database and add the necessary tables to it
    CreateDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("Failed to load config.toml")?;
    logging::init(&settings.settings).context("Failed to set up logging")?;

    match cli.command {
        Commands::StartTest => handle_start_test(&settings).await,
        Commands::StartServer => handle_start_server(),
        Commands::ShowAll => handle_show_all(&settings).await?,
        Commands::CreateDb => handle_create_db(&settings).await?,
    }

    Ok(())
}

// --- Handlers ---

/// 测速失败或写库失败都只记录日志, 不影响进程退出码
async fn handle_start_test(settings: &Settings) {
    info!("Start speedtest");

    let source = match sources::get_source(&settings.speedtest) {
        Ok(s) => s,
        Err(e) => {
            error!("Can not measure speed: {}", e);
            eprintln!("Error: {}", e);
            return;
        }
    };

    let store = match Store::connect(&settings.database.url).await {
        Ok(s) => s,
        Err(e) => {
            error!("Can not write to Database: {}", e);
            eprintln!("Error: {}", e);
            return;
        }
    };

    if let Some(id) = start_test(&store, source.as_ref()).await {
        println!("Stored measurement {}.", id);
    }
    store.close().await;
}

/// Run one test and persist it. Returns the new measurement id, or None when
/// either the test or the write failed (already logged).
async fn start_test(store: &Store, source: &dyn ResultSource) -> Option<i64> {
    let result = match source.run().await {
        Ok(r) => r,
        Err(e) => {
            error!("Can not measure speed ({}): {}", source.name(), e);
            eprintln!("Speed test failed: {}", e);
            return None;
        }
    };

    match store.record(&result).await {
        Ok(id) => {
            info!("Store measurement {}", id);
            Some(id)
        }
        Err(e) => {
            error!("Can not write to Database: {}", e);
            eprintln!("Could not store the result: {}", e);
            None
        }
    }
}

fn handle_start_server() {
    println!("The server will start here");
}

async fn handle_show_all(settings: &Settings) -> Result<()> {
    let store = Store::connect(&settings.database.url).await?;
    let outcome = show_all(&store, &mut io::stdout().lock()).await;
    store.close().await;
    outcome.map(|_| ())
}

/// Write one line per stored measurement; returns the number of lines.
async fn show_all(store: &Store, out: &mut impl Write) -> Result<usize> {
    let measurements = store
        .list_measurements()
        .await
        .context("Failed to read measurements. Did you run 'speed-logger create-db'?")?;

    for m in &measurements {
        let offset = report::local_offset(m.added_at);
        writeln!(out, "{}", report::format_measurement(m, offset))?;
    }
    Ok(measurements.len())
}

async fn handle_create_db(settings: &Settings) -> Result<()> {
    let store = Store::connect(&settings.database.url).await?;
    let outcome = store.initialize().await;
    store.close().await;
    outcome?;

    info!("Create Database");
    println!("Database ready: {}", settings.database.url);
    Ok(())
}
