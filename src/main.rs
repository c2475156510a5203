// Warden - Main Entry Point
//
// - CLI interface
// - Configuration and logging setup
// - Database bootstrap
// - HTTP server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use warden::config::{Config, DEFAULT_CONFIG_FILE};
use warden::guards::{CommandAuthorizer, PathConfinementGuard};
use warden::server::{self, AppState};
use warden::{logging, store};

/// Warden: guarded command, file and lookup service
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version)]
#[command(about = "HTTP service with boundary guards on privileged operations", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Check a command line against the whitelist
    CheckCommand {
        /// Command line as it would appear in `cmd=`
        cmd: String,
    },
    /// Check a file name against the upload root
    CheckPath {
        /// File name as it would appear in `file=`
        name: String,
    },
    /// Create the users table and seed demo rows
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    logging::init(&config.logging, args.verbose)?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::CheckCommand { cmd } => check_command(&config, &cmd),
        Commands::CheckPath { name } => check_path(&config, &name),
        Commands::InitDb => init_db(&config),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Warden v{} starting...", env!("CARGO_PKG_VERSION"));

    prepare_upload_dir(&config)?;
    init_db(&config)?;

    if !config.api_key.is_set() {
        tracing::warn!("API_KEY is not set; /run will reject every request");
    }

    let state = AppState::from_config(&config).context("Failed to build application state")?;
    server::serve(&config, Arc::new(state)).await
}

fn prepare_upload_dir(config: &Config) -> Result<()> {
    let dir = &config.files.upload_dir;
    if !dir.exists() && config.files.create_if_missing {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create upload directory {:?}", dir))?;
        info!("Created upload directory {:?}", dir);
    }
    Ok(())
}

fn init_db(config: &Config) -> Result<()> {
    store::bootstrap(&config.database.path, config.database.seed_demo_users)
        .with_context(|| format!("Failed to bootstrap database {:?}", config.database.path))?;
    info!("Database ready at {:?}", config.database.path);
    Ok(())
}

fn check_command(config: &Config, cmd: &str) -> Result<()> {
    let authorizer = CommandAuthorizer::new(Arc::new(config.command_table()?));
    let verdict = match authorizer.authorize(cmd) {
        Ok(line) => json!({ "allowed": true, "argv": line.tokens() }),
        Err(e) => json!({ "allowed": false, "error": e.code(), "token": e.token() }),
    };
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn check_path(config: &Config, name: &str) -> Result<()> {
    let guard = PathConfinementGuard::new(&config.files.upload_dir).with_context(|| {
        format!(
            "Failed to open upload directory {:?}",
            config.files.upload_dir
        )
    })?;
    let verdict = match guard.confine(name) {
        Ok(path) => json!({ "allowed": true, "path": path.as_path().display().to_string() }),
        Err(e) => json!({ "allowed": false, "error": e.code() }),
    };
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
