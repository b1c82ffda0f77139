//! retrace maintenance CLI.
//!
//! Inspects and maintains the encrypted browsing-history store from the
//! command line. Logging goes to stderr so command output stays clean on
//! stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use retrace_core::{AppConfig, History, KeyMaterial};

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "Inspect and maintain the encrypted browsing-history store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the most recently visited pages
    Recent {
        /// Maximum number of records to print
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Show the favorites view
    Favorites,
    /// Show the tabs saved by the previous session
    Tabs,
    /// Show record counts
    Stats,
    /// Bulk-delete records
    Purge {
        #[command(subcommand)]
        scope: PurgeScope,
    },
}

#[derive(Subcommand)]
enum PurgeScope {
    /// Delete everything, history and favorites alike
    All,
    /// Clear favorite flags only
    Favorites,
    /// Delete visit data only, keeping standalone favorites
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let keys = keys_from_env()?;

    let history = History::open(config, &keys).await?;
    tracing::info!("history store opened, waiting for population");
    history.wait_populated().await;

    match cli.command {
        Commands::Recent { count } => {
            for record in history.last_n_actions(count).await {
                let visited = record.last_visited.map(|ts| ts.to_rfc3339()).unwrap_or_default();
                println!("{visited}  {:>4}  {}  {}", record.visit_count, record.title, record.url);
            }
        }
        Commands::Favorites => {
            for entry in history.favorites_model().await.entries {
                println!("{}  {}", entry.title, entry.url);
            }
        }
        Commands::Tabs => {
            for tab in history.previous_session_tabs().await {
                let marker = if tab.pinned { "*" } else { " " };
                println!("{marker} {}", tab.url);
            }
        }
        Commands::Stats => {
            let stats = history.stats().await;
            println!("records:      {}", stats.records);
            println!("favorites:    {}", stats.favorites);
            println!("session tabs: {}", stats.session_tabs);
        }
        Commands::Purge { scope } => match scope {
            PurgeScope::All => history.purge_all().await?,
            PurgeScope::Favorites => history.purge_favorites().await?,
            PurgeScope::History => history.purge_history().await?,
        },
    }

    history.shutdown().await;
    Ok(())
}

/// Read hex-encoded key material from the environment.
fn keys_from_env() -> Result<KeyMaterial> {
    let auth = hex::decode(
        std::env::var("RETRACE_AUTH_KEY").context("RETRACE_AUTH_KEY not set (hex-encoded authentication key)")?,
    )
    .context("RETRACE_AUTH_KEY is not valid hex")?;
    let enc = hex::decode(
        std::env::var("RETRACE_ENC_KEY").context("RETRACE_ENC_KEY not set (hex-encoded encryption key)")?,
    )
    .context("RETRACE_ENC_KEY is not valid hex")?;
    Ok(KeyMaterial::new(auth, enc))
}
