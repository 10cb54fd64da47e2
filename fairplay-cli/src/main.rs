mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::{CliPaths, Overrides};
use fairplay_core::FairPlayError;
use fairplay_match::MatchError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fairplay")]
#[command(about = "FairPlay - commit-reveal Rock/Paper/Scissors matches on a ledger application")]
#[command(version)]
struct Cli {
    /// Data directory for key, config and history
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Application id, overrides config.json
    #[arg(long, global = true)]
    app_id: Option<u64>,

    /// Ledger URL, overrides config.json
    #[arg(long, global = true)]
    ledger_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key management commands
    #[command(subcommand)]
    Key(commands::KeyCommands),

    /// Client configuration commands
    #[command(subcommand)]
    Config(commands::ConfigCommands),

    /// Create a match, wait for an opponent and play it
    Create {
        /// Wager amount
        wager: u64,
        /// Move to play (Rock, Paper, Scissors); prompts if absent
        #[arg(short, long)]
        r#move: Option<String>,
    },

    /// Join an open match and play it
    Join {
        /// Match ID to join
        match_id: String,
        /// Move to play (Rock, Paper, Scissors); prompts if absent
        #[arg(short, long)]
        r#move: Option<String>,
    },

    /// Create and play several matches back to back
    Play {
        /// Wager amount per round
        wager: u64,
        /// Number of rounds
        #[arg(short, long, default_value_t = 1)]
        rounds: u32,
        /// Move to play every round; prompts if absent
        #[arg(short, long)]
        r#move: Option<String>,
    },

    /// Show the on-ledger record of a match
    Status {
        /// Match ID
        match_id: String,
    },

    /// Show settled rounds
    History {
        /// Number of rounds to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "fairplay={},fairplay_core={},fairplay_match={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let paths = CliPaths::new(cli.data_dir);
    tokio::fs::create_dir_all(&paths.data_dir).await?;

    let overrides = Overrides {
        app_id: cli.app_id,
        ledger_url: cli.ledger_url,
    };

    // Execute command
    let result = match cli.command {
        Commands::Key(cmd) => commands::handle_key_command(cmd, &paths),
        Commands::Config(cmd) => commands::handle_config_command(cmd, &paths, &overrides),
        Commands::Create { wager, r#move } => {
            commands::create_match(&paths, &overrides, wager, r#move).await
        }
        Commands::Join { match_id, r#move } => {
            commands::join_match(&paths, &overrides, &match_id, r#move).await
        }
        Commands::Play {
            wager,
            rounds,
            r#move,
        } => commands::play_rounds(&paths, &overrides, wager, rounds, r#move).await,
        Commands::Status { match_id } => commands::show_status(&paths, &overrides, &match_id).await,
        Commands::History { limit } => commands::show_history(&paths, limit).await,
    };

    if let Err(e) = result {
        match e.downcast_ref::<MatchError>() {
            Some(MatchError::Core(FairPlayError::SigningRejected(reason))) => {
                eprintln!("Error: Signing was declined: {}", reason);
            }
            Some(MatchError::PredictionRace { predicted, counter }) => {
                eprintln!("Error: Could not confirm which match was created");
                eprintln!(
                    "Match {} belongs to someone else and none up to {} is yours",
                    predicted, counter
                );
            }
            Some(MatchError::Core(FairPlayError::InvalidMatchId(id))) => {
                eprintln!("Error: Invalid match id: {}", id);
            }
            _ => {
                eprintln!("Error: {:#}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
