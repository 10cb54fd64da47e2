use crate::config::{load_client_config, CliPaths, Overrides};
use anyhow::Result;
use clap::Subcommand;
use fairplay_core::ClientConfig;
use std::time::Duration;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write config.json for a deployed application
    Init {
        /// Application id of the match contract
        #[arg(long)]
        app_id: u64,
        /// Network preset (localnet, testnet)
        #[arg(short, long, default_value = "localnet")]
        network: String,
        /// Ledger URL, overrides the preset
        #[arg(long)]
        ledger_url: Option<String>,
        /// API token, overrides the preset
        #[arg(long)]
        api_token: Option<String>,
        /// Opponent poll interval in seconds
        #[arg(long)]
        poll_secs: Option<u64>,
    },
    /// Print the effective configuration
    Show,
}

pub fn handle_config_command(
    cmd: ConfigCommands,
    paths: &CliPaths,
    overrides: &Overrides,
) -> Result<()> {
    match cmd {
        ConfigCommands::Init {
            app_id,
            network,
            ledger_url,
            api_token,
            poll_secs,
        } => {
            let mut config = match network.to_lowercase().as_str() {
                "localnet" => ClientConfig::localnet(app_id),
                "testnet" => ClientConfig::testnet(app_id),
                other => anyhow::bail!(
                    "Invalid network: {}. Supported networks: localnet, testnet",
                    other
                ),
            };
            if let Some(url) = ledger_url {
                config.ledger_url = url;
            }
            if api_token.is_some() {
                config.api_token = api_token;
            }
            if let Some(secs) = poll_secs {
                config.poll_interval = Duration::from_secs(secs);
            }

            config.validate()?;
            config.save(&paths.config_file())?;
            println!("Configuration written to {}", paths.config_file().display());
        }

        ConfigCommands::Show => {
            let config = load_client_config(paths, overrides)?;
            println!("Ledger URL: {}", config.ledger_url);
            println!("App ID: {}", config.app_id);
            println!("Protocol address: {}", config.protocol_address());
            println!("Poll interval: {:?}", config.poll_interval);
            println!("Settle delay: {:?}", config.settle_delay);
            println!("Max confirmation rounds: {}", config.max_confirmation_rounds);
        }
    }

    Ok(())
}
