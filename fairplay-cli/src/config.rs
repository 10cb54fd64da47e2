use anyhow::{Context, Result};
use fairplay_core::ClientConfig;
use std::path::PathBuf;

/// Files the CLI keeps in its data directory.
#[derive(Debug, Clone)]
pub struct CliPaths {
    pub data_dir: PathBuf,
}

impl CliPaths {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("fairplay")
            }),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn key_file(&self) -> PathBuf {
        self.data_dir.join("mnemonic")
    }

    pub fn history_db(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }
}

/// Command-line overrides applied on top of `config.json`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub app_id: Option<u64>,
    pub ledger_url: Option<String>,
}

pub fn load_client_config(paths: &CliPaths, overrides: &Overrides) -> Result<ClientConfig> {
    let path = paths.config_file();
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        ClientConfig::default()
    };

    if let Some(app_id) = overrides.app_id {
        config.app_id = app_id;
    }
    if let Some(url) = &overrides.ledger_url {
        config.ledger_url = url.clone();
    }

    config
        .validate()
        .context("Invalid configuration; run 'fairplay config init --app-id <ID>' first")?;
    Ok(config)
}
