use crate::error::{FairPlayError, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub ledger_url: String,
    pub api_token: Option<String>,
    pub app_id: u64,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub max_confirmation_rounds: u64,
    /// Overrides the application address derived from `app_id`.
    pub protocol_address: Option<Address>,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ledger_url: "http://localhost:4001".to_string(),
            api_token: None,
            app_id: 0,
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(3),
            max_confirmation_rounds: 4,
            protocol_address: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new(ledger_url: impl Into<String>, app_id: u64) -> Self {
        Self {
            ledger_url: ledger_url.into(),
            app_id,
            ..Self::default()
        }
    }

    /// Local sandbox node with its well-known API token.
    pub fn localnet(app_id: u64) -> Self {
        let mut config = Self::new("http://localhost:4001", app_id);
        config.api_token = Some("a".repeat(64));
        config
    }

    pub fn testnet(app_id: u64) -> Self {
        Self::new("https://testnet-api.algonode.cloud", app_id)
    }

    /// The address the ledger reports as winner on a draw.
    pub fn protocol_address(&self) -> Address {
        self.protocol_address
            .unwrap_or_else(|| Address::for_application(self.app_id))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger_url.is_empty() {
            return Err(FairPlayError::config("Ledger URL cannot be empty"));
        }

        if self.app_id == 0 {
            return Err(FairPlayError::config("App ID must be set"));
        }

        if self.poll_interval.is_zero() {
            return Err(FairPlayError::config("Poll interval must be greater than 0"));
        }

        if self.max_confirmation_rounds == 0 {
            return Err(FairPlayError::config(
                "Max confirmation rounds must be greater than 0",
            ));
        }

        Ok(())
    }
}
