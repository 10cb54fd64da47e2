use crate::config::ClientConfig;
use crate::error::{FairPlayError, Result};
use crate::ledger::{LedgerReader, LedgerSubmitter};
use crate::tx::{ConfirmationHandle, Receipt, SignedRequest, TxParams};
use crate::types::StorageKey;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

const COUNTER_KEY: &[u8] = b"match_counter";
const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Ledger accessor over an algod-style REST gateway.
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    app_id: u64,
}

#[derive(Debug, Deserialize)]
struct ApplicationInfo {
    params: ApplicationParams,
}

#[derive(Debug, Deserialize)]
struct ApplicationParams {
    #[serde(rename = "global-state", default)]
    global_state: Vec<GlobalStateEntry>,
}

#[derive(Debug, Deserialize)]
struct GlobalStateEntry {
    key: String,
    value: GlobalStateValue,
}

#[derive(Debug, Deserialize)]
struct GlobalStateValue {
    #[serde(default)]
    uint: u64,
}

#[derive(Debug, Deserialize)]
struct BoxResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ParamsResponse {
    #[serde(default)]
    fee: u64,
    #[serde(rename = "min-fee", default)]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
}

#[derive(Debug, Serialize)]
struct BroadcastBody<'a> {
    transactions: &'a [SignedRequest],
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct PendingResponse {
    #[serde(rename = "confirmed-round", default)]
    confirmed_round: u64,
    #[serde(rename = "pool-error", default)]
    pool_error: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpLedger {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FairPlayError::ledger(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.ledger_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            app_id: config.app_id,
        })
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_token(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.with_token(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn with_token(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    async fn error_message(response: Response) -> String {
        let status = response.status();
        match response.text().await {
            Ok(body) => serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("{}: {}", status, body)),
            Err(_) => status.to_string(),
        }
    }

    async fn expect_ok(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let message = Self::error_message(response).await;
            Err(FairPlayError::ledger(format!("{} ({})", message, status)))
        }
    }

    async fn last_round(&self) -> Result<u64> {
        let response = Self::expect_ok(self.get("/v2/status").send().await?).await?;
        Ok(response.json::<StatusResponse>().await?.last_round)
    }
}

#[async_trait]
impl LedgerReader for HttpLedger {
    async fn read_counter(&self) -> Result<u64> {
        let path = format!("/v2/applications/{}", self.app_id);
        let response = Self::expect_ok(self.get(&path).send().await?).await?;
        let info: ApplicationInfo = response.json().await?;

        // An unset counter is not reported at all; that means no match yet.
        let counter = info
            .params
            .global_state
            .iter()
            .find(|entry| {
                STANDARD
                    .decode(&entry.key)
                    .map(|key| key == COUNTER_KEY)
                    .unwrap_or(false)
            })
            .map(|entry| entry.value.uint)
            .unwrap_or(0);

        tracing::debug!("Match counter for app {} is {}", self.app_id, counter);
        Ok(counter)
    }

    async fn read_record(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        let path = format!("/v2/applications/{}/box", self.app_id);
        let name = format!("b64:{}", STANDARD.encode(key.as_bytes()));
        let response = self.get(&path).query(&[("name", name)]).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: BoxResponse = Self::expect_ok(response).await?.json().await?;
        let value = STANDARD
            .decode(&body.value)
            .map_err(|e| FairPlayError::ledger(format!("Invalid box encoding: {}", e)))?;
        Ok(Some(value))
    }

    async fn suggested_params(&self) -> Result<TxParams> {
        let response = Self::expect_ok(self.get("/v2/transactions/params").send().await?).await?;
        let params: ParamsResponse = response.json().await?;
        Ok(TxParams::from_last_round(
            params.fee.max(params.min_fee),
            params.last_round,
            params.genesis_id,
        ))
    }
}

#[async_trait]
impl LedgerSubmitter for HttpLedger {
    async fn broadcast(&self, signed: &[SignedRequest]) -> Result<ConfirmationHandle> {
        let response = self
            .post("/v2/transactions/json")
            .json(&BroadcastBody {
                transactions: signed,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FairPlayError::broadcast_rejected(
                Self::error_message(response).await,
            ));
        }

        let body: BroadcastResponse = response.json().await?;
        Ok(ConfirmationHandle {
            txid: body.tx_id,
            submitted_round: None,
        })
    }

    async fn await_confirmation(
        &self,
        handle: &ConfirmationHandle,
        max_rounds: u64,
    ) -> Result<Receipt> {
        let start = match handle.submitted_round {
            Some(round) => round,
            None => self.last_round().await?,
        } + 1;
        let mut current = start;

        while current < start + max_rounds {
            let path = format!("/v2/transactions/pending/{}", handle.txid);
            let response = Self::expect_ok(self.get(&path).send().await?).await?;
            let pending: PendingResponse = response.json().await?;

            if pending.confirmed_round > 0 {
                return Ok(Receipt {
                    txid: handle.txid.clone(),
                    confirmed_round: pending.confirmed_round,
                    group: None,
                });
            }

            if !pending.pool_error.is_empty() {
                return Err(FairPlayError::broadcast_rejected(pending.pool_error));
            }

            let wait = format!("/v2/status/wait-for-block-after/{}", current);
            Self::expect_ok(self.get(&wait).send().await?).await?;
            current += 1;
        }

        Err(FairPlayError::ConfirmationTimeout {
            txid: handle.txid.clone(),
            rounds: max_rounds,
        })
    }
}
