//! Transaction broadcast with ordered multi-relay fallback.
//!
//! A [`Broadcaster`] holds a fixed, ordered list of [`Relay`] endpoints and
//! tries each strictly in order: no per-relay retry, no backoff between
//! relays. The first success wins; if every relay fails, the aggregate error
//! carries each relay's captured failure text in attempt order.
//!
//! The default mainnet chain mirrors the indexer's operator first (text
//! endpoint, hex body) and falls back to two ARC services (binary body,
//! JSON response).

use std::time::Duration;

use async_trait::async_trait;
use bitcoin::hex::DisplayHex;
use tracing::{debug, warn};

use crate::error::{CoreError, RelayFailure};

/// Default bound on each relay round trip.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(30);

/// WhatsOnChain mainnet raw-tx submission endpoint (text protocol).
pub const WOC_BROADCAST_URL: &str = "https://api.whatsonchain.com/v1/bsv/main/tx/raw";
/// GorillaPool ARC submission endpoint (binary protocol).
pub const GORILLAPOOL_ARC_URL: &str = "https://arc.gorillapool.io/v1/tx";
/// TAAL ARC submission endpoint (binary protocol).
pub const TAAL_ARC_URL: &str = "https://arc.taal.com/v1/tx";

/// A single relay endpoint's failure.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One network relay accepting a signed raw transaction.
#[async_trait]
pub trait Relay: Send + Sync {
    fn name(&self) -> &str;

    /// Submit the raw transaction, returning the relay's reported txid.
    async fn submit(&self, raw_tx: &[u8]) -> Result<String, RelayError>;
}

/// The seam the session broadcasts through; implemented by [`Broadcaster`]
/// and mocked in tests.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, CoreError>;
}

// ==============================================================================
// Broadcaster
// ==============================================================================

/// Ordered fallback chain over relay endpoints.
pub struct Broadcaster {
    relays: Vec<Box<dyn Relay>>,
}

impl Broadcaster {
    pub fn new(relays: Vec<Box<dyn Relay>>) -> Result<Self, CoreError> {
        if relays.is_empty() {
            return Err(CoreError::Validation("relay list is empty".into()));
        }
        Ok(Self { relays })
    }

    /// The default mainnet chain: WhatsOnChain, then GorillaPool ARC, then
    /// TAAL ARC.
    pub fn mainnet() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_BROADCAST_TIMEOUT)
            .build()
            .expect("reqwest client builder uses valid static config");
        let relays: Vec<Box<dyn Relay>> = vec![
            Box::new(TextRelay::new("whatsonchain", WOC_BROADCAST_URL, client.clone())),
            Box::new(ArcRelay::new(
                "arc-gorillapool",
                GORILLAPOOL_ARC_URL,
                client.clone(),
            )),
            Box::new(ArcRelay::new("arc-taal", TAAL_ARC_URL, client)),
        ];
        Self { relays }
    }
}

#[async_trait]
impl TxBroadcaster for Broadcaster {
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, CoreError> {
        let mut failures = Vec::new();

        for relay in &self.relays {
            match relay.submit(raw_tx).await {
                Ok(txid) => {
                    debug!(relay = relay.name(), %txid, "broadcast accepted");
                    return Ok(txid);
                }
                Err(err) => {
                    warn!(relay = relay.name(), error = %err, "broadcast rejected, trying next relay");
                    failures.push(RelayFailure {
                        relay: relay.name().to_owned(),
                        detail: err.to_string(),
                    });
                }
            }
        }

        Err(CoreError::BroadcastFailed(failures))
    }
}

// ==============================================================================
// HTTP Relay Implementations
// ==============================================================================

/// Strip quoting and whitespace from a relay-reported txid.
fn clean_txid(raw: &str) -> String {
    raw.replace('"', "").trim().to_owned()
}

/// Text-protocol relay: accepts hex-encoded transactions as JSON and returns
/// a plain-text txid that may be quoted.
pub struct TextRelay {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl TextRelay {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Relay for TextRelay {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<String, RelayError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "txhex": raw_tx.to_lower_hex_string() }))
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(clean_txid(&body))
    }
}

/// Binary-protocol relay (ARC): accepts raw transaction bytes and returns a
/// structured response with a `txid` field.
pub struct ArcRelay {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl ArcRelay {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Relay for ArcRelay {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<String, RelayError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(raw_tx.to_vec())
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| RelayError::InvalidResponse(format!("decode arc response: {e}")))?;
        let txid = decoded
            .get("txid")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                RelayError::InvalidResponse(format!("arc response missing txid: {body}"))
            })?;

        Ok(clean_txid(txid))
    }
}
