//! Indexer query abstraction: unspent-output retrieval and selection.
//!
//! Defines the [`UtxoIndexer`] trait and provides a WhatsOnChain HTTP
//! implementation ([`WocIndexer`]). Raw indexer rows are decoded into the
//! strict [`Utxo`] type at this boundary; externally-shaped data never flows
//! past it unchecked.

use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{Address, Amount, Txid};
use serde::Deserialize;
use tracing::debug;

use crate::error::CoreError;
use crate::types::Utxo;

/// Default bound on each indexer round trip.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// WhatsOnChain mainnet REST base URL.
pub const WOC_MAINNET_URL: &str = "https://api.whatsonchain.com/v1/bsv/main";

/// Source of spendable outputs for an address.
///
/// Implementations must return results sorted descending by value
/// (largest-first) so that selection can take the first eligible entry.
#[async_trait]
pub trait UtxoIndexer: Send + Sync {
    async fn unspent_outputs(&self, address: &Address) -> Result<Vec<Utxo>, CoreError>;
}

/// Pick one spendable output for `address` holding at least `min_value` sats,
/// skipping any txid in `exclude` (e.g. unconfirmed change already committed
/// to another chain of transactions). Returns the largest eligible entry.
pub async fn select_utxo<I: UtxoIndexer + ?Sized>(
    indexer: &I,
    address: &Address,
    min_value: u64,
    exclude: &[Txid],
) -> Result<Utxo, CoreError> {
    let utxos = indexer.unspent_outputs(address).await?;
    let found = utxos.len();

    utxos
        .into_iter()
        .find(|u| u.value.to_sat() >= min_value && !exclude.contains(&u.txid))
        .ok_or(CoreError::InsufficientFunds { found, min_value })
}

// ==============================================================================
// WhatsOnChain HTTP Implementation
// ==============================================================================

/// Raw unspent-output row as returned by the WhatsOnChain API.
#[derive(Debug, Deserialize)]
struct WocUnspent {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

/// WhatsOnChain REST client.
pub struct WocIndexer {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl WocIndexer {
    pub fn mainnet() -> Self {
        Self::new(WOC_MAINNET_URL, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder uses valid static config");
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> CoreError {
        if err.is_timeout() {
            CoreError::Timeout(self.timeout)
        } else {
            CoreError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl UtxoIndexer for WocIndexer {
    async fn unspent_outputs(&self, address: &Address) -> Result<Vec<Utxo>, CoreError> {
        let url = format!("{}/address/{}/unspent", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;
        debug!(%address, %status, body_len = body.len(), "indexer unspent response");

        if !status.is_success() {
            return Err(CoreError::Transport(format!(
                "indexer returned {status}: {body}"
            )));
        }

        let rows: Vec<WocUnspent> = serde_json::from_str(&body).map_err(|e| {
            CoreError::InvalidIndexerData(format!("decode unspent response: {e}; body={body}"))
        })?;

        let utxos = decode_unspent(rows, address)?;
        debug!(%address, count = utxos.len(), "fetched unspent outputs");
        Ok(utxos)
    }
}

/// Decode raw indexer rows into strict `Utxo` values, sorted descending by
/// value (largest-first). Every output at the queried address is guarded by
/// the same standard pay-to-address script.
fn decode_unspent(rows: Vec<WocUnspent>, address: &Address) -> Result<Vec<Utxo>, CoreError> {
    let script_pubkey = address.script_pubkey();

    let mut utxos = rows
        .into_iter()
        .map(|row| {
            let txid: Txid = row.tx_hash.parse().map_err(|e| {
                CoreError::InvalidIndexerData(format!("invalid txid {:?}: {e}", row.tx_hash))
            })?;
            Ok(Utxo {
                txid,
                vout: row.tx_pos,
                value: Amount::from_sat(row.value),
                script_pubkey: script_pubkey.clone(),
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    utxos.sort_by(|a, b| b.value.cmp(&a.value));
    Ok(utxos)
}
