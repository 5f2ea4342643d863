//! Persistence collaborator seam.
//!
//! The session hands an [`InscriptionRecord`] to an injected
//! [`InscriptionStore`] after each successful broadcast. The context object
//! is constructed once by the caller and passed in explicitly; there is no
//! process-wide lazily-initialized client. Store failures are non-fatal: the
//! on-chain action already succeeded, so they are logged and swallowed,
//! never rolled back.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash};
use tokio::sync::Mutex;

use crate::types::InscriptionRecord;

/// Failure to persist a record. Converted to a logged warning at the session
/// boundary, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("persistence store unavailable: {0}")]
pub struct StoreError(pub String);

#[async_trait]
pub trait InscriptionStore: Send + Sync {
    async fn record(&self, record: &InscriptionRecord) -> Result<(), StoreError>;
}

/// Lowercase hex sha256 of the inscribed content, used to fill records.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    sha256::Hash::hash(bytes).to_string()
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-memory store, useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<InscriptionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<InscriptionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl InscriptionStore for MemoryStore {
    async fn record(&self, record: &InscriptionRecord) -> Result<(), StoreError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
