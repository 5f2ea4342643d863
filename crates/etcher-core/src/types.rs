//! Domain types for the inscription pipeline.
//!
//! Contains the spendable-output model (`Utxo`), the signing identity
//! (`Keypair`), the payload variants (`Payload`, `InscriptionItem`), the
//! signed-transaction result (`BuiltTx`), and the session outcome types.

use bitcoin::consensus::encode::{serialize, serialize_hex};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::{Address, Amount, Network, PrivateKey, PublicKey, ScriptBuf, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ==============================================================================
// UTXO
// ==============================================================================

/// An unspent transaction output: a discrete spendable amount identified by
/// `(txid, vout)`, carrying its value and the locking script that guards it.
///
/// Immutable once constructed. Produced either by the indexer boundary
/// (`indexer::WocIndexer`) or as the change output of a prior
/// [`BuiltTx`](crate::types::BuiltTx); consumed exactly once as an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: Amount,
    /// The locking script of this output. Signature-hash computation must see
    /// the exact script and value being spent, so it travels with the outpoint.
    pub script_pubkey: ScriptBuf,
}

// ==============================================================================
// Keypair
// ==============================================================================

/// A secp256k1 signing identity: private scalar, derived compressed public
/// key, and the legacy base58 pay-to-pubkey-hash address.
///
/// Owned by the caller and passed by reference into signing operations; the
/// core never persists it. `Debug` prints only the derived address.
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
    address: Address,
}

impl Keypair {
    /// Build a keypair from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CoreError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CoreError::Validation(format!("invalid secret key: {e}")))?;
        Ok(Self::from_secret(secret))
    }

    /// Build a keypair from a WIF-encoded private key, the form keys are
    /// typically supplied in (env var, file, or flag — upstream's choice).
    pub fn from_wif(wif: &str) -> Result<Self, CoreError> {
        let key = PrivateKey::from_wif(wif)
            .map_err(|e| CoreError::Validation(format!("invalid WIF key: {e}")))?;
        Ok(Self::from_secret(key.inner))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public = PublicKey::new(secret.public_key(&secp));
        let address = Address::p2pkh(&public, Network::Bitcoin);
        Self {
            secret,
            public,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The standard pay-to-address locking script for this keypair.
    #[must_use]
    pub fn p2pkh_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pkh(&self.public.pubkey_hash())
    }

    /// Sign a 32-byte digest. Deterministic (RFC 6979 nonces, low-S form),
    /// so identical inputs always produce identical signatures.
    pub(crate) fn sign_digest(&self, digest: [u8; 32]) -> Signature {
        let secp = Secp256k1::signing_only();
        secp.sign_ecdsa(&Message::from_digest(digest), &self.secret)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// ==============================================================================
// Payload
// ==============================================================================

/// Content to inscribe, in one of the two supported on-chain formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bare format: protocol tag + content type + raw bytes.
    Simple {
        protocol_tag: String,
        content_type: String,
        body: Vec<u8>,
    },
    /// Bitcoin Schema format: B (content) + MAP (metadata) and, when
    /// `signed`, an AIP authorship proof from the session keypair.
    ///
    /// `metadata` is an ordered list of unique keys; insertion order is
    /// significant because indexing consumers depend on positional order.
    Schema {
        content: String,
        content_type: String,
        metadata: Vec<(String, String)>,
        signed: bool,
    },
}

impl Payload {
    /// The raw content bytes, used for size estimation and content hashing.
    pub fn content_bytes(&self) -> &[u8] {
        match self {
            Payload::Simple { body, .. } => body,
            Payload::Schema { content, .. } => content.as_bytes(),
        }
    }
}

/// One unit of work for a session: a label (file name or similar identifier,
/// used in the persistence record) plus the payload to inscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InscriptionItem {
    pub label: String,
    pub payload: Payload,
}

// ==============================================================================
// Built Transaction
// ==============================================================================

/// A fully built and signed transaction ready for broadcast.
///
/// Invariants: exactly one input; output 0 is the data-carrying script with
/// zero value; output 1 is the change output, present iff `change > 0`; and
/// `input value == fee + change`.
#[derive(Debug, Clone)]
pub struct BuiltTx {
    pub tx: Transaction,
    pub txid: Txid,
    /// Fee paid, in sats.
    pub fee: u64,
    /// Value returned to the signer, in sats. Zero means no change output.
    pub change: u64,
}

impl BuiltTx {
    /// Serialized transaction bytes (legacy wire format).
    #[must_use]
    pub fn raw_bytes(&self) -> Vec<u8> {
        serialize(&self.tx)
    }

    /// Serialized transaction as lowercase hex.
    #[must_use]
    pub fn raw_hex(&self) -> String {
        serialize_hex(&self.tx)
    }
}

// ==============================================================================
// Session Results
// ==============================================================================

/// Per-item result, in the same order as the input items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub label: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Inscribed { txid: Txid },
    Failed { error: String },
}

impl ItemStatus {
    pub fn is_inscribed(&self) -> bool {
        matches!(self, ItemStatus::Inscribed { .. })
    }
}

/// Aggregate outcome of a session run. Item order is preserved for both
/// successes and failures.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub results: Vec<ItemResult>,
    /// Total fees paid across succeeded items, in sats.
    pub total_fee: u64,
    pub failed: usize,
}

impl SessionOutcome {
    pub fn inscribed(&self) -> usize {
        self.results.len() - self.failed
    }
}

/// The record handed to the persistence collaborator after each successful
/// inscription. The core only produces this shape; storage, retries, and
/// schema belong to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionRecord {
    pub label: String,
    /// Lowercase hex sha256 of the inscribed content bytes.
    pub content_hash: String,
    pub txid: Txid,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
}
