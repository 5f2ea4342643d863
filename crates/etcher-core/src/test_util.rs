//! Shared test helpers for `etcher-core` unit tests.
//!
//! Consolidates builders for dummy keys, txids, UTXOs, and inscription items
//! so that tests across modules share a single source of truth for test data.

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Txid};

use crate::types::{InscriptionItem, Keypair, Payload, Utxo};

/// Initialize tracing for a test. Safe to call from every test; only the
/// first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fixed, valid signing key for tests.
pub fn test_keypair() -> Keypair {
    Keypair::from_secret_bytes(&[0x42; 32]).expect("static test key is a valid scalar")
}

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

/// A UTXO at the test keypair's address with the given value.
pub fn utxo_with(b: u8, sats: u64) -> Utxo {
    Utxo {
        txid: txid_from_byte(b),
        vout: 0,
        value: Amount::from_sat(sats),
        script_pubkey: test_keypair().p2pkh_script(),
    }
}

/// A simple-format inscription item with fixed tag and content type.
pub fn simple_item(label: &str, body: &[u8]) -> InscriptionItem {
    InscriptionItem {
        label: label.to_owned(),
        payload: Payload::Simple {
            protocol_tag: "demo".to_owned(),
            content_type: "text/plain".to_owned(),
            body: body.to_vec(),
        },
    }
}
