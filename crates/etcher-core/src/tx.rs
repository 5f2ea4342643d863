//! Transaction assembly, fee computation, and signing.
//!
//! Builds a single-input transaction carrying a zero-value data output plus
//! an optional change output back to the signer. The fee/solvency invariant
//! is enforced before anything is constructed: a transaction with negative
//! change is never built, not even transiently.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use tracing::debug;

use crate::error::CoreError;
use crate::types::{BuiltTx, Keypair, Utxo};

/// Default fee rate in sats per estimated byte.
pub const DEFAULT_FEE_RATE: f64 = 0.5;

/// Payload size assumed when the caller provides no hint.
const FALLBACK_PAYLOAD_ESTIMATE: usize = 500;
/// Fixed overhead for headers, input, and signature bytes.
const TX_OVERHEAD_BYTES: usize = 200;
/// Floor on the computed fee, in sats.
const MIN_FEE: u64 = 500;

/// Sighash type required by the ledger's replay-protection rules:
/// SIGHASH_ALL with the FORKID flag.
const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Compute the fee for a payload of the given estimated size.
/// Monotonic in `payload_size_hint` and never below [`MIN_FEE`].
#[must_use]
pub fn estimate_fee(payload_size_hint: usize, fee_rate: f64) -> u64 {
    let payload = if payload_size_hint > 0 {
        payload_size_hint
    } else {
        FALLBACK_PAYLOAD_ESTIMATE
    };
    let estimated_size = payload + TX_OVERHEAD_BYTES;
    let fee = (estimated_size as f64 * fee_rate).ceil() as u64;
    fee.max(MIN_FEE)
}

/// Build and sign a transaction spending `utxo` into a zero-value data
/// output plus, when change remains, a pay-to-address change output for the
/// signer.
///
/// The input is constructed exactly once from `(utxo.txid, utxo.vout)` and
/// never mutated afterwards; the sighash is computed against the UTXO's own
/// locking script and declared value. If the UTXO cannot cover the computed
/// fee, this fails before any transaction state exists.
pub fn build_inscription_tx(
    signer: &Keypair,
    utxo: &Utxo,
    data_script: ScriptBuf,
    fee_rate: f64,
    payload_size_hint: usize,
) -> Result<BuiltTx, CoreError> {
    let fee = estimate_fee(payload_size_hint, fee_rate);
    let available = utxo.value.to_sat();
    if available < fee {
        return Err(CoreError::InsufficientFundsForFee { fee, available });
    }
    let change = available - fee;

    // Single immutable construction step: outpoint, placeholder unlock, and
    // final sequence, bound together once. Nothing below touches the
    // referenced txid again.
    let input = TxIn {
        previous_output: OutPoint::new(utxo.txid, utxo.vout),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::default(),
    };

    let mut outputs = vec![TxOut {
        value: Amount::ZERO,
        script_pubkey: data_script,
    }];
    if change > 0 {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: signer.p2pkh_script(),
        });
    }

    let mut tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![input],
        output: outputs,
    };

    // Sign with all outputs committed.
    let digest = forkid_sighash(&tx, 0, &utxo.script_pubkey, utxo.value);
    let signature = signer.sign_digest(digest);

    let mut sig_with_type = signature.serialize_der().to_vec();
    sig_with_type.push(SIGHASH_ALL_FORKID as u8);

    tx.input[0].script_sig = Builder::new()
        .push_slice(unlock_push(sig_with_type)?)
        .push_slice(unlock_push(signer.public_key().to_bytes())?)
        .into_script();

    let txid = tx.compute_txid();
    debug!(%txid, fee, change, size = serialize(&tx).len(), "built inscription tx");

    Ok(BuiltTx {
        tx,
        txid,
        fee,
        change,
    })
}

fn unlock_push(data: Vec<u8>) -> Result<PushBytesBuf, CoreError> {
    PushBytesBuf::try_from(data)
        .map_err(|_| CoreError::Signing("unlock segment exceeds maximum push size".into()))
}

/// BIP143-style signature hash with the FORKID flag, over the spent output's
/// locking script and declared value.
fn forkid_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &ScriptBuf,
    value: Amount,
) -> [u8; 32] {
    let mut prevouts = Vec::new();
    let mut sequences = Vec::new();
    for input in &tx.input {
        prevouts.extend_from_slice(&serialize(&input.previous_output));
        sequences.extend_from_slice(&input.sequence.0.to_le_bytes());
    }
    let hash_prevouts = sha256d::Hash::hash(&prevouts);
    let hash_sequence = sha256d::Hash::hash(&sequences);

    let mut outputs = Vec::new();
    for output in &tx.output {
        outputs.extend_from_slice(&serialize(output));
    }
    let hash_outputs = sha256d::Hash::hash(&outputs);

    let input = &tx.input[input_index];
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(hash_prevouts.as_byte_array());
    preimage.extend_from_slice(hash_sequence.as_byte_array());
    preimage.extend_from_slice(&serialize(&input.previous_output));
    preimage.extend_from_slice(&serialize(script_code));
    preimage.extend_from_slice(&value.to_sat().to_le_bytes());
    preimage.extend_from_slice(&input.sequence.0.to_le_bytes());
    preimage.extend_from_slice(hash_outputs.as_byte_array());
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());

    sha256d::Hash::hash(&preimage).to_byte_array()
}
