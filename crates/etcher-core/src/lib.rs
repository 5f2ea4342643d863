//! Core pipeline for inscribing arbitrary content onto a UTXO-based ledger:
//! script encoding ([`script`]), UTXO retrieval and selection ([`indexer`]),
//! fee-aware transaction assembly and signing ([`tx`]), ordered multi-relay
//! broadcast ([`relay`]), and sequential chaining of several inscriptions
//! within one run ([`session`]).

pub mod error;
pub mod indexer;
pub mod persist;
pub mod relay;
pub mod script;
pub mod session;
pub mod tx;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::CoreError;
pub use session::InscriptionSession;
pub use types::{BuiltTx, InscriptionItem, Keypair, Payload, SessionOutcome, Utxo};
