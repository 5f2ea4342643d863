//! Sequential inscription chaining.
//!
//! A session inscribes an ordered list of items, spending the change output
//! of each broadcast transaction as the input of the next — an intentional
//! dependency on unconfirmed parents, since sequential inscriptions must
//! chain within one run. Execution is strictly sequential: each step's input
//! may be the unconfirmed output of the immediately preceding step, so
//! concurrent or reordered execution would double-spend or reference a
//! non-existent output.
//!
//! Known limitation: if an external wallet spends the starting UTXO while a
//! session is running, the whole chain becomes invalid. The session does not
//! attempt to detect or recover from this.

use std::time::Duration;

use bitcoin::Amount;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::persist::{content_hash, unix_timestamp, InscriptionStore};
use crate::relay::TxBroadcaster;
use crate::types::{
    BuiltTx, InscriptionItem, InscriptionRecord, ItemResult, ItemStatus, Keypair, SessionOutcome,
    Utxo,
};
use crate::{script, tx};

/// Default pause between successful items; a heuristic mitigation against
/// same-block propagation collisions, not a synchronization primitive.
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(500);

/// Runs a sequence of inscriptions against one broadcaster, threading the
/// change output forward between items.
pub struct InscriptionSession<'a, B: TxBroadcaster + ?Sized> {
    broadcaster: &'a B,
    store: Option<&'a dyn InscriptionStore>,
    fee_rate: f64,
    item_delay: Duration,
}

impl<'a, B: TxBroadcaster + ?Sized> InscriptionSession<'a, B> {
    pub fn new(broadcaster: &'a B) -> Self {
        Self {
            broadcaster,
            store: None,
            fee_rate: tx::DEFAULT_FEE_RATE,
            item_delay: DEFAULT_ITEM_DELAY,
        }
    }

    /// Attach a persistence collaborator. Each successful inscription emits
    /// one record; store failures are logged and swallowed.
    pub fn with_store(mut self, store: &'a dyn InscriptionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    /// Inscribe `items` in order, starting from `starting_utxo`.
    ///
    /// Per-item failures (fee insolvency, timeout, broadcast rejection) are
    /// recorded and do not advance the chain; the session continues with the
    /// next item against the same UTXO. Pre-flight validation failures abort
    /// the whole run before any network call.
    pub async fn run(
        &self,
        items: &[InscriptionItem],
        starting_utxo: Utxo,
        signer: &Keypair,
    ) -> Result<SessionOutcome, CoreError> {
        if items.is_empty() {
            return Err(CoreError::Validation("inscription item list is empty".into()));
        }

        info!(
            items = items.len(),
            address = %signer.address(),
            starting_value = starting_utxo.value.to_sat(),
            "starting inscription session"
        );

        let mut current = starting_utxo;
        let mut results = Vec::with_capacity(items.len());
        let mut total_fee = 0u64;
        let mut failed = 0usize;
        let last = items.len() - 1;

        for (index, item) in items.iter().enumerate() {
            match self.inscribe(item, &current, signer).await {
                Ok(built) => {
                    info!(
                        label = %item.label,
                        txid = %built.txid,
                        fee = built.fee,
                        remaining = built.change,
                        "inscription broadcast"
                    );
                    total_fee += built.fee;
                    self.persist(item, &built).await;

                    // Advance the chain to the just-produced change output.
                    // A change of zero leaves nothing spendable; the next
                    // build then fails before constructing anything.
                    current = Utxo {
                        txid: built.txid,
                        vout: 1,
                        value: Amount::from_sat(built.change),
                        script_pubkey: signer.p2pkh_script(),
                    };
                    results.push(ItemResult {
                        label: item.label.clone(),
                        status: ItemStatus::Inscribed { txid: built.txid },
                    });

                    if index < last && !self.item_delay.is_zero() {
                        sleep(self.item_delay).await;
                    }
                }
                Err(err) => {
                    warn!(label = %item.label, error = %err, "inscription failed; chain not advanced");
                    failed += 1;
                    results.push(ItemResult {
                        label: item.label.clone(),
                        status: ItemStatus::Failed {
                            error: err.to_string(),
                        },
                    });
                }
            }
        }

        Ok(SessionOutcome {
            results,
            total_fee,
            failed,
        })
    }

    async fn inscribe(
        &self,
        item: &InscriptionItem,
        utxo: &Utxo,
        signer: &Keypair,
    ) -> Result<BuiltTx, CoreError> {
        let data_script = script::build_payload_script(&item.payload, signer)?;
        let size_hint = item.payload.content_bytes().len();
        let built = tx::build_inscription_tx(signer, utxo, data_script, self.fee_rate, size_hint)?;
        let reported = self.broadcaster.broadcast(&built.raw_bytes()).await?;
        debug!(label = %item.label, %reported, "relay accepted transaction");
        Ok(built)
    }

    async fn persist(&self, item: &InscriptionItem, built: &BuiltTx) {
        let Some(store) = self.store else { return };
        let record = InscriptionRecord {
            label: item.label.clone(),
            content_hash: content_hash(item.payload.content_bytes()),
            txid: built.txid,
            timestamp: unix_timestamp(),
        };
        if let Err(err) = store.record(&record).await {
            // The transaction is already on the network; drop the record.
            warn!(label = %item.label, error = %err, "persistence store unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayFailure;
    use crate::persist::{MemoryStore, StoreError};
    use crate::test_util::{simple_item, test_keypair, utxo_with};
    use async_trait::async_trait;
    use bitcoin::consensus::encode::deserialize;
    use bitcoin::Transaction;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Broadcaster with scripted per-call outcomes; captures every raw
    /// transaction it is handed.
    struct ScriptedBroadcaster {
        outcomes: Mutex<VecDeque<Result<String, String>>>,
        captured: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedBroadcaster {
        fn new(outcomes: Vec<Result<&str, &str>>) -> Self {
            Self {
                outcomes: Mutex::new(
                    outcomes
                        .into_iter()
                        .map(|o| o.map(str::to_owned).map_err(str::to_owned))
                        .collect(),
                ),
                captured: Mutex::new(Vec::new()),
            }
        }

        fn captured_txs(&self) -> Vec<Transaction> {
            self.captured
                .lock()
                .unwrap()
                .iter()
                .map(|bytes| deserialize(bytes).expect("captured bytes must deserialize"))
                .collect()
        }

        fn calls(&self) -> usize {
            self.captured.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TxBroadcaster for ScriptedBroadcaster {
        async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, CoreError> {
            self.captured.lock().unwrap().push(raw_tx.to_vec());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected broadcast call");
            outcome.map_err(|detail| {
                CoreError::BroadcastFailed(vec![RelayFailure {
                    relay: "scripted".into(),
                    detail,
                }])
            })
        }
    }

    struct FailingStore;

    #[async_trait]
    impl InscriptionStore for FailingStore {
        async fn record(&self, _record: &InscriptionRecord) -> Result<(), StoreError> {
            Err(StoreError("connection refused".into()))
        }
    }

    fn session<B: TxBroadcaster>(broadcaster: &B) -> InscriptionSession<'_, B> {
        InscriptionSession::new(broadcaster).with_item_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn empty_item_list_aborts_before_any_broadcast() {
        let broadcaster = ScriptedBroadcaster::new(vec![]);
        let err = session(&broadcaster)
            .run(&[], utxo_with(1, 100_000), &test_keypair())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(broadcaster.calls(), 0);
    }

    #[tokio::test]
    async fn successful_items_chain_through_change_outputs() {
        let broadcaster = ScriptedBroadcaster::new(vec![Ok("id-1"), Ok("id-2")]);
        let keypair = test_keypair();
        let items = vec![simple_item("a.md", b"first"), simple_item("b.md", b"second")];

        let outcome = session(&broadcaster)
            .run(&items, utxo_with(1, 100_000), &keypair)
            .await
            .unwrap();

        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.inscribed(), 2);
        assert_eq!(outcome.total_fee, 1_000); // 500 per item at the floor

        let txs = broadcaster.captured_txs();
        assert_eq!(txs.len(), 2);
        // Second transaction spends the first one's change output.
        assert_eq!(txs[1].input[0].previous_output.txid, txs[0].compute_txid());
        assert_eq!(txs[1].input[0].previous_output.vout, 1);
        // Result order mirrors input order.
        assert_eq!(outcome.results[0].label, "a.md");
        assert_eq!(outcome.results[1].label, "b.md");
        assert!(outcome.results.iter().all(|r| r.status.is_inscribed()));
    }

    #[tokio::test]
    async fn failed_item_does_not_advance_the_chain() {
        let broadcaster =
            ScriptedBroadcaster::new(vec![Err("mempool conflict"), Ok("id-2")]);
        let keypair = test_keypair();
        let starting = utxo_with(5, 100_000);
        let items = vec![simple_item("a.md", b"first"), simple_item("b.md", b"second")];

        let outcome = session(&broadcaster)
            .run(&items, starting.clone(), &keypair)
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.inscribed(), 1);

        // Item 2's transaction spends the session's original starting UTXO,
        // not a derivative of item 1's failed attempt.
        let txs = broadcaster.captured_txs();
        assert_eq!(txs[1].input[0].previous_output.txid, starting.txid);
        assert_eq!(txs[1].input[0].previous_output.vout, starting.vout);

        assert_eq!(outcome.results[0].label, "a.md");
        assert!(matches!(
            &outcome.results[0].status,
            ItemStatus::Failed { error } if error.contains("mempool conflict")
        ));
        assert!(outcome.results[1].status.is_inscribed());
        assert_eq!(outcome.total_fee, 500); // only the succeeded item pays
    }

    #[tokio::test]
    async fn fee_insolvent_item_fails_without_broadcasting() {
        let broadcaster = ScriptedBroadcaster::new(vec![]);
        let outcome = session(&broadcaster)
            .run(
                &[simple_item("a.md", b"first")],
                utxo_with(1, 400),
                &test_keypair(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(broadcaster.calls(), 0);
        assert!(matches!(
            &outcome.results[0].status,
            ItemStatus::Failed { error } if error.contains("insufficient sats for fee")
        ));
    }

    #[tokio::test]
    async fn zero_change_exhausts_the_chain() {
        // First item consumes the whole UTXO (value == fee), so the second
        // has nothing left to spend.
        let broadcaster = ScriptedBroadcaster::new(vec![Ok("id-1")]);
        let items = vec![simple_item("a.md", b"first"), simple_item("b.md", b"second")];

        let outcome = session(&broadcaster)
            .run(&items, utxo_with(1, 500), &test_keypair())
            .await
            .unwrap();

        assert!(outcome.results[0].status.is_inscribed());
        assert!(matches!(
            &outcome.results[1].status,
            ItemStatus::Failed { error } if error.contains("insufficient sats for fee")
        ));
        assert_eq!(broadcaster.calls(), 1);
    }

    #[tokio::test]
    async fn records_are_emitted_for_successes_only() {
        let broadcaster =
            ScriptedBroadcaster::new(vec![Ok("id-1"), Err("rejected"), Ok("id-3")]);
        let store = MemoryStore::new();
        let items = vec![
            simple_item("a.md", b"first"),
            simple_item("b.md", b"second"),
            simple_item("c.md", b"third"),
        ];

        let outcome = session(&broadcaster)
            .with_store(&store)
            .run(&items, utxo_with(1, 100_000), &test_keypair())
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        let records = store.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "a.md");
        assert_eq!(records[0].content_hash, content_hash(b"first"));
        assert_eq!(records[1].label, "c.md");
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let broadcaster = ScriptedBroadcaster::new(vec![Ok("id-1")]);
        let outcome = session(&broadcaster)
            .with_store(&FailingStore)
            .run(
                &[simple_item("a.md", b"first")],
                utxo_with(1, 100_000),
                &test_keypair(),
            )
            .await
            .unwrap();

        // The inscription itself still counts as succeeded.
        assert_eq!(outcome.failed, 0);
        assert!(outcome.results[0].status.is_inscribed());
    }
}
