use std::time::Duration;

/// One relay's captured failure, kept in attempt order for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    pub relay: String,
    pub detail: String,
}

impl std::fmt::Display for RelayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.relay, self.detail)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no UTXO with at least {min_value} sats ({found} total unspent outputs found)")]
    InsufficientFunds { found: usize, min_value: u64 },

    #[error("insufficient sats for fee: need {fee}, have {available}")]
    InsufficientFundsForFee { fee: u64, available: u64 },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid indexer data: {0}")]
    InvalidIndexerData(String),

    #[error("broadcast failed on all relays: {}", format_relay_failures(.0))]
    BroadcastFailed(Vec<RelayFailure>),

    #[error("signing failure: {0}")]
    Signing(String),
}

fn format_relay_failures(failures: &[RelayFailure]) -> String {
    failures
        .iter()
        .map(RelayFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_failed_display_preserves_attempt_order() {
        let err = CoreError::BroadcastFailed(vec![
            RelayFailure {
                relay: "woc".into(),
                detail: "mempool conflict".into(),
            },
            RelayFailure {
                relay: "arc-gorillapool".into(),
                detail: "status 465".into(),
            },
        ]);
        let msg = err.to_string();
        let woc_pos = msg.find("woc: mempool conflict").unwrap();
        let arc_pos = msg.find("arc-gorillapool: status 465").unwrap();
        assert!(woc_pos < arc_pos);
    }

    #[test]
    fn insufficient_funds_carries_diagnostics() {
        let err = CoreError::InsufficientFunds {
            found: 3,
            min_value: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("3 total"));
    }
}
