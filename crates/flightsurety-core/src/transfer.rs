use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Amount, Identity};

/// Receipt for value moved out of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub recipient: Identity,
    pub amount: Amount,
    pub settled_at: DateTime<Utc>,
}

/// External value-transfer rail.
///
/// Called while the engine holds the ledger lock; an `Err` makes the engine
/// revert the balance debit before the lock is released.
#[async_trait]
pub trait ValueTransfer: Send + Sync {
    fn rail(&self) -> &'static str;

    async fn send(&self, recipient: &Identity, amount: Amount) -> Result<TransferReceipt, String>;
}

/// In-process rail that records every payout. Useful for local runs and
/// tests; `set_failing(true)` makes every transfer fail.
#[derive(Debug, Default)]
pub struct InMemoryTransfer {
    sent: Mutex<Vec<TransferReceipt>>,
    failing: AtomicBool,
}

impl InMemoryTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn receipts(&self) -> Vec<TransferReceipt> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Total value sent to `recipient`.
    pub fn total_sent_to(&self, recipient: &Identity) -> Amount {
        self.receipts()
            .iter()
            .filter(|r| r.recipient == *recipient)
            .map(|r| r.amount)
            .sum()
    }
}

#[async_trait]
impl ValueTransfer for InMemoryTransfer {
    fn rail(&self) -> &'static str {
        "in-memory"
    }

    async fn send(&self, recipient: &Identity, amount: Amount) -> Result<TransferReceipt, String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("rail unavailable".to_string());
        }

        let receipt = TransferReceipt {
            transfer_id: Uuid::new_v4().to_string(),
            recipient: recipient.clone(),
            amount,
            settled_at: Utc::now(),
        };
        self.sent
            .lock()
            .map_err(|_| "transfer log lock poisoned".to_string())?
            .push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_receipts() {
        let rail = InMemoryTransfer::new();
        let p = Identity::new("p1");
        rail.send(&p, 5).await.unwrap();
        rail.send(&p, 7).await.unwrap();
        assert_eq!(rail.total_sent_to(&p), 12);
        assert_eq!(rail.receipts().len(), 2);
    }

    #[tokio::test]
    async fn failing_rail_records_nothing() {
        let rail = InMemoryTransfer::new();
        rail.set_failing(true);
        assert!(rail.send(&Identity::new("p1"), 5).await.is_err());
        assert!(rail.receipts().is_empty());
    }
}
