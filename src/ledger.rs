//! Token ledger: the per-user usage budget.
//!
//! All balance changes go through [`TokenLedger::deduct`] (check and decrement
//! in one statement) or [`TokenLedger::credit`]; nothing reads a balance and
//! writes it back.

use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct TokenLedger {
    store: Store,
}

impl TokenLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Debit `amount` tokens if the balance covers it.
    ///
    /// Returns `Ok(false)` when the balance is too small or the user has no
    /// profile; the balance is left untouched in both cases.
    pub async fn deduct(&self, user_id: &str, amount: u64) -> Result<bool, StoreError> {
        let debited = self.store.deduct_tokens(user_id, amount).await?;
        if debited {
            log::debug!("debited {} token(s) from {}", amount, user_id);
        } else {
            log::debug!("insufficient tokens: {} needs {}", user_id, amount);
        }
        Ok(debited)
    }

    /// Return `amount` tokens to the user.
    pub async fn credit(&self, user_id: &str, amount: u64) -> Result<bool, StoreError> {
        let credited = self.store.credit_tokens(user_id, amount).await?;
        if credited {
            log::debug!("credited {} token(s) to {}", amount, user_id);
        }
        Ok(credited)
    }

    /// Current balance, `None` when the user has no profile.
    pub async fn balance(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .store
            .get_profile(user_id)
            .await?
            .map(|profile| profile.available_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    async fn ledger_with(user: &str, balance: u64) -> TokenLedger {
        let store = fixtures::store().await;
        store.ensure_profile(user, balance).await.unwrap();
        TokenLedger::new(store)
    }

    #[tokio::test]
    async fn test_deduct_within_balance() {
        for (balance, cost) in [(1_000, 250), (250, 250), (10, 0)] {
            let ledger = ledger_with("u", balance).await;
            assert!(ledger.deduct("u", cost).await.unwrap());
            assert_eq!(ledger.balance("u").await.unwrap(), Some(balance - cost));
        }
    }

    #[tokio::test]
    async fn test_deduct_beyond_balance_changes_nothing() {
        let ledger = ledger_with("u", 2).await;
        assert!(!ledger.deduct("u", 250).await.unwrap());
        assert!(!ledger.deduct("u", 3).await.unwrap());
        assert_eq!(ledger.balance("u").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_credit_restores_balance() {
        let ledger = ledger_with("u", 500).await;
        assert!(ledger.deduct("u", 250).await.unwrap());
        assert!(ledger.credit("u", 250).await.unwrap());
        assert_eq!(ledger.balance("u").await.unwrap(), Some(500));
        assert_eq!(ledger.balance("someone-else").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = ledger_with("u", 1_000).await;

        let attempts = (0..20).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.deduct("u", 150).await.unwrap() })
        });
        let results = futures::future::join_all(attempts).await;
        let successes = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        // 1000 / 150 = 6 full debits fit.
        assert_eq!(successes, 6);
        assert_eq!(ledger.balance("u").await.unwrap(), Some(100));
    }
}
