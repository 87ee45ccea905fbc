//! User profiles and the token balance primitives the ledger is built on.

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{column_error, Store, StoreError};
use crate::models::UserProfile;

const PROFILE_SELECT: &str =
    "SELECT user_id, available_tokens, preferences, preferred_mentor_id FROM user_profiles";

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let tokens: i64 = row.get(1)?;
    let preferences: String = row.get(2)?;
    Ok(UserProfile {
        user_id: row.get(0)?,
        available_tokens: u64::try_from(tokens)
            .map_err(|_| column_error(1, format!("negative token balance {}", tokens)))?,
        preferences: serde_json::from_str::<Value>(&preferences)
            .map_err(|e| column_error(2, e.to_string()))?,
        preferred_mentor_id: row.get(3)?,
    })
}

fn to_sql_amount(amount: u64) -> Result<i64, StoreError> {
    i64::try_from(amount)
        .map_err(|_| StoreError::Invalid(format!("token amount {} exceeds INTEGER range", amount)))
}

impl Store {
    /// Create the profile with `default_tokens` if it does not exist yet.
    pub async fn ensure_profile(
        &self,
        user_id: &str,
        default_tokens: u64,
    ) -> Result<UserProfile, StoreError> {
        let user_id = user_id.to_string();
        let tokens = to_sql_amount(default_tokens)?;
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_profiles (user_id, available_tokens, preferences)
                 VALUES (?1, ?2, '{}')",
                params![user_id, tokens],
            )?;
            if inserted == 1 {
                log::debug!("created profile for user {} with {} tokens", user_id, tokens);
            }
            let profile = conn.query_row(
                &format!("{} WHERE user_id = ?1", PROFILE_SELECT),
                params![user_id],
                profile_from_row,
            )?;
            Ok(profile)
        })
        .await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    &format!("{} WHERE user_id = ?1", PROFILE_SELECT),
                    params![user_id],
                    profile_from_row,
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    /// Point the profile at a mentor. `None` when the profile does not exist.
    pub async fn set_preferred_mentor(
        &self,
        user_id: &str,
        mentor_id: i64,
    ) -> Result<Option<UserProfile>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE user_profiles SET preferred_mentor_id = ?1 WHERE user_id = ?2",
                params![mentor_id, user_id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let profile = conn.query_row(
                &format!("{} WHERE user_id = ?1", PROFILE_SELECT),
                params![user_id],
                profile_from_row,
            )?;
            Ok(Some(profile))
        })
        .await
    }

    /// Decrement the balance by `amount` if, and only if, it covers it.
    ///
    /// The check and the decrement are one `UPDATE` statement, so two callers
    /// can never both spend the same tokens.
    pub async fn deduct_tokens(&self, user_id: &str, amount: u64) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        let amount = to_sql_amount(amount)?;
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE user_profiles
                 SET available_tokens = available_tokens - ?1
                 WHERE user_id = ?2 AND available_tokens >= ?1",
                params![amount, user_id],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Increment the balance. `false` when the profile does not exist.
    pub async fn credit_tokens(&self, user_id: &str, amount: u64) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        let amount = to_sql_amount(amount)?;
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE user_profiles
                 SET available_tokens = available_tokens + ?1
                 WHERE user_id = ?2",
                params![amount, user_id],
            )?;
            Ok(changed == 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[tokio::test]
    async fn test_ensure_profile_does_not_reset_balance() {
        let store = fixtures::store().await;
        let created = store.ensure_profile("u1", 1_000).await.unwrap();
        assert_eq!(created.available_tokens, 1_000);
        assert_eq!(created.preferences, serde_json::json!({}));

        assert!(store.deduct_tokens("u1", 400).await.unwrap());
        let again = store.ensure_profile("u1", 1_000).await.unwrap();
        assert_eq!(again.available_tokens, 600);
    }

    #[tokio::test]
    async fn test_set_preferred_mentor() {
        let store = fixtures::store().await;
        let mentor = fixtures::seed_mentor(&store, "Madame Zora", true).await;

        assert!(store
            .set_preferred_mentor("ghost", mentor.id)
            .await
            .unwrap()
            .is_none());

        store.ensure_profile("u1", 1_000).await.unwrap();
        let profile = store
            .set_preferred_mentor("u1", mentor.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.preferred_mentor_id, Some(mentor.id));
    }

    #[tokio::test]
    async fn test_deduct_for_unknown_user_fails_quietly() {
        let store = fixtures::store().await;
        assert!(!store.deduct_tokens("nobody", 1).await.unwrap());
        assert!(!store.credit_tokens("nobody", 1).await.unwrap());
    }
}
