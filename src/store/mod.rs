//! SQLite persistence for the catalog, mentors, profiles and readings.
//!
//! A single connection is guarded by a mutex and every call runs on the
//! blocking thread pool, so callers only ever see `async` methods. Multi-row
//! writes (reading card replacement, catalog seeding, migrations) run inside
//! one transaction.

mod catalog;
mod mentors;
mod migrations;
mod profiles;
mod readings;

pub(crate) use catalog::{find_suit_id, insert_card_row, insert_suit_row};
pub(crate) use mentors::insert_mentor_row;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The schema is missing a migration or is newer than this build.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The caller supplied a value the catalog rules reject.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// A row expected to exist is gone.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be mapped back onto a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    /// The blocking task running the query panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to the application database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            log::warn!("Failed to enable WAL mode: {}", e);
        }
        let store = Self::from_connection(conn, Some(path))?;
        log::info!("Database initialized at {}", store.describe());
        Ok(store)
    }

    /// Private in-memory database, used by tests and one-off tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database location for log lines.
    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    /// Run `task` against the connection on the blocking pool.
    pub(crate) async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            task(&mut guard)
        })
        .await?
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp '{}': {}", value, e)))
}

/// Wrap a domain parse failure so it can be returned from a row mapper.
pub(crate) fn column_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    parse_timestamp(&raw).map_err(|e| column_error(index, e.to_string()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small catalog used across store, resolver and orchestrator tests.

    use super::Store;
    use crate::models::{Arcana, Card, Mentor, NewCard, NewMentor, NewSuit};

    pub async fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    /// Major arcana suit holding the given card names, numbered in order.
    pub async fn seed_cards(store: &Store, names: &[&str]) -> Vec<Card> {
        let suit = store
            .insert_suit(NewSuit {
                name: "Major Arcana".into(),
                arcana: Arcana::Major,
                description: "The trumps".into(),
                color: "#6B3FA0".into(),
            })
            .await
            .unwrap();

        let mut cards = Vec::new();
        for (number, name) in names.iter().enumerate() {
            let card = store
                .insert_card(NewCard {
                    suit_id: suit.id,
                    name: name.to_string(),
                    number: Some(number as i32),
                    image_url: None,
                    upright_meaning: format!("{} upright", name),
                    reversed_meaning: format!("{} reversed", name),
                    keywords: "fate, change".into(),
                    description: format!("The card {}", name),
                })
                .await
                .unwrap();
            cards.push(card);
        }
        cards
    }

    pub async fn seed_mentor(store: &Store, name: &str, is_active: bool) -> Mentor {
        store
            .insert_mentor(NewMentor {
                name: name.to_string(),
                mystical_level: 7,
                specialization: "Love and destiny".into(),
                avatar_url: None,
                is_active,
            })
            .await
            .unwrap()
    }
}
