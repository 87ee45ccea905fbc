//! # Celestial Insight
//!
//! Tarot reading service. A reading is created in two phases: the question is
//! validated and given a spread, then a language model produces the narrative
//! insight and the cards, which are resolved against the catalog and stored.
//! Every model call is paid for from a per-user token balance.
//!
//! - [`ledger`]: atomic token debits
//! - [`classifier`]: question validation (model-backed or keyword rules)
//! - [`spread`]: spread types, card counts and position roles
//! - [`resolver`]: card name matching
//! - [`insight`]: insight generation
//! - [`orchestrator`]: the two-phase workflow
//! - [`server`]: axum HTTP surface

pub mod classifier;
pub mod config;
pub mod insight;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod seed;
pub mod server;
pub mod spread;
pub mod store;

pub use classifier::{QuestionClassifier, QuestionJudgment};
pub use config::Config;
pub use insight::{CelestialInsight, InsightGenerator};
pub use ledger::TokenLedger;
pub use orchestrator::{CreateReading, ErrorKind, ReadingError, ReadingOrchestrator};
pub use resolver::CardResolver;
pub use spread::SpreadType;
pub use store::{Store, StoreError};

/// Crate version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
