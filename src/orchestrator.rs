//! Reading orchestrator: the two-phase reading workflow.
//!
//! Phase 1 ([`ReadingOrchestrator::create_reading`]) charges tokens, checks
//! the mentor, classifies the question and persists a reading. Phase 2
//! ([`ReadingOrchestrator::generate_insight`]) charges tokens, asks the model
//! for an insight, resolves its cards against the catalog and replaces the
//! reading's card set in one transaction.
//!
//! Both phases return `Result<ReadingDetail, ReadingError>`; every failure
//! carries an [`ErrorKind`] and a message for the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{spread_for_question, ClassifierError, QuestionClassifier, RuleClassifier};
use crate::insight::{DrawnCard, InsightError, InsightGenerator};
use crate::ledger::TokenLedger;
use crate::llm::LlmError;
use crate::models::{NewReading, Placement, ReadingDetail};
use crate::resolver::CardResolver;
use crate::spread::SpreadType;
use crate::store::{Store, StoreError};

const DEFAULT_INVALID_REASON: &str = "The question is not suitable for a tarot reading";
const INSIGHT_USAGE_PREFIX: &str = "Insight tokens used:";

/// Failure category of an orchestrator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientTokens,
    InvalidQuestion,
    NotFound,
    AiService,
    CardNotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InsufficientTokens => "insufficient_tokens",
            ErrorKind::InvalidQuestion => "invalid_question",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AiService => "ai_service",
            ErrorKind::CardNotFound => "card_not_found",
            ErrorKind::Storage => "storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("Insufficient tokens: {needed} more token(s) required")]
    InsufficientTokens { needed: u64 },

    #[error("{0}")]
    InvalidQuestion(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The model call failed, timed out or returned an unusable result.
    #[error("{0}")]
    AiService(String),

    #[error("Card '{0}' not found in the catalog")]
    CardNotFound(String),

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl ReadingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadingError::InsufficientTokens { .. } => ErrorKind::InsufficientTokens,
            ReadingError::InvalidQuestion(_) => ErrorKind::InvalidQuestion,
            ReadingError::NotFound(_) => ErrorKind::NotFound,
            ReadingError::AiService(_) => ErrorKind::AiService,
            ReadingError::CardNotFound(_) => ErrorKind::CardNotFound,
            ReadingError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for ReadingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ReadingError::NotFound(what),
            other => ReadingError::Storage(other),
        }
    }
}

/// Token prices and failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Upfront charge for phase 1.
    pub reading_cost: u64,
    /// Upfront charge for phase 2.
    pub insight_cost: u64,
    /// Credit the upfront charge back when a phase fails after debiting it.
    pub refund_on_failure: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            reading_cost: 250,
            insight_cost: 250,
            refund_on_failure: false,
        }
    }
}

/// Phase 1 input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReading {
    pub question: String,
    pub mentor_id: i64,
    #[serde(default)]
    pub spread_type: Option<SpreadType>,
}

/// Answer to a free-form question. Nothing is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Guidance {
    pub question: String,
    pub spread_type: SpreadType,
    pub text: String,
    pub cards: Vec<DrawnCard>,
    pub tokens_used: u64,
}

#[derive(Debug, Clone)]
pub struct ReadingOrchestrator {
    store: Store,
    ledger: TokenLedger,
    classifier: QuestionClassifier,
    insight: InsightGenerator,
    settings: OrchestratorSettings,
}

impl ReadingOrchestrator {
    pub fn new(
        store: Store,
        classifier: QuestionClassifier,
        insight: InsightGenerator,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            ledger: TokenLedger::new(store.clone()),
            store,
            classifier,
            insight,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn settings(&self) -> OrchestratorSettings {
        self.settings
    }

    /// Phase 1: validate the question and persist a new reading.
    ///
    /// Nothing is persisted unless every step succeeds. The upfront charge is
    /// kept on failure unless `refund_on_failure` is set.
    pub async fn create_reading(
        &self,
        user_id: &str,
        request: CreateReading,
    ) -> Result<ReadingDetail, ReadingError> {
        if request.question.trim().is_empty() {
            return Err(ReadingError::InvalidQuestion(
                "A question is required".to_string(),
            ));
        }

        let cost = self.settings.reading_cost;
        self.charge_upfront(user_id, cost).await?;

        let result = self.create_after_debit(user_id, request).await;
        if let Err(err) = &result {
            self.settle_failure(user_id, cost, err).await;
        }
        result
    }

    async fn create_after_debit(
        &self,
        user_id: &str,
        request: CreateReading,
    ) -> Result<ReadingDetail, ReadingError> {
        let mentor = self
            .store
            .get_mentor(request.mentor_id)
            .await?
            .filter(|mentor| mentor.is_active)
            .ok_or_else(|| ReadingError::NotFound(format!("mentor {}", request.mentor_id)))?;

        let question = request.question.trim().to_string();
        let classification = self.classifier.classify(&question).await.map_err(|e| {
            log::error!("Question classification failed for {}: {}", user_id, e);
            let ClassifierError::Llm(inner) = &e;
            ai_failure("question classifier", inner)
        })?;
        let judgment = classification.judgment;

        if !judgment.is_valid {
            let reason = judgment
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INVALID_REASON.to_string());
            log::info!("Question rejected for {}: {}", user_id, reason);
            return Err(ReadingError::InvalidQuestion(reason));
        }

        self.true_up(user_id, classification.tokens_used, self.settings.reading_cost)
            .await?;

        let spread_type = request
            .spread_type
            .or(judgment.spread_type)
            .unwrap_or_else(|| spread_for_question(&question));

        let reading = self
            .store
            .insert_reading(NewReading {
                user_id: user_id.to_string(),
                mentor_id: Some(mentor.id),
                spread_type,
                question,
                notes: format!(
                    "Theme: {}\nTokens used: {}",
                    judgment.theme, classification.tokens_used
                ),
            })
            .await?;

        log::info!(
            "Created reading {} for {} ({}, mentor {})",
            reading.id,
            user_id,
            spread_type,
            mentor.name
        );
        Ok(ReadingDetail {
            reading,
            cards: Vec::new(),
        })
    }

    /// Phase 2: generate an insight and replace the reading's cards.
    ///
    /// A card the catalog cannot resolve aborts the phase before anything is
    /// written, so the previous insight and card set stay in place.
    pub async fn generate_insight(
        &self,
        reading_id: i64,
        user_id: &str,
    ) -> Result<ReadingDetail, ReadingError> {
        let cost = self.settings.insight_cost;
        self.charge_upfront(user_id, cost).await?;

        let result = self.insight_after_debit(reading_id, user_id).await;
        if let Err(err) = &result {
            self.settle_failure(user_id, cost, err).await;
        }
        result
    }

    async fn insight_after_debit(
        &self,
        reading_id: i64,
        user_id: &str,
    ) -> Result<ReadingDetail, ReadingError> {
        let mut reading = self
            .store
            .get_reading(reading_id, user_id)
            .await?
            .ok_or_else(|| ReadingError::NotFound(format!("reading {}", reading_id)))?;

        let generated = self
            .insight
            .generate(&reading.question, reading.spread_type)
            .await
            .map_err(|e| {
                log::error!("Insight generation failed for reading {}: {}", reading_id, e);
                let InsightError::Llm(inner) = &e;
                ai_failure("insight service", inner)
            })?;

        self.true_up(user_id, generated.tokens_used, self.settings.insight_cost)
            .await?;

        let spread = reading.spread_type;
        let drawn = generated.insight.cards;
        if drawn.len() != spread.card_count() {
            log::warn!(
                "Reading {}: {} expects {} card(s), model returned {}",
                reading_id,
                spread,
                spread.card_count(),
                drawn.len()
            );
        }

        let resolver = CardResolver::load(&self.store).await?;
        let mut placements = Vec::with_capacity(drawn.len());
        for (index, card) in drawn.into_iter().enumerate() {
            let resolved = resolver.resolve(&card.name).ok_or_else(|| {
                log::warn!("Reading {}: card '{}' not in catalog", reading_id, card.name);
                ReadingError::CardNotFound(card.name.clone())
            })?;
            placements.push(Placement {
                card_id: resolved.id,
                orientation: card.orientation,
                role: spread.role_at(index + 1).map(str::to_string),
                interpretation: card.interpretation,
            });
        }

        let notes = insight_notes(&reading.notes, generated.tokens_used);
        let text = generated.insight.text;
        let cards = self
            .store
            .save_insight(reading_id, text.clone(), notes.clone(), placements)
            .await?;

        log::info!(
            "Saved insight for reading {} with {} card(s)",
            reading_id,
            cards.len()
        );
        reading.celestial_insight = text;
        reading.notes = notes;
        Ok(ReadingDetail { reading, cards })
    }

    /// Free-form guidance for a question, without creating a reading.
    ///
    /// The question is screened by the keyword rules before anything is
    /// charged; the call then costs the same as an insight.
    pub async fn celestial_guidance(
        &self,
        user_id: &str,
        question: &str,
    ) -> Result<Guidance, ReadingError> {
        let question = question.trim();
        let judgment = RuleClassifier::new().classify(question).judgment;
        if !judgment.is_valid {
            return Err(ReadingError::InvalidQuestion(
                judgment
                    .reason
                    .unwrap_or_else(|| DEFAULT_INVALID_REASON.to_string()),
            ));
        }
        let spread_type = judgment
            .spread_type
            .unwrap_or_else(|| spread_for_question(question));

        let cost = self.settings.insight_cost;
        self.charge_upfront(user_id, cost).await?;

        let result = self.guidance_after_debit(user_id, question, spread_type).await;
        if let Err(err) = &result {
            self.settle_failure(user_id, cost, err).await;
        }
        result
    }

    async fn guidance_after_debit(
        &self,
        user_id: &str,
        question: &str,
        spread_type: SpreadType,
    ) -> Result<Guidance, ReadingError> {
        let generated = self
            .insight
            .generate(question, spread_type)
            .await
            .map_err(|e| {
                log::error!("Guidance generation failed for {}: {}", user_id, e);
                let InsightError::Llm(inner) = &e;
                ai_failure("insight service", inner)
            })?;

        self.true_up(user_id, generated.tokens_used, self.settings.insight_cost)
            .await?;

        log::info!("Gave {} guidance to {}", spread_type, user_id);
        Ok(Guidance {
            question: question.to_string(),
            spread_type,
            text: generated.insight.text,
            cards: generated.insight.cards,
            tokens_used: generated.tokens_used,
        })
    }

    async fn charge_upfront(&self, user_id: &str, amount: u64) -> Result<(), ReadingError> {
        if self.ledger.deduct(user_id, amount).await? {
            Ok(())
        } else {
            Err(ReadingError::InsufficientTokens { needed: amount })
        }
    }

    /// Debit whatever actual usage exceeds the upfront charge.
    async fn true_up(&self, user_id: &str, used: u64, upfront: u64) -> Result<(), ReadingError> {
        let extra = used.saturating_sub(upfront);
        if extra == 0 {
            return Ok(());
        }
        if self.ledger.deduct(user_id, extra).await? {
            log::debug!("true-up: {} extra token(s) from {}", extra, user_id);
            Ok(())
        } else {
            log::warn!("true-up of {} token(s) failed for {}", extra, user_id);
            Err(ReadingError::InsufficientTokens { needed: extra })
        }
    }

    async fn settle_failure(&self, user_id: &str, upfront: u64, err: &ReadingError) {
        if !self.settings.refund_on_failure {
            return;
        }
        match self.ledger.credit(user_id, upfront).await {
            Ok(_) => log::info!(
                "Refunded {} token(s) to {} after {} failure",
                upfront,
                user_id,
                err.kind().as_str()
            ),
            Err(e) => log::error!("Refund of {} token(s) to {} failed: {}", upfront, user_id, e),
        }
    }
}

/// Client-facing error for a failed model call. The full error is logged by
/// the caller.
fn ai_failure(service: &str, err: &LlmError) -> ReadingError {
    ReadingError::AiService(format!("The {} {}", service, err.outcome()))
}

/// Phase 1 notes with the latest insight usage line appended.
fn insight_notes(notes: &str, tokens_used: u64) -> String {
    let mut lines: Vec<&str> = notes
        .lines()
        .filter(|line| !line.starts_with(INSIGHT_USAGE_PREFIX))
        .collect();
    let usage = format!("{} {}", INSIGHT_USAGE_PREFIX, tokens_used);
    lines.push(&usage);
    lines.join("\n")
}
