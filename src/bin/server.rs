//! celestial-insight HTTP server binary.
//!
//! # Environment Variables
//!
//! - `CELESTIAL_CONFIG`: Optional YAML config file
//! - `PORT`, `BIND_ADDR`: Listen address (default: 0.0.0.0:8080)
//! - `DATABASE_PATH`: SQLite file (default: data/celestial.db)
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: Model provider credentials
//! - `CLASSIFIER_STRATEGY`: "ai" (default) or "rules"
//! - `RUST_LOG`: Tracing filter (default: "info,celestial_insight=debug")
//!
//! # Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use celestial_insight::classifier::{AiClassifier, ClassifierStrategy, QuestionClassifier, RuleClassifier};
use celestial_insight::config::Config;
use celestial_insight::insight::InsightGenerator;
use celestial_insight::llm::OpenAiClient;
use celestial_insight::orchestrator::ReadingOrchestrator;
use celestial_insight::seed::seed_catalog;
use celestial_insight::server::{app_router, AppState};
use celestial_insight::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,celestial_insight=debug".into()),
        )
        .init();

    let config = Config::load().context("loading configuration")?;
    let store = Store::open(&config.database.path).context("opening database")?;

    if config.seed_catalog {
        seed_catalog(&store).await.context("seeding catalog")?;
    }

    let openai = &config.openai;
    if openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; insight generation will fail");
    }

    let classifier = match config.classifier {
        ClassifierStrategy::Ai => {
            let llm = OpenAiClient::new(
                openai.classifier_model.clone(),
                openai.api_key.clone(),
                openai.base_url.clone(),
                openai.timeout(),
            )?;
            QuestionClassifier::Ai(AiClassifier::new(Arc::new(llm), openai.timeout()))
        }
        ClassifierStrategy::Rules => QuestionClassifier::Rules(RuleClassifier::new()),
    };
    let insight_llm = OpenAiClient::new(
        openai.insight_model.clone(),
        openai.api_key.clone(),
        openai.base_url.clone(),
        openai.timeout(),
    )?;
    let insight = InsightGenerator::new(Arc::new(insight_llm), openai.timeout());

    let orchestrator = ReadingOrchestrator::new(
        store.clone(),
        classifier,
        insight,
        config.orchestrator_settings(),
    );
    let app = app_router(AppState::new(orchestrator, config.tokens.default_balance));

    let bind_addr = config.server.address();
    tracing::info!("celestial-insight server starting on {}", bind_addr);
    tracing::info!("Database: {}", store.describe());
    tracing::info!("Classifier: {:?}", config.classifier);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
