use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use teloxide::Bot;
use tracing::info;

mod config;
mod db;
mod handlers;
mod llm;
mod progression;
mod scheduler;
mod server;
mod state;
mod utils;

use config::{Config, ProviderKind};
use db::database::Database;
use llm::{GeminiClient, LlmGateway, LlmProvider, PerplexityClient};
use scheduler::TokioScheduler;
use state::AppState;
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();

    let config = Config::load()?;
    let _guards = init_logging(&config.log_level);
    info!(
        "Starting FocusCoachBot (provider={}, progression={})",
        config.llm_provider.as_str(),
        config.enable_progression
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let bot = Bot::new(config.bot_token.clone());

    let db = Database::init(&config.database_url).await?;
    db.health_check().await?;

    let provider: Arc<dyn LlmProvider> = match config.llm_provider {
        ProviderKind::Gemini => Arc::new(GeminiClient::new(http.clone(), &config)),
        ProviderKind::Perplexity => Arc::new(PerplexityClient::new(http.clone(), &config)),
    };
    let gateway = LlmGateway::new(provider, config.lenient_verdict_parsing);

    let state = AppState::new(
        bot,
        http,
        db,
        gateway,
        Arc::new(TokioScheduler),
        Arc::new(config),
    );

    server::run(state).await?;
    Ok(())
}
