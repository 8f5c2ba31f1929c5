use std::sync::Arc;

use anyhow::Context;
use trading_journal::api::llm::Gemini;
use trading_journal::api::{CredentialCipher, ExchangeConnector, LiveConnector, Llm};
use trading_journal::config::Config;
use trading_journal::db::Database;
use trading_journal::server::{self, AppState};
use trading_journal::sync::SyncScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db = Arc::new(
        Database::new(&config.db_path)
            .with_context(|| format!("Database initialization failed for {}", config.db_path))?,
    );
    let cipher = Arc::new(CredentialCipher::from_database(&db, &config.master_key)?);
    let connector: Arc<dyn ExchangeConnector> = Arc::new(LiveConnector);

    let llm: Option<Arc<dyn Llm>> = match &config.gemini_api_key {
        Some(key) => {
            log::info!("AI analysis enabled with {}", config.gemini_model);
            Some(Arc::new(Gemini::new(key.clone(), config.gemini_model.clone())))
        }
        None => {
            log::warn!("GEMINI_API_KEY is not set; /api/analyze and /api/ask will return 503");
            None
        }
    };

    let scheduler = config
        .sync_interval
        .map(|interval| SyncScheduler::new(db.clone(), cipher.clone(), connector.clone(), interval));
    if let Some(scheduler) = &scheduler {
        scheduler.start().await;
    }

    let state = AppState {
        db,
        cipher,
        connector,
        llm,
    };
    server::serve(state, config.bind).await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    Ok(())
}
