use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::engine::{sync_trades, SyncOptions};
use crate::api::{CredentialCipher, ExchangeConnector};
use crate::db::{api_keys, Database};
use crate::models::MarketType;

/// Periodically syncs every active API key for both market types.
#[derive(Clone)]
pub struct SyncScheduler {
    db: Arc<Database>,
    cipher: Arc<CredentialCipher>,
    connector: Arc<dyn ExchangeConnector>,
    interval: Duration,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncScheduler {
    pub fn new(
        db: Arc<Database>,
        cipher: Arc<CredentialCipher>,
        connector: Arc<dyn ExchangeConnector>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            cipher,
            connector,
            interval,
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the background loop, replacing a running one.
    pub async fn start(&self) {
        self.stop().await;
        log::info!("Starting auto-sync every {}s", self.interval.as_secs());

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                scheduler.run_once().await;
            }
        });

        *self.task.lock().await = Some(handle);
    }

    /// One pass over all active keys. Returns how many syncs succeeded.
    pub async fn run_once(&self) -> usize {
        let keys = {
            let conn = match self.db.conn.lock() {
                Ok(conn) => conn,
                Err(e) => {
                    log::error!("Auto-sync could not lock the database: {}", e);
                    return 0;
                }
            };
            match api_keys::list_active_keys(&conn) {
                Ok(keys) => keys,
                Err(e) => {
                    log::error!("Auto-sync could not load API keys: {}", e);
                    return 0;
                }
            }
        };

        log::debug!("Auto-sync tick: {} active keys", keys.len());
        let mut succeeded = 0;
        for key in keys {
            for market_type in MarketType::ALL {
                let options = SyncOptions {
                    market_type,
                    ..Default::default()
                };
                match sync_trades(
                    &self.db,
                    &self.cipher,
                    self.connector.as_ref(),
                    key.user_id,
                    &key.exchange,
                    options,
                )
                .await
                {
                    Ok(result) => {
                        succeeded += 1;
                        if result.imported > 0 {
                            log::info!(
                                "Auto-sync imported {} new trade(s) for user {} ({} {})",
                                result.imported,
                                key.user_id,
                                key.exchange,
                                market_type
                            );
                        }
                    }
                    Err(e) => log::warn!(
                        "Auto-sync failed for user {} ({} {}): {}",
                        key.user_id,
                        key.exchange,
                        market_type,
                        e
                    ),
                }
            }
        }
        succeeded
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            log::info!("Auto-sync stopped");
        }
    }
}
