use serde::{Deserialize, Serialize};

use super::MarketType;

pub const DEFAULT_EXCHANGE: &str = "binance";

/// Exchange credentials as stored; key and secret are ciphertext.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: String,
    pub user_id: i64,
    pub exchange: String,
    pub label: String,
    pub api_key_enc: String,
    pub api_secret_enc: String,
    pub is_active: bool,
    pub last_sync_timestamp: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiKeyRecord {
    /// Masks everything but the last 4 characters.
    pub fn create_preview(api_key: &str) -> String {
        let chars: Vec<char> = api_key.chars().collect();
        if chars.len() <= 4 {
            "*".repeat(chars.len())
        } else {
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", "*".repeat(4), tail)
        }
    }

    /// Strips ciphertext; `plain_key` is only used to build the preview.
    pub fn to_safe(&self, plain_key: &str) -> ApiKeySafe {
        ApiKeySafe {
            id: self.id.clone(),
            exchange: self.exchange.clone(),
            label: self.label.clone(),
            api_key_preview: Self::create_preview(plain_key),
            is_active: self.is_active,
            last_sync_timestamp: self.last_sync_timestamp,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySafe {
    pub id: String,
    pub exchange: String,
    pub label: String,
    pub api_key_preview: String,
    pub is_active: bool,
    pub last_sync_timestamp: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveKeysInput {
    pub user_id: Option<i64>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub label: Option<String>,
    pub exchange: Option<String>,
}

impl SaveKeysInput {
    pub fn validate(&self) -> Result<i64, String> {
        let user_id = self.user_id.ok_or_else(|| "userId is required".to_string())?;
        if self.api_key.trim().is_empty() || self.api_secret.trim().is_empty() {
            return Err("apiKey and apiSecret are required".to_string());
        }
        Ok(user_id)
    }

    pub fn exchange(&self) -> String {
        self.exchange
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EXCHANGE)
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: i64,
    #[serde(default)]
    pub market_type: MarketType,
    pub exchange: Option<String>,
    /// Restrict the sync to these symbols instead of discovering them
    pub symbols: Option<Vec<String>>,
    /// Unix milliseconds; falls back to the stored cursor for this market
    pub since: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub fetched: i64,
    pub imported: i64,
    pub duplicates: i64,
    pub failed_symbols: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistory {
    pub id: String,
    pub user_id: i64,
    pub exchange: String,
    pub market_type: MarketType,
    pub trades_fetched: i64,
    pub trades_imported: i64,
    pub trades_duplicated: i64,
    pub failed_symbols: Vec<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: i64,
}
