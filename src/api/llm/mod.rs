//! LLM client abstraction for trade commentary.

mod gemini;

pub use gemini::Gemini;

use async_trait::async_trait;

use super::error::ApiError;
use crate::models::TradeSnapshot;

#[async_trait]
pub trait Llm: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Send a completion request and return the response text.
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

fn or_na<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

pub fn trade_analysis_prompt(trade: &TradeSnapshot) -> String {
    format!(
        "Act as a professional trading mentor. Review the following trade and give constructive criticism.\n\
         \n\
         Trade details:\n\
         - Instrument: {}\n\
         - Direction: {}\n\
         - Entry: {}\n\
         - Exit: {}\n\
         - Position size: {}\n\
         - PnL: {}\n\
         - Fees: {}\n\
         - Date: {}\n\
         - Trader notes: \"{}\"\n\
         \n\
         Please assess:\n\
         1. Execution quality (entry and exit).\n\
         2. Psychology, judging by the notes.\n\
         3. Risk management.\n\
         4. Three concrete suggestions for improvement.\n\
         \n\
         Keep the answer short and structured (Markdown).",
        trade.symbol,
        or_na(&trade.direction),
        or_na(&trade.entry_price),
        or_na(&trade.exit_price),
        or_na(&trade.size),
        or_na(&trade.pnl),
        or_na(&trade.fees),
        or_na(&trade.date),
        trade.notes.as_deref().unwrap_or("")
    )
}

pub fn question_prompt(question: &str) -> String {
    format!(
        "Answer the trader's question briefly and to the point: {}",
        question.trim()
    )
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub struct MockLlm {
        response: String,
    }

    impl MockLlm {
        pub fn new(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
            }
        }
    }

    #[async_trait]
    impl Llm for MockLlm {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ApiError> {
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn mock_llm_returns_response() {
        let llm = MockLlm::new("Solid entry");
        assert_eq!(llm.complete("anything").await.unwrap(), "Solid entry");
    }

    #[test]
    fn analysis_prompt_includes_trade_fields() {
        let view = crate::models::TradeView {
            id: "1".to_string(),
            symbol: "SOLUSDT".to_string(),
            entry_price: 142.5,
            exit_price: 150.0,
            size: 3.0,
            direction: crate::models::Direction::Long,
            date: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            pnl: 22.5,
            fees: 0.3,
            order_type: None,
            market_type: crate::models::MarketType::Spot,
            notes: "FOMO entry".to_string(),
            exchange: "manual".to_string(),
            source: crate::models::TradeSource::Manual,
        };
        let prompt = trade_analysis_prompt(&TradeSnapshot::from(&view));
        for needle in ["SOLUSDT", "LONG", "142.5", "150", "22.5", "FOMO entry", "2023-11-14"] {
            assert!(prompt.contains(needle), "prompt should mention {}", needle);
        }
    }

    #[test]
    fn analysis_prompt_tolerates_missing_fields() {
        let snapshot: TradeSnapshot = serde_json::from_str(r#"{"symbol":"BTCUSDT","pnl":-12.5,"side":"sell"}"#).unwrap();
        let prompt = trade_analysis_prompt(&snapshot);
        assert!(prompt.contains("Direction: sell"));
        assert!(prompt.contains("Entry: n/a"));
        assert!(prompt.contains("PnL: -12.5"));
    }
}
