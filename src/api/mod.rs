pub mod binance;
pub mod client;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod rate_limiter;

pub use client::{
    ExchangeClient, ExchangeConnector, FetchTradesRequest, FetchTradesResponse, LiveConnector, RateLimitConfig,
    RawTrade,
};
pub use credentials::CredentialCipher;
pub use error::ApiError;
pub use llm::Llm;
pub use rate_limiter::RateLimiter;
