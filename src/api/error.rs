use thiserror::Error;

/// Failures talking to an exchange or LLM provider, or handling their secrets.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange rejected the key, secret or signature
    #[error("exchange rejected the API credentials: {0}")]
    InvalidCredentials(String),

    #[error("rate limited by the exchange: {0}")]
    RateLimited(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("credential encryption failed: {0}")]
    Crypto(String),

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("exchange error {code}: {message}")]
    Exchange { code: String, message: String },

    #[error("exchange '{0}' is not supported")]
    UnsupportedExchange(String),

    #[error("AI provider failed: {0}")]
    Provider(String),
}

impl ApiError {
    /// Errors worth retrying on the next sync rather than reporting as bad input.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect(),
            ApiError::RateLimited(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

impl From<aes_gcm::Error> for ApiError {
    fn from(_: aes_gcm::Error) -> Self {
        // aes_gcm::Error carries no detail
        ApiError::Crypto("ciphertext could not be authenticated".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limits_are_transient_without_io() {
        assert!(ApiError::RateLimited("slow down".to_string()).is_transient());
        assert!(!ApiError::InvalidCredentials("-2015".to_string()).is_transient());
        let exchange = ApiError::Exchange {
            code: "-1121".to_string(),
            message: "Invalid symbol.".to_string(),
        };
        assert!(!exchange.is_transient());
        assert_eq!(exchange.to_string(), "exchange error -1121: Invalid symbol.");
    }
}
