pub mod client;
pub mod mapper;
pub mod types;

pub use client::BinanceClient;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SPOT_BASE_URL: &str = "https://api.binance.com";
pub const FUTURES_BASE_URL: &str = "https://fapi.binance.com";
pub const RECV_WINDOW: u64 = 5000;

/// Hex HMAC-SHA256 of the query string, as Binance's signed endpoints expect.
pub fn generate_signature(query_string: &str, api_secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(api_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// "SOL/USDT", "sol-usdt" and "SOLUSDT" all become "SOLUSDT".
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_documented_example() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            generate_signature(query, secret),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("SOL/USDT"), "SOLUSDT");
        assert_eq!(normalize_symbol("eth-usdt"), "ETHUSDT");
        assert_eq!(normalize_symbol("BTCUSDT"), "BTCUSDT");
    }
}
