use serde_json::Value;

use super::ExtractError;

/// Client for the CoinGecko simple-price API
pub struct CoinGeckoClient;

impl CoinGeckoClient {
    /// Extract the USD price from a decoded simple-price response.
    /// Expected shape: `{"bitcoin": {"usd": <number>}}`. Absence at any
    /// level is a missing-data failure; a present non-numeric value is
    /// a type failure.
    pub fn extract_price(body: &Value) -> Result<f64, ExtractError> {
        let usd = body
            .get("bitcoin")
            .and_then(|coin| coin.get("usd"))
            .ok_or(ExtractError::DataMissing)?;

        match usd {
            Value::Null => Err(ExtractError::DataMissing),
            Value::Number(n) => n.as_f64().ok_or(ExtractError::WrongType),
            _ => Err(ExtractError::WrongType),
        }
    }
}
