use serde_json::Value;

use super::ExtractError;

/// Client for the blockchain.info difficulty query API
pub struct BlockchainInfoClient;

impl BlockchainInfoClient {
    /// Extract the network difficulty from a decoded response body.
    /// The endpoint returns a bare JSON number; any other shape is
    /// rejected.
    pub fn extract_difficulty(body: &Value) -> Result<f64, ExtractError> {
        match body {
            Value::Null => Err(ExtractError::DataMissing),
            Value::Number(n) => n.as_f64().ok_or(ExtractError::WrongType),
            _ => Err(ExtractError::WrongType),
        }
    }
}
