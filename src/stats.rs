//! Stats aggregation for `GET /api/stats`
//!
//! Merges the static baseline, the computed average hashrate, and the
//! two cached upstream values into one document. Upstream failures are
//! a data condition, not an HTTP condition: the response is always 200
//! for an authenticated caller, with per-dependency reasons collected
//! in `errors`.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::api::blockchain_info::BlockchainInfoClient;
use crate::api::coingecko::CoinGeckoClient;
use crate::api::ExtractError;
use crate::cache::CacheKey;
use crate::models::{AppState, Miner};

pub const ERR_AVERAGE: &str = "unable to compute average hashrate";
pub const ERR_DIFFICULTY: &str = "unable to fetch BTC difficulty";
pub const ERR_PRICE: &str = "unable to fetch BTC price";

/// Response body for the stats endpoint
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stat: Map<String, Value>,
    pub errors: Vec<String>,
}

/// Decimal parse of a `hashRate` string: takes the leading decimal
/// prefix (sign, digits, fraction, exponent); a string with no numeric
/// prefix parses to NaN.
fn parse_hash_rate(raw: &str) -> f64 {
    let s = raw.trim();
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {
                seen_digit = true;
                end += 1;
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }

    // Optional exponent; kept only if at least one digit follows.
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Arithmetic mean of the miners' hashrates. An empty collection
/// yields NaN (0/0), as does any row without a parseable prefix.
pub fn average_hash_rate(miners: &[Miner]) -> f64 {
    let sum: f64 = miners.iter().map(|m| parse_hash_rate(&m.hash_rate)).sum();
    sum / miners.len() as f64
}

/// Non-finite values have no JSON representation and serialize as null.
fn number_or_null(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

async fn fetch_value(state: &AppState, key: CacheKey) -> Result<f64, &'static str> {
    let (url, extract, reason): (&str, fn(&Value) -> Result<f64, ExtractError>, _) = match key {
        CacheKey::BtcDifficulty => (
            state.config.upstream.difficulty_url.as_str(),
            BlockchainInfoClient::extract_difficulty,
            ERR_DIFFICULTY,
        ),
        CacheKey::BtcPrice => (
            state.config.upstream.price_url.as_str(),
            CoinGeckoClient::extract_price,
            ERR_PRICE,
        ),
    };

    let body = state.upstream.get_json(url).await.map_err(|e| {
        tracing::warn!("{} request failed: {}", key.field_name(), e);
        reason
    })?;

    extract(&body).map_err(|e| {
        tracing::warn!("{} response rejected: {}", key.field_name(), e);
        reason
    })
}

/// Build the merged stats document plus its error list.
///
/// Merge order is fixed: baseline, then `averageHashRate`, then the
/// cache snapshot; on key collision the later source wins. Only live
/// failures append reasons; a consulted negative cache entry does not.
pub async fn build_stats(state: &AppState) -> StatsResponse {
    let mut stat = state.baseline.clone();
    let mut errors = Vec::new();

    let miners = state.miners.snapshot().await;
    let average = average_hash_rate(&miners);
    if !miners.is_empty() && !average.is_finite() {
        tracing::warn!("average hashrate is non-finite over {} miners", miners.len());
        errors.push(ERR_AVERAGE.to_string());
    }
    stat.insert("averageHashRate".to_string(), number_or_null(average));

    for key in CacheKey::ALL {
        if !state.cache.has(key).await {
            match fetch_value(state, key).await {
                Ok(value) => state.cache.set(key, Some(value)).await,
                Err(reason) => {
                    state.cache.set(key, None).await;
                    errors.push(reason.to_string());
                }
            }
        }
    }

    for key in CacheKey::ALL {
        if let Some(entry) = state.cache.get(key).await {
            let value = entry.map(number_or_null).unwrap_or(Value::Null);
            stat.insert(key.field_name().to_string(), value);
        }
    }

    StatsResponse { stat, errors }
}
