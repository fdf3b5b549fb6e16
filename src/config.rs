use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed to call the API (the dashboard frontend)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// JSON seed file for the miner list
    #[serde(default = "default_miners_file")]
    pub miners_file: String,
    /// JSON file with the static baseline statistics
    #[serde(default = "default_stats_file")]
    pub stats_file: String,
    /// Miners per page for the list endpoint
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            miners_file: default_miners_file(),
            stats_file: default_stats_file(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// TOML file with dashboard user accounts
    #[serde(default = "default_users_file")]
    pub users_file: String,
    /// Bearer token lifetime in seconds (default: 24 hours)
    #[serde(default = "default_token_timeout")]
    pub token_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            token_timeout_secs: default_token_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// BTC network difficulty endpoint (bare JSON number body)
    #[serde(default = "default_difficulty_url")]
    pub difficulty_url: String,
    /// BTC USD price endpoint (object with `bitcoin.usd`)
    #[serde(default = "default_price_url")]
    pub price_url: String,
    /// Per-request deadline for upstream calls, in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            difficulty_url: default_difficulty_url(),
            price_url: default_price_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_miners_file() -> String {
    "data/mining_hardware_data.json".to_string()
}

fn default_stats_file() -> String {
    "data/mining_statistics_data.json".to_string()
}

fn default_page_size() -> usize {
    10
}

fn default_users_file() -> String {
    "config/users.toml".to_string()
}

fn default_token_timeout() -> u64 {
    86400 // 24 hours
}

fn default_difficulty_url() -> String {
    "https://blockchain.info/q/getdifficulty".to_string()
}

fn default_price_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd".to_string()
}

fn default_upstream_timeout() -> u64 {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Try to load from config file, fall back to defaults
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {}, using defaults", config_path);
            Ok(Self::default())
        }
    }
}
