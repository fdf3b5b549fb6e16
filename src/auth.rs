//! Authentication for the dashboard API
//!
//! Clients exchange a username/password pair for a bearer token at
//! `POST /api/login` and present it as `Authorization: Bearer <token>`
//! on every other route. Users are loaded from a TOML file; passwords
//! are held in memory as SHA-256 digests only.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A dashboard user as declared in the users file
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    pub fullname: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
}

/// An account as held in memory after load
#[derive(Debug, Clone)]
struct Account {
    fullname: String,
    password_hash: String,
}

/// Issued token data
#[derive(Debug, Clone)]
struct Token {
    username: String,
    issued_at: Instant,
}

/// In-memory bearer token store
pub struct TokenStore {
    tokens: RwLock<HashMap<String, Token>>,
    timeout: Duration,
}

impl TokenStore {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Issue a new token for a user
    pub async fn issue(&self, username: String) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let entry = Token {
            username,
            issued_at: Instant::now(),
        };
        self.tokens.write().await.insert(token.clone(), entry);
        token
    }

    /// Validate a token and return the username while it is unexpired
    pub async fn verify(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        if let Some(entry) = tokens.get(token) {
            if entry.issued_at.elapsed() < self.timeout {
                return Some(entry.username.clone());
            }
        }
        None
    }

    /// Drop expired tokens
    pub async fn cleanup(&self) {
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, entry| entry.issued_at.elapsed() < self.timeout);
    }
}

/// Hash a password using SHA256
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Load user accounts from the users TOML file
pub fn load_users(path: &std::path::Path) -> anyhow::Result<Vec<User>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read users file {}: {}", path.display(), e))?;
    let parsed: UsersFile = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse users file {}: {}", path.display(), e))?;

    if parsed.users.is_empty() {
        anyhow::bail!("users file {} declares no users", path.display());
    }

    Ok(parsed.users)
}

/// Authentication state shared across handlers
pub struct AuthState {
    accounts: HashMap<String, Account>,
    pub tokens: TokenStore,
}

impl AuthState {
    pub fn new(users: Vec<User>, token_timeout_secs: u64) -> Self {
        let accounts = users
            .into_iter()
            .map(|user| {
                let account = Account {
                    fullname: user.fullname,
                    password_hash: hash_password(&user.password),
                };
                (user.username, account)
            })
            .collect();

        Self {
            accounts,
            tokens: TokenStore::new(token_timeout_secs),
        }
    }

    /// Verify login credentials and issue a token on success
    pub async fn login(&self, username: &str, password: &str) -> Option<String> {
        let account = self.accounts.get(username)?;
        if hash_password(password) != account.password_hash {
            return None;
        }
        tracing::info!("login for {} ({})", username, account.fullname);
        Some(self.tokens.issue(username.to_string()).await)
    }

    /// Verify a bearer token
    pub async fn verify_token(&self, token: &str) -> bool {
        self.tokens.verify(token).await.is_some()
    }
}

/// Pull the token out of an `Authorization` header value. Anything
/// other than the `Bearer <token>` shape yields `None`.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
