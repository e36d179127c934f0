//! Server configuration from environment variables.

use axum::http::HeaderValue;
use tracing::warn;

use tally_core::defaults;

/// Origins allowed when `ALLOWED_ORIGINS` is unset or blank.
const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// Global rate limiting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub period_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            period_secs: 60,
        }
    }
}

/// Receipt storage and URL signing settings.
#[derive(Clone)]
pub struct StorageConfig {
    pub path: String,
    pub bucket: String,
    /// HMAC key for signed URLs. Uploads are disabled without it.
    pub signing_secret: Option<String>,
    pub public_base_url: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("path", &self.path)
            .field("bucket", &self.bucket)
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<HeaderValue>,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
}

impl ApiConfig {
    /// Read configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | `postgres://localhost/tally` |
    /// | `HOST` / `PORT` | `0.0.0.0` / `3000` |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` |
    /// | `RATE_LIMIT_ENABLED` | `true` |
    /// | `RATE_LIMIT_REQUESTS` | `100` |
    /// | `RATE_LIMIT_PERIOD_SECS` | `60` |
    /// | `STORAGE_PATH` | `./data/storage` |
    /// | `STORAGE_BUCKET` | `receipts` |
    /// | `STORAGE_SIGNING_SECRET` | unset (uploads disabled) |
    /// | `PUBLIC_BASE_URL` | `http://localhost:3000` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = get("PORT", "3000").parse().unwrap_or(3000);
        let defaults_rl = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: lookup("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults_rl.enabled),
            requests: get("RATE_LIMIT_REQUESTS", "100")
                .parse()
                .unwrap_or(defaults_rl.requests),
            period_secs: get("RATE_LIMIT_PERIOD_SECS", "60")
                .parse()
                .unwrap_or(defaults_rl.period_secs),
        };

        let storage = StorageConfig {
            path: get("STORAGE_PATH", defaults::STORAGE_PATH),
            bucket: get("STORAGE_BUCKET", defaults::STORAGE_BUCKET),
            signing_secret: lookup("STORAGE_SIGNING_SECRET").filter(|v| !v.trim().is_empty()),
            public_base_url: get("PUBLIC_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
        };

        Self {
            database_url: get("DATABASE_URL", "postgres://localhost/tally"),
            host: get("HOST", "0.0.0.0"),
            port,
            allowed_origins: parse_allowed_origins(&get("ALLOWED_ORIGINS", DEFAULT_ORIGINS)),
            rate_limit,
            storage,
        }
    }
}

/// Parse a comma-separated CORS origin list. Invalid entries are skipped.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(origin = trimmed, error = %e, "Invalid CORS origin");
                    None
                }
            }
        })
        .collect()
}
