//! Service-account authentication for the Sheets API.
//!
//! A signed RS256 assertion is exchanged at the token endpoint for a bearer
//! token (OAuth 2.0 JWT bearer grant). Tokens are cached until shortly
//! before they expire.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use tally_core::{defaults, Error, Result};

use crate::error::to_tally_error;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Source of bearer tokens for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Fixed token, for tests and pre-authorized deployments.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    defaults::JWT_LIFETIME_SECS as u64
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Exchanges a service-account assertion for access tokens.
pub struct ServiceAccountTokenProvider {
    client: Client,
    client_email: String,
    key: EncodingKey,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    /// Fails with `Config` when the private key is not a valid RSA PEM.
    pub fn new(
        client: Client,
        client_email: impl Into<String>,
        private_key_pem: &str,
        token_uri: impl Into<String>,
    ) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid service account private key: {}", e)))?;
        Ok(Self {
            client,
            client_email: client_email.into(),
            key,
            token_uri: token_uri.into(),
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: defaults::SHEETS_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + defaults::JWT_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| Error::Mirror(format!("Failed to sign service account assertion: {}", e)))
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let assertion = self.assertion()?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Mirror(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(to_tally_error(status.as_u16(), &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Mirror(format!("Failed to parse token response: {}", e)))?;

        let lifetime = token
            .expires_in
            .saturating_sub(defaults::TOKEN_REFRESH_MARGIN_SECS);
        debug!(
            subsystem = "sheets",
            component = "auth",
            op = "exchange",
            expires_in = token.expires_in,
            "Obtained access token"
        );
        Ok(CachedToken {
            token: token.access_token,
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
