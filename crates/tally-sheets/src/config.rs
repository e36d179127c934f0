//! Mirror configuration.

use std::time::Duration;

use tally_core::{defaults, Error, Result};

/// Connection settings for the spreadsheet mirror.
#[derive(Clone)]
pub struct SheetsConfig {
    /// Target spreadsheet.
    pub spreadsheet_id: String,
    /// Tab that holds one row per transaction.
    pub tab: String,
    /// Service-account email (JWT issuer).
    pub client_email: String,
    /// Service-account RSA private key, PEM encoded.
    pub private_key: String,
    pub api_base: String,
    pub token_uri: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("tab", &self.tab)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("token_uri", &self.token_uri)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SheetsConfig {
    /// Settings for `spreadsheet_id` with default endpoints and no credentials.
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            tab: defaults::SHEETS_TAB.to_string(),
            client_email: String::new(),
            private_key: String::new(),
            api_base: defaults::SHEETS_API_BASE.to_string(),
            token_uri: defaults::GOOGLE_TOKEN_URI.to_string(),
            timeout: Duration::from_secs(defaults::SHEETS_TIMEOUT_SECS),
        }
    }

    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = tab.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    pub fn with_credentials(
        mut self,
        client_email: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.client_email = client_email.into();
        self.private_key = unescape_private_key(&private_key.into());
        self
    }

    /// Load from the process environment.
    ///
    /// Returns `Ok(None)` when `SHEETS_SPREADSHEET_ID` is unset, meaning the
    /// mirror is disabled.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(spreadsheet_id) = var("SHEETS_SPREADSHEET_ID") else {
            return Ok(None);
        };
        let client_email = var("GOOGLE_CLIENT_EMAIL").ok_or_else(|| {
            Error::Config("GOOGLE_CLIENT_EMAIL is required when SHEETS_SPREADSHEET_ID is set".into())
        })?;
        let private_key = var("GOOGLE_PRIVATE_KEY").ok_or_else(|| {
            Error::Config("GOOGLE_PRIVATE_KEY is required when SHEETS_SPREADSHEET_ID is set".into())
        })?;

        let mut config = Self::new(spreadsheet_id).with_credentials(client_email, private_key);
        if let Some(tab) = var("SHEETS_TRANSACTIONS_TAB") {
            config.tab = tab;
        }
        if let Some(base) = var("SHEETS_API_BASE") {
            config.api_base = base;
        }
        if let Some(uri) = var("GOOGLE_TOKEN_URI") {
            config.token_uri = uri;
        }
        if let Some(secs) = var("SHEETS_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(Some(config))
    }
}

/// Keys pasted into env files usually carry literal `\n` sequences.
pub fn unescape_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
