//! Entra ID client-credentials authentication.

use crate::config::AdtSourceConfig;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// OAuth scope for the Digital Twins data plane.
pub const DIGITAL_TWINS_SCOPE: &str = "https://digitaltwins.azure.net/.default";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Supplies bearer tokens for the Digital Twins API.
pub trait TokenProvider: Send + Sync {
    /// Returns a valid bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if a token cannot be obtained.
    fn token(&self) -> Result<SecretString>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

/// Client-secret credential for a service principal.
///
/// Tokens are cached and reused until shortly before they expire.
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    scope: String,
    http: reqwest::blocking::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    /// Creates a credential from source settings.
    #[must_use]
    pub fn new(config: &AdtSourceConfig, http: reqwest::blocking::Client) -> Self {
        Self {
            authority_host: config.authority_host.trim_end_matches('/').to_string(),
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: DIGITAL_TWINS_SCOPE.to_string(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// Token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }

    fn request_token(&self) -> Result<CachedToken> {
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .map_err(|e| Error::extraction("authenticate", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::extraction(
                "authenticate",
                format!("token endpoint returned status: {status} - {body}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| Error::extraction("authenticate", e))?;
        tracing::debug!(expires_in = token.expires_in, "Acquired Digital Twins token");

        Ok(CachedToken {
            value: SecretString::from(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

impl TokenProvider for ClientSecretCredential {
    fn token(&self) -> Result<SecretString> {
        let mut guard = self
            .cached
            .lock()
            .map_err(|e| Error::operation("token_cache_lock", e))?;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() + EXPIRY_MARGIN {
                return Ok(cached.value.clone());
            }
        }

        let fresh = self.request_token()?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }
}

/// Fixed token, for tests and pre-authenticated environments.
pub struct StaticToken(SecretString);

impl StaticToken {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Result<SecretString> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> AdtSourceConfig {
        AdtSourceConfig {
            url: "https://adt.example.net".to_string(),
            tenant_id: "contoso".to_string(),
            client_id: "app".to_string(),
            client_secret: SecretString::from("s3cret".to_string()),
            authority_host: "https://login.example.com/".to_string(),
        }
    }

    #[test]
    fn test_token_url() {
        let credential = ClientSecretCredential::new(&source(), reqwest::blocking::Client::new());
        assert_eq!(
            credential.token_url(),
            "https://login.example.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_cached_token_is_reused() {
        let credential = ClientSecretCredential::new(&source(), reqwest::blocking::Client::new());
        *credential.cached.lock().unwrap() = Some(CachedToken {
            value: SecretString::from("cached".to_string()),
            expires_at: Instant::now() + Duration::from_secs(3600),
        });
        assert_eq!(credential.token().unwrap().expose_secret(), "cached");
    }

    #[test]
    fn test_static_token() {
        let token = StaticToken::new("abc");
        assert_eq!(token.token().unwrap().expose_secret(), "abc");
    }
}
