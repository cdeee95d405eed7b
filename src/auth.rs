use crate::error::{RelayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Azure instance metadata service token endpoint.
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com/";

/// Refresh when a cached token is this close to expiry.
const EXPIRY_SKEW_SECS: i64 = 300;

/// A thing that supplies a bearer token on demand. Lets the managed-identity
/// exchange be swapped for a static key in tests and non-cloud environments.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Static API key, used verbatim as the bearer credential.
pub struct StaticKeyProvider {
    key: String,
}

impl StaticKeyProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticKeyProvider {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.key.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ImdsTokenResponse {
    access_token: String,
    /// Unix timestamp, returned by IMDS as a string.
    expires_on: String,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_on: i64,
}

/// Exchanges with the Azure instance metadata service and caches the
/// resulting token until close to expiry.
pub struct ManagedIdentityProvider {
    http_client: reqwest::Client,
    token_url: String,
    resource: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ManagedIdentityProvider {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(IMDS_TOKEN_URL, COGNITIVE_SERVICES_RESOURCE)
    }

    pub fn with_endpoint(token_url: &str, resource: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Auth(format!("Failed to build token client: {}", e)))?;

        Ok(Self {
            http_client,
            token_url: token_url.to_string(),
            resource: resource.to_string(),
            cached: Mutex::new(None),
        })
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        debug!("Requesting managed identity token from {}", self.token_url);

        let response = self
            .http_client
            .get(&self.token_url)
            .query(&[
                ("api-version", IMDS_API_VERSION),
                ("resource", self.resource.as_str()),
            ])
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| RelayError::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RelayError::Auth(format!(
                "Token endpoint returned status {}",
                response.status()
            )));
        }

        let body: ImdsTokenResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Auth(format!("Malformed token response: {}", e)))?;

        let expires_on = body
            .expires_on
            .parse::<i64>()
            .map_err(|e| RelayError::Auth(format!("Invalid expires_on in token response: {}", e)))?;

        info!("Acquired managed identity token, expires_on={}", expires_on);
        Ok(CachedToken {
            token: body.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityProvider {
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(entry) = cached.as_ref() {
            if entry.expires_on - now > EXPIRY_SKEW_SECS {
                return Ok(entry.token.clone());
            }
            debug!("Cached token within expiry skew, refreshing");
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// A configured key wins, otherwise fall back to managed identity.
pub fn provider_from_config(api_key: Option<&str>) -> Result<Arc<dyn TokenProvider>> {
    match api_key {
        Some(key) => {
            info!("Using static API key credential");
            Ok(Arc::new(StaticKeyProvider::new(key)))
        }
        None => {
            info!("No API key configured, using managed identity credential");
            Ok(Arc::new(ManagedIdentityProvider::new()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_key_provider_returns_key() {
        let provider = StaticKeyProvider::new("sk-test");
        assert_eq!(provider.bearer_token().await.unwrap(), "sk-test");
    }

    #[tokio::test]
    async fn test_provider_selection_prefers_static_key() {
        let provider = provider_from_config(Some("sk-test")).unwrap();
        assert_eq!(provider.bearer_token().await.unwrap(), "sk-test");
    }

    #[tokio::test]
    async fn test_managed_identity_error_on_unreachable_endpoint() {
        let provider =
            ManagedIdentityProvider::with_endpoint("http://127.0.0.1:1/token", "https://r/")
                .unwrap();
        let err = provider.bearer_token().await.unwrap_err();
        assert!(matches!(err, RelayError::Auth(_)));
    }

    #[test]
    fn test_imds_response_parsing() {
        let body: ImdsTokenResponse = serde_json::from_str(
            r#"{"access_token": "abc", "expires_on": "1735689600", "token_type": "Bearer"}"#,
        )
        .unwrap();
        assert_eq!(body.access_token, "abc");
        assert_eq!(body.expires_on.parse::<i64>().unwrap(), 1735689600);
    }
}
