use crate::config::CredentialsConfig;
use crate::errors::CredentialError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, CredentialError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client-credentials grant against the identity platform v2 endpoint.
pub struct ClientSecretCredential {
    client: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        authority: &Url,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &Url,
    ) -> Result<Self, CredentialError> {
        let token_url = authority
            .join(&format!("{tenant_id}/oauth2/v2.0/token"))
            .map_err(|e| CredentialError::InvalidEndpoint(e.to_string()))?;

        Ok(ClientSecretCredential {
            client: reqwest::Client::new(),
            token_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: format!("{}/.default", resource.as_str().trim_end_matches('/')),
            cached: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<TokenResponse, CredentialError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Status { status, body });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let response = self.request_token().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(expires_in = response.expires_in, "Acquired access token");

        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }
}

pub fn from_config(
    config: &CredentialsConfig,
    resource: &Url,
) -> Result<Arc<dyn TokenProvider>, CredentialError> {
    match config {
        CredentialsConfig::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
            authority,
        } => Ok(Arc::new(ClientSecretCredential::new(
            authority,
            tenant_id,
            client_id,
            client_secret,
            resource,
        )?)),
        CredentialsConfig::StaticToken { token } => Ok(Arc::new(StaticToken::new(token.clone()))),
    }
}
