use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use shared::AccessTokenResponse;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::MpesaConfig;
use crate::error::PaymentError;

/// Cached tokens are dropped this long before the gateway says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Exchanges the consumer key/secret for a bearer token.
pub struct CredentialProvider {
    http: Client,
    config: Arc<MpesaConfig>,
    cache: Mutex<Option<CachedToken>>,
}

impl CredentialProvider {
    pub fn new(http: Client, config: Arc<MpesaConfig>) -> Self {
        Self {
            http,
            config,
            cache: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, PaymentError> {
        if !self.config.cache_credentials {
            return self.fetch().await.map(|(token, _)| token);
        }

        // Held across the fetch so concurrent submissions share one exchange.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.expires_at > Instant::now()) {
            return Ok(cached.token.clone());
        }

        let (token, lifetime) = self.fetch().await?;
        *cache = lifetime
            .and_then(|lifetime| lifetime.checked_sub(EXPIRY_MARGIN))
            .filter(|usable| !usable.is_zero())
            .map(|usable| CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + usable,
            });
        Ok(token)
    }

    async fn fetch(&self) -> Result<(String, Option<Duration>), PaymentError> {
        let response = self
            .http
            .get(self.config.token_url())
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| PaymentError::UpstreamAuth {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PaymentError::UpstreamAuth {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Token request rejected");
            return Err(PaymentError::UpstreamAuth {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: AccessTokenResponse = serde_json::from_str(&body).unwrap_or_default();
        let lifetime = parsed.expires_in_secs().map(Duration::from_secs);
        match parsed.access_token.filter(|token| !token.is_empty()) {
            Some(token) => {
                info!("Obtained gateway access token");
                Ok((token, lifetime))
            }
            None => Err(PaymentError::UpstreamAuth {
                status: Some(status.as_u16()),
                body,
            }),
        }
    }
}
