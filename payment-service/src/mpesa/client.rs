use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use shared::StkPushRequest;
use tracing::{info, warn};

use super::CredentialProvider;
use crate::config::MpesaConfig;
use crate::error::PaymentError;

/// HTTP client for the gateway. Calls are bounded by the configured timeout
/// and never retried: a resent STK push may charge the payer twice.
#[derive(Clone)]
pub struct MpesaClient {
    http: Client,
    config: Arc<MpesaConfig>,
    credentials: Arc<CredentialProvider>,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;
        let config = Arc::new(config);
        let credentials = Arc::new(CredentialProvider::new(http.clone(), config.clone()));

        Ok(Self { http, config, credentials })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    pub async fn access_token(&self) -> Result<String, PaymentError> {
        self.credentials.access_token().await
    }

    /// Submits an STK push and returns the gateway's JSON reply as-is.
    pub async fn submit(&self, payload: &StkPushRequest, credential: &str) -> Result<Value, PaymentError> {
        info!(
            callback_url = %payload.callback_url,
            account_reference = %payload.account_reference,
            "Submitting STK push"
        );

        let response = self
            .http
            .post(self.config.stk_push_url())
            .bearer_auth(credential)
            .json(payload)
            .send()
            .await
            .map_err(|e| PaymentError::UpstreamRequest {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PaymentError::UpstreamRequest {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "STK push rejected");
            return Err(PaymentError::UpstreamRequest {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| PaymentError::UpstreamRequest {
            status: Some(status.as_u16()),
            body,
        })
    }
}
