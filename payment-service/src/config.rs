use std::fmt;
use std::time::Duration;

pub const CALLBACK_PATH: &str = "/payments/callback";
const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
}

/// Gateway settings, built once at startup and handed to each component.
#[derive(Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub short_code: String,
    pub passkey: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Public base URL of this service; the gateway posts webhooks under it.
    pub callback_base_url: String,
    pub timeout: Duration,
    pub cache_credentials: bool,
}

impl MpesaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("MPESA_BASE_URL", &self.base_url),
            ("MPESA_SHORTCODE", &self.short_code),
            ("MPESA_PASSKEY", &self.passkey),
            ("MPESA_CONSUMER_KEY", &self.consumer_key),
            ("MPESA_CONSUMER_SECRET", &self.consumer_secret),
            ("MPESA_CALLBACK_URL", &self.callback_base_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }

    pub fn callback_url(&self) -> String {
        format!("{}{}", self.callback_base_url.trim_end_matches('/'), CALLBACK_PATH)
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), TOKEN_PATH)
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), STK_PUSH_PATH)
    }
}

impl fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("base_url", &self.base_url)
            .field("short_code", &self.short_code)
            .field("passkey", &"<redacted>")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("callback_base_url", &self.callback_base_url)
            .field("timeout", &self.timeout)
            .field("cache_credentials", &self.cache_credentials)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> MpesaConfig {
    MpesaConfig {
        base_url: base_url.to_string(),
        short_code: "174379".to_string(),
        passkey: "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919".to_string(),
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        callback_base_url: "https://shop.example.com/".to_string(),
        timeout: Duration::from_secs(2),
        cache_credentials: false,
    }
}
