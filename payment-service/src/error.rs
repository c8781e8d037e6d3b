use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid payment request: {0}")]
    Validation(String),

    /// Token exchange failed; `body` is the upstream response for diagnosis.
    #[error("gateway credential exchange failed (status {}): {body}", display_status(.status))]
    UpstreamAuth { status: Option<u16>, body: String },

    #[error("gateway submission failed (status {}): {body}", display_status(.status))]
    UpstreamRequest { status: Option<u16>, body: String },

    #[error("malformed callback: {0}")]
    CallbackMalformed(String),

    #[error("no acknowledgment matches CheckoutRequestID {0}")]
    CallbackUnmatched(String),

    #[error("multiple acknowledgments match CheckoutRequestID {0}")]
    CallbackAmbiguous(String),

    #[error("payment intent {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) | PaymentError::CallbackMalformed(_) => StatusCode::BAD_REQUEST,
            PaymentError::UpstreamAuth { .. } | PaymentError::UpstreamRequest { .. } => StatusCode::BAD_GATEWAY,
            PaymentError::CallbackUnmatched(_) | PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::CallbackAmbiguous(_) | PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "Invalid payment request",
            PaymentError::UpstreamAuth { .. } | PaymentError::UpstreamRequest { .. } => {
                "Failed to initiate STK Push"
            }
            PaymentError::CallbackMalformed(_) => "Callback data missing or malformed",
            PaymentError::CallbackUnmatched(_) => "Related acknowledgment not found for this callback",
            PaymentError::CallbackAmbiguous(_) => "Multiple matching acknowledgments found. Ambiguous callback.",
            PaymentError::NotFound(_) => "Payment not found",
            PaymentError::Store(_) => "Unexpected error",
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            PaymentError::Store(e) => {
                error!("Storage failure: {}", e);
                None
            }
            other => Some(other.to_string()),
        };

        let body = ErrorResponse {
            error: self.summary().to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
