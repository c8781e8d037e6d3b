use std::future::Future;

use shared::PaymentStatus;
use uuid::Uuid;

use crate::models::*;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::{DbPool, PgStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A uniqueness or lifecycle rule was violated. Never retried.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of trying to attach a callback to an acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Recorded(CallbackRecord),
    AlreadyRecorded,
}

/// Persistence for intents, acknowledgments and callback records.
pub trait PaymentStore: Clone + Send + Sync + 'static {
    fn create_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> impl Future<Output = Result<PaymentIntent, StoreError>> + Send;

    /// Fails with [`StoreError::Integrity`] if the checkout-request id is
    /// already taken or the intent already has an acknowledgment.
    fn create_acknowledgment(
        &self,
        acknowledgment: NewGatewayAcknowledgment,
    ) -> impl Future<Output = Result<GatewayAcknowledgment, StoreError>> + Send;

    /// Returns at most two rows, enough to tell a unique match from an
    /// ambiguous one.
    fn find_acknowledgments(
        &self,
        checkout_request_id: &str,
    ) -> impl Future<Output = Result<Vec<GatewayAcknowledgment>, StoreError>> + Send;

    /// Inserts the callback unless the acknowledgment already owns one, and in
    /// the same atomic unit moves the owning intent from PENDING to `status`.
    fn record_callback(
        &self,
        intent_id: Uuid,
        record: NewCallbackRecord,
        status: PaymentStatus,
    ) -> impl Future<Output = Result<CallbackOutcome, StoreError>> + Send;

    fn intent_detail(
        &self,
        intent_id: Uuid,
    ) -> impl Future<Output = Result<Option<PaymentIntentDetail>, StoreError>> + Send;
}
