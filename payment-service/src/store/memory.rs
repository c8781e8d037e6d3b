use std::collections::HashMap;
use std::sync::Arc;

use shared::PaymentStatus;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CallbackOutcome, PaymentStore, StoreError};
use crate::models::*;

#[derive(Default)]
struct Tables {
    intents: HashMap<Uuid, PaymentIntent>,
    acknowledgments: Vec<GatewayAcknowledgment>,
    callbacks: Vec<CallbackRecord>,
}

/// In-process store with the same uniqueness rules as the Postgres schema.
/// Every operation runs under one lock, so each is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn intent_count(&self) -> usize {
        self.tables.lock().await.intents.len()
    }

    pub async fn acknowledgment_count(&self) -> usize {
        self.tables.lock().await.acknowledgments.len()
    }

    pub async fn callback_count(&self) -> usize {
        self.tables.lock().await.callbacks.len()
    }

    pub async fn intent(&self, id: Uuid) -> Option<PaymentIntent> {
        self.tables.lock().await.intents.get(&id).cloned()
    }

    /// Inserts a row bypassing the uniqueness checks, to reach states the
    /// real schema forbids.
    pub async fn force_acknowledgment(&self, acknowledgment: GatewayAcknowledgment) {
        self.tables.lock().await.acknowledgments.push(acknowledgment);
    }
}

impl PaymentStore for MemoryStore {
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.intents.contains_key(&intent.id) {
            return Err(StoreError::Integrity(format!("payment intent {} exists", intent.id)));
        }

        let created = PaymentIntent {
            id: intent.id,
            phone_number: intent.phone_number,
            amount: intent.amount,
            account_reference: intent.account_reference,
            transaction_desc: intent.transaction_desc,
            status: intent.status,
            created_at: intent.created_at,
        };
        tables.intents.insert(created.id, created.clone());
        Ok(created)
    }

    async fn create_acknowledgment(
        &self,
        acknowledgment: NewGatewayAcknowledgment,
    ) -> Result<GatewayAcknowledgment, StoreError> {
        let mut tables = self.tables.lock().await;

        if !tables.intents.contains_key(&acknowledgment.intent_id) {
            return Err(StoreError::Integrity(format!(
                "intent {} does not exist",
                acknowledgment.intent_id
            )));
        }
        let clash = tables.acknowledgments.iter().any(|existing| {
            existing.intent_id == acknowledgment.intent_id
                || (!acknowledgment.checkout_request_id.is_empty()
                    && existing.checkout_request_id == acknowledgment.checkout_request_id)
        });
        if clash {
            return Err(StoreError::Integrity(format!(
                "gateway acknowledgment: duplicate key for checkout request {:?}",
                acknowledgment.checkout_request_id
            )));
        }

        let created = GatewayAcknowledgment {
            id: acknowledgment.id,
            intent_id: acknowledgment.intent_id,
            merchant_request_id: acknowledgment.merchant_request_id,
            checkout_request_id: acknowledgment.checkout_request_id,
            response_code: acknowledgment.response_code,
            response_description: acknowledgment.response_description,
            customer_message: acknowledgment.customer_message,
            created_at: acknowledgment.created_at,
        };
        tables.acknowledgments.push(created.clone());
        Ok(created)
    }

    async fn find_acknowledgments(
        &self,
        checkout_request_id: &str,
    ) -> Result<Vec<GatewayAcknowledgment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .acknowledgments
            .iter()
            .filter(|a| a.checkout_request_id == checkout_request_id)
            .take(2)
            .cloned()
            .collect())
    }

    async fn record_callback(
        &self,
        intent_id: Uuid,
        record: NewCallbackRecord,
        status: PaymentStatus,
    ) -> Result<CallbackOutcome, StoreError> {
        let mut tables = self.tables.lock().await;

        if tables
            .callbacks
            .iter()
            .any(|c| c.acknowledgment_id == record.acknowledgment_id)
        {
            return Ok(CallbackOutcome::AlreadyRecorded);
        }

        let intent = tables
            .intents
            .get_mut(&intent_id)
            .filter(|intent| intent.status == PaymentStatus::Pending.as_str())
            .ok_or_else(|| StoreError::Integrity(format!("intent {} is not PENDING", intent_id)))?;
        intent.status = status.as_str().to_string();

        let created = CallbackRecord {
            id: record.id,
            acknowledgment_id: record.acknowledgment_id,
            result_code: record.result_code,
            result_description: record.result_description,
            receipt_number: record.receipt_number,
            transaction_date: record.transaction_date,
            phone_number: record.phone_number,
            amount: record.amount,
            metadata: record.metadata,
            created_at: record.created_at,
        };
        tables.callbacks.push(created.clone());
        Ok(CallbackOutcome::Recorded(created))
    }

    async fn intent_detail(&self, intent_id: Uuid) -> Result<Option<PaymentIntentDetail>, StoreError> {
        let tables = self.tables.lock().await;

        let Some(intent) = tables.intents.get(&intent_id).cloned() else {
            return Ok(None);
        };
        let acknowledgment = tables
            .acknowledgments
            .iter()
            .find(|a| a.intent_id == intent_id)
            .cloned()
            .map(|acknowledgment| {
                let callback = tables
                    .callbacks
                    .iter()
                    .find(|c| c.acknowledgment_id == acknowledgment.id)
                    .cloned();
                AcknowledgmentDetail { acknowledgment, callback }
            });

        Ok(Some(PaymentIntentDetail { intent, acknowledgment }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use shared::{PaymentRequest, StkPushResponse};

    fn pending_intent() -> NewPaymentIntent {
        NewPaymentIntent::pending(PaymentRequest {
            phone_number: "254700000000".to_string(),
            amount: BigDecimal::from(100),
            account_reference: "INV1".to_string(),
            transaction_desc: "test".to_string(),
        })
    }

    fn response(checkout_request_id: &str) -> StkPushResponse {
        StkPushResponse {
            checkout_request_id: checkout_request_id.to_string(),
            ..StkPushResponse::default()
        }
    }

    #[tokio::test]
    async fn checkout_request_id_is_unique() {
        let store = MemoryStore::new();
        let first = store.create_intent(pending_intent()).await.unwrap();
        let second = store.create_intent(pending_intent()).await.unwrap();

        store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(first.id, response("C1")))
            .await
            .unwrap();
        let clash = store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(second.id, response("C1")))
            .await;

        assert!(matches!(clash, Err(StoreError::Integrity(_))));
        assert_eq!(store.acknowledgment_count().await, 1);
    }

    #[tokio::test]
    async fn empty_checkout_request_ids_do_not_clash() {
        let store = MemoryStore::new();
        for _ in 0..2 {
            let intent = store.create_intent(pending_intent()).await.unwrap();
            store
                .create_acknowledgment(NewGatewayAcknowledgment::from_response(intent.id, response("")))
                .await
                .unwrap();
        }
        assert_eq!(store.acknowledgment_count().await, 2);
    }

    #[tokio::test]
    async fn intent_owns_at_most_one_acknowledgment() {
        let store = MemoryStore::new();
        let intent = store.create_intent(pending_intent()).await.unwrap();

        store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(intent.id, response("C1")))
            .await
            .unwrap();
        let again = store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(intent.id, response("C2")))
            .await;

        assert!(matches!(again, Err(StoreError::Integrity(_))));
    }
}
