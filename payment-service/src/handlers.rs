use bigdecimal::BigDecimal;
use chrono::Utc;
use num_traits::Zero;
use shared::{PaymentRequest, PaymentStatus, StkPushResponse};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::callback::ParsedCallback;
use crate::error::PaymentError;
use crate::models::*;
use crate::mpesa::{build_stk_push, MpesaClient};
use crate::store::{CallbackOutcome, PaymentStore};

const MAX_ACCOUNT_REFERENCE_LEN: usize = 12;
const MAX_TRANSACTION_DESC_LEN: usize = 13;
/// Largest value a NUMERIC(12, 2) column holds is just below this.
const AMOUNT_CEILING: u64 = 10_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// First delivery: the callback was recorded and the intent moved to `status`.
    Applied { intent_id: Uuid, status: PaymentStatus },
    /// A callback was already recorded for this acknowledgment. Nothing changed.
    DuplicateAccepted,
}

pub fn validate(request: &PaymentRequest) -> Result<(), PaymentError> {
    let phone = &request.phone_number;
    if !(9..=15).contains(&phone.len()) || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentError::Validation(
            "phone_number must be 9 to 15 digits".to_string(),
        ));
    }

    let amount = &request.amount;
    if amount <= &BigDecimal::zero() {
        return Err(PaymentError::Validation("amount must be positive".to_string()));
    }
    if amount.with_scale(2) != *amount {
        return Err(PaymentError::Validation(
            "amount must have at most two decimal places".to_string(),
        ));
    }
    if amount >= &BigDecimal::from(AMOUNT_CEILING) {
        return Err(PaymentError::Validation("amount is too large".to_string()));
    }

    check_text("account_reference", &request.account_reference, MAX_ACCOUNT_REFERENCE_LEN)?;
    check_text("transaction_desc", &request.transaction_desc, MAX_TRANSACTION_DESC_LEN)
}

fn check_text(field: &str, value: &str, max_len: usize) -> Result<(), PaymentError> {
    if value.trim().is_empty() {
        return Err(PaymentError::Validation(format!("{} must not be blank", field)));
    }
    if value.chars().count() > max_len {
        return Err(PaymentError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(())
}

/// Drives both halves of a payment: the synchronous STK push and the
/// asynchronous webhook that settles it.
#[derive(Clone)]
pub struct PaymentHandler<S> {
    store: S,
    gateway: MpesaClient,
}

impl<S: PaymentStore> PaymentHandler<S> {
    pub fn new(store: S, gateway: MpesaClient) -> Self {
        Self { store, gateway }
    }

    /// Persists a PENDING intent, then pushes it to the gateway. Gateway
    /// failures leave the intent PENDING with no acknowledgment.
    pub async fn submit(&self, request: PaymentRequest) -> Result<SubmittedPayment, PaymentError> {
        validate(&request)?;

        let intent = self.store.create_intent(NewPaymentIntent::pending(request)).await?;
        info!(intent_id = %intent.id, "Payment intent created");

        let credential = self.gateway.access_token().await.inspect_err(|e| {
            warn!(intent_id = %intent.id, "Credential exchange failed: {}", e);
        })?;

        let payload = build_stk_push(self.gateway.config(), &intent, Utc::now())?;
        let reply = self.gateway.submit(&payload, &credential).await.inspect_err(|e| {
            warn!(intent_id = %intent.id, "STK push failed: {}", e);
        })?;

        let response = StkPushResponse::from(&reply);
        let acknowledgment = self
            .store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(intent.id, response))
            .await
            .inspect_err(|e| {
                error!(intent_id = %intent.id, "Failed to store gateway acknowledgment: {}", e);
            })?;

        info!(
            intent_id = %intent.id,
            checkout_request_id = %acknowledgment.checkout_request_id,
            response_code = %acknowledgment.response_code,
            "STK push acknowledged"
        );

        Ok(SubmittedPayment {
            acknowledgment,
            request: intent,
            callback: None,
        })
    }

    pub async fn reconcile(&self, body: &[u8]) -> Result<ReconcileOutcome, PaymentError> {
        let callback = ParsedCallback::parse(body).inspect_err(|e| warn!("Rejected callback: {}", e))?;
        let checkout_request_id = callback.checkout_request_id.clone();

        let mut matches = self.store.find_acknowledgments(&checkout_request_id).await?;
        let acknowledgment = match matches.len() {
            0 => {
                warn!(%checkout_request_id, "Callback matches no acknowledgment");
                return Err(PaymentError::CallbackUnmatched(checkout_request_id));
            }
            1 => matches.remove(0),
            _ => {
                error!(%checkout_request_id, "Checkout request id is shared by several acknowledgments");
                return Err(PaymentError::CallbackAmbiguous(checkout_request_id));
            }
        };

        let intent_id = acknowledgment.intent_id;
        let status = PaymentStatus::from_result_code(callback.result_code);
        info!(
            %intent_id,
            %checkout_request_id,
            merchant_request_id = callback.merchant_request_id.as_deref().unwrap_or(""),
            result_code = ?callback.result_code,
            "Reconciling callback"
        );

        let record = callback.into_record(acknowledgment.id);
        match self.store.record_callback(intent_id, record, status).await? {
            CallbackOutcome::Recorded(record) => {
                info!(%intent_id, %status, callback_id = %record.id, "Payment intent settled");
                Ok(ReconcileOutcome::Applied { intent_id, status })
            }
            CallbackOutcome::AlreadyRecorded => {
                info!(%intent_id, %checkout_request_id, "Callback already processed");
                Ok(ReconcileOutcome::DuplicateAccepted)
            }
        }
    }

    pub async fn payment(&self, intent_id: Uuid) -> Result<PaymentIntentDetail, PaymentError> {
        self.store
            .intent_detail(intent_id)
            .await?
            .ok_or(PaymentError::NotFound(intent_id))
    }
}
