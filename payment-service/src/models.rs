use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use shared::{PaymentRequest, PaymentStatus, StkPushResponse, UnknownStatus};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::payment_intents)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub account_reference: String,
    pub transaction_desc: String,
    pub status: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn status(&self) -> Result<PaymentStatus, UnknownStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payment_intents)]
pub struct NewPaymentIntent {
    pub id: Uuid,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub account_reference: String,
    pub transaction_desc: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl NewPaymentIntent {
    /// A fresh PENDING intent. Callers validate the request first.
    pub fn pending(request: PaymentRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: request.phone_number,
            amount: request.amount,
            account_reference: request.account_reference,
            transaction_desc: request.transaction_desc,
            status: PaymentStatus::Pending.as_str().to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(PaymentIntent, foreign_key = intent_id))]
#[diesel(table_name = crate::schema::gateway_acknowledgments)]
pub struct GatewayAcknowledgment {
    pub id: Uuid,
    pub intent_id: Uuid,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    pub customer_message: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::gateway_acknowledgments)]
pub struct NewGatewayAcknowledgment {
    pub id: Uuid,
    pub intent_id: Uuid,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    pub customer_message: String,
    pub created_at: DateTime<Utc>,
}

impl NewGatewayAcknowledgment {
    pub fn from_response(intent_id: Uuid, response: StkPushResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent_id,
            merchant_request_id: response.merchant_request_id,
            checkout_request_id: response.checkout_request_id,
            response_code: response.response_code,
            response_description: response.response_description,
            customer_message: response.customer_message,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(GatewayAcknowledgment, foreign_key = acknowledgment_id))]
#[diesel(table_name = crate::schema::callback_records)]
pub struct CallbackRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub acknowledgment_id: Uuid,
    pub result_code: Option<i64>,
    pub result_description: String,
    #[serde(rename = "mpesa_receipt_number")]
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub amount: Option<BigDecimal>,
    #[serde(skip_serializing)]
    pub metadata: Option<serde_json::Value>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::callback_records)]
pub struct NewCallbackRecord {
    pub id: Uuid,
    pub acknowledgment_id: Uuid,
    pub result_code: Option<i64>,
    pub result_description: String,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Reply of `POST /payments`: the acknowledgment with its intent nested under
/// `request`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedPayment {
    #[serde(flatten)]
    pub acknowledgment: GatewayAcknowledgment,
    pub request: PaymentIntent,
    pub callback: Option<CallbackRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcknowledgmentDetail {
    #[serde(flatten)]
    pub acknowledgment: GatewayAcknowledgment,
    pub callback: Option<CallbackRecord>,
}

/// Reply of `GET /payments/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntentDetail {
    #[serde(flatten)]
    pub intent: PaymentIntent,
    pub acknowledgment: Option<AcknowledgmentDetail>,
}
