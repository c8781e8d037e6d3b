use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use shared::{MetadataItem, StkCallback};
use uuid::Uuid;

use crate::error::PaymentError;
use crate::models::NewCallbackRecord;
use crate::mpesa::{from_gateway_time, GATEWAY_TIME_FORMAT};

/// Named `CallbackMetadata` entries we keep. Anything else is ignored, and a
/// missing or unparsable entry is `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentMetadata {
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub amount: Option<BigDecimal>,
}

impl PaymentMetadata {
    pub fn from_items(items: &[MetadataItem]) -> Self {
        let mut metadata = Self::default();
        for item in items {
            let Some(name) = item.name() else {
                continue;
            };
            let value = item.value.as_ref();
            match name {
                "MpesaReceiptNumber" => metadata.receipt_number = value.and_then(scalar_string),
                "TransactionDate" => {
                    metadata.transaction_date = value
                        .and_then(scalar_string)
                        .and_then(|raw| NaiveDateTime::parse_from_str(&raw, GATEWAY_TIME_FORMAT).ok())
                        .map(from_gateway_time)
                }
                "PhoneNumber" => metadata.phone_number = value.and_then(scalar_string),
                "Amount" => {
                    metadata.amount = value
                        .and_then(scalar_string)
                        .and_then(|raw| BigDecimal::from_str(&raw).ok())
                }
                _ => {}
            }
        }
        metadata
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A webhook body reduced to the fields reconciliation needs.
#[derive(Debug, Clone)]
pub struct ParsedCallback {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    /// `None` when the gateway omitted it or sent something non-numeric.
    pub result_code: Option<i64>,
    pub result_description: String,
    pub metadata: PaymentMetadata,
    pub raw_metadata: Option<Value>,
}

impl ParsedCallback {
    pub fn parse(body: &[u8]) -> Result<Self, PaymentError> {
        let envelope: Value = serde_json::from_slice(body)
            .map_err(|e| PaymentError::CallbackMalformed(format!("body is not JSON: {}", e)))?;

        let stk_callback = envelope
            .get("Body")
            .and_then(|b| b.get("stkCallback"))
            .filter(|c| c.is_object())
            .ok_or_else(|| PaymentError::CallbackMalformed("Body.stkCallback missing".to_string()))?;

        let raw_metadata = stk_callback.get("CallbackMetadata").filter(|m| !m.is_null()).cloned();
        let callback: StkCallback = serde_json::from_value(stk_callback.clone())
            .map_err(|e| PaymentError::CallbackMalformed(format!("unexpected stkCallback shape: {}", e)))?;

        let checkout_request_id = callback
            .checkout_request_id()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PaymentError::CallbackMalformed("CheckoutRequestID missing".to_string()))?;

        Ok(Self {
            metadata: PaymentMetadata::from_items(&callback.metadata_items()),
            merchant_request_id: callback.merchant_request_id(),
            checkout_request_id,
            result_code: callback.result_code(),
            result_description: callback.result_desc().unwrap_or_default(),
            raw_metadata,
        })
    }

    pub fn into_record(self, acknowledgment_id: Uuid) -> NewCallbackRecord {
        NewCallbackRecord {
            id: Uuid::new_v4(),
            acknowledgment_id,
            result_code: self.result_code,
            result_description: self.result_description,
            receipt_number: self.metadata.receipt_number,
            transaction_date: self.metadata.transaction_date,
            phone_number: self.metadata.phone_number,
            amount: self.metadata.amount,
            metadata: self.raw_metadata,
            created_at: Utc::now(),
        }
    }
}
