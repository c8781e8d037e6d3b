use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The only transaction type the gateway accepts for paybill STK pushes.
pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";

/// `ResultCode` reported by the gateway when the payer completed the payment.
pub const RESULT_CODE_SUCCESS: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Terminal status implied by a callback result code. Only the success
    /// code settles SUCCESS; an absent code is a failure.
    pub fn from_result_code(result_code: Option<i64>) -> Self {
        if result_code == Some(RESULT_CODE_SUCCESS) {
            PaymentStatus::Success
        } else {
            PaymentStatus::Failed
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown payment status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Body of `POST /payments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub phone_number: String,
    #[serde(deserialize_with = "decimal_amount")]
    pub amount: BigDecimal,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Reads an amount from a JSON number or string through its decimal text,
/// so `99.99` is exactly `99.99` and not the nearest binary float.
fn decimal_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    let text = match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s,
    };
    BigDecimal::from_str(text.trim()).map_err(serde::de::Error::custom)
}

/// Stringifies a scalar webhook field; `null` is `None`.
fn lenient_string(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reply of the gateway's client-credential token endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Seconds; the gateway sends it as a string, some proxies as a number.
    #[serde(default)]
    pub expires_in: Option<Value>,
}

impl AccessTokenResponse {
    pub fn expires_in_secs(&self) -> Option<u64> {
        match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: serde_json::Number,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Synchronous acknowledgment of an STK push. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

impl From<&Value> for StkPushResponse {
    /// Lenient extraction: scalars of any type are stringified, anything
    /// missing becomes `""`.
    fn from(value: &Value) -> Self {
        let field = |name: &str| match value.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        };

        Self {
            merchant_request_id: field("MerchantRequestID"),
            checkout_request_id: field("CheckoutRequestID"),
            response_code: field("ResponseCode"),
            response_description: field("ResponseDescription"),
            customer_message: field("CustomerMessage"),
        }
    }
}

/// The `Body.stkCallback` object of a gateway webhook. Every field is kept
/// as raw JSON so an odd type never rejects the whole notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<Value>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<Value>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<Value>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<Value>,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<Value>,
}

impl StkCallback {
    pub fn merchant_request_id(&self) -> Option<String> {
        lenient_string(&self.merchant_request_id)
    }

    pub fn checkout_request_id(&self) -> Option<String> {
        lenient_string(&self.checkout_request_id)
    }

    pub fn result_desc(&self) -> Option<String> {
        lenient_string(&self.result_desc)
    }

    /// `ResultCode` as an integer. The gateway sends a number; numeric
    /// strings and integral floats such as `0.0` are accepted too.
    pub fn result_code(&self) -> Option<i64> {
        match self.result_code.as_ref()? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Entries of `CallbackMetadata.Item`. Entries that are not objects
    /// are dropped.
    pub fn metadata_items(&self) -> Vec<MetadataItem> {
        self.callback_metadata
            .as_ref()
            .and_then(|m| m.get("Item"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name", default)]
    pub name: Option<Value>,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl MetadataItem {
    pub fn new(name: &str, value: Value) -> Self {
        Self {
            name: Some(Value::String(name.to_string())),
            value: Some(value),
        }
    }

    /// `None` for nameless entries, which carry nothing we can use.
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref()?.as_str()
    }
}
