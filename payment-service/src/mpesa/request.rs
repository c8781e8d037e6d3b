use base64::{engine::general_purpose::STANDARD, Engine as _};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use num_traits::ToPrimitive;
use serde_json::Number;
use shared::{StkPushRequest, TRANSACTION_TYPE_PAYBILL};

use crate::config::MpesaConfig;
use crate::error::PaymentError;
use crate::models::PaymentIntent;

pub const GATEWAY_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// The gateway runs on East Africa Time (UTC+3, no DST).
const GATEWAY_UTC_OFFSET_HOURS: i64 = 3;

fn to_gateway_time(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.naive_utc() + Duration::hours(GATEWAY_UTC_OFFSET_HOURS)
}

/// Interprets a gateway wall-clock time as an instant.
pub fn from_gateway_time(local: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(local - Duration::hours(GATEWAY_UTC_OFFSET_HOURS)))
}

/// `YYYYMMDDHHmmss` in gateway time.
pub fn gateway_timestamp(now: DateTime<Utc>) -> String {
    to_gateway_time(now).format(GATEWAY_TIME_FORMAT).to_string()
}

/// base64(shortcode ∥ passkey ∥ timestamp)
pub fn password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

/// Whole amounts go out as integers, anything else as a float.
fn plain_amount(amount: &BigDecimal) -> Option<Number> {
    if amount.with_scale(0) == *amount {
        amount.to_u64().map(Number::from)
    } else {
        amount.to_f64().and_then(Number::from_f64)
    }
}

pub fn build_stk_push(
    config: &MpesaConfig,
    intent: &PaymentIntent,
    now: DateTime<Utc>,
) -> Result<StkPushRequest, PaymentError> {
    let amount = plain_amount(&intent.amount).ok_or_else(|| {
        PaymentError::Validation(format!("amount {} cannot be sent to the gateway", intent.amount))
    })?;
    let timestamp = gateway_timestamp(now);

    Ok(StkPushRequest {
        business_short_code: config.short_code.clone(),
        password: password(&config.short_code, &config.passkey, &timestamp),
        timestamp,
        transaction_type: TRANSACTION_TYPE_PAYBILL.to_string(),
        amount,
        party_a: intent.phone_number.clone(),
        party_b: config.short_code.clone(),
        phone_number: intent.phone_number.clone(),
        callback_url: config.callback_url(),
        account_reference: intent.account_reference.clone(),
        transaction_desc: intent.transaction_desc.clone(),
    })
}
