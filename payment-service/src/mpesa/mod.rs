//! Outbound side of the gateway integration: token exchange, STK push
//! payload construction and submission.

mod client;
mod credentials;
mod request;

pub use client::MpesaClient;
pub use credentials::CredentialProvider;
pub use request::{build_stk_push, from_gateway_time, GATEWAY_TIME_FORMAT};
