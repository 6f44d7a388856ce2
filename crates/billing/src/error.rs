//! Billing error types

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by checkout creation and payment reconciliation.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Caller supplied an invalid checkout request. Raised before any
    /// network call and never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The payment gateway rejected a call or was unreachable.
    #[error("gateway error (status {status:?}): {message}")]
    Gateway {
        status: Option<u16>,
        message: String,
    },

    /// The entitlement store failed to read or persist state.
    #[error("store error: {0}")]
    Store(String),

    /// An approved payment carries no correlation token, so there is no
    /// user to activate. Surfaced as a failed reconciliation and logged
    /// with the payment id for manual follow-up.
    #[error("payment {payment_id} is approved but carries no correlation token")]
    MissingCorrelation { payment_id: String },

    /// Missing or malformed environment configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Gateway {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
