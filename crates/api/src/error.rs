//! API error responses
//!
//! Maps billing errors onto the HTTP statuses the two callers rely on: the
//! storefront gets 400/500 with a JSON body, and the payment provider reads
//! any 5xx on the webhook as "redeliver later".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use serrapro_billing::BillingError;

pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            BillingError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            BillingError::Gateway { status, message } => {
                tracing::error!(upstream_status = ?status, error = %message, "gateway call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "payment gateway request failed",
                        "detail": message,
                    })),
                )
                    .into_response()
            }
            BillingError::Store(message) => {
                tracing::error!(error = %message, "entitlement store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "persistence failure",
                        "detail": message,
                    })),
                )
                    .into_response()
            }
            err @ BillingError::MissingCorrelation { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            BillingError::Config(message) => {
                tracing::error!(error = %message, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "server misconfiguration" })),
                )
                    .into_response()
            }
        }
    }
}
