//! Checkout and webhook endpoints

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use serrapro_billing::{BillingError, CheckoutResponse, PlanCheckout, ReconcileOutcome};

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /create-preference`.
///
/// Fields are optional at the serde level so a missing field produces this
/// API's own 400 JSON error instead of a generic extractor rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreferenceRequest {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `POST /create-preference` - create a checkout session for a plan.
pub async fn create_preference(
    State(state): State<AppState>,
    Json(body): Json<CreatePreferenceRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Some(price) = body.price else {
        return Err(BillingError::InvalidRequest("price is required".into()).into());
    };
    let plan = PlanCheckout {
        plan_id: body.plan_id.unwrap_or_default(),
        title: body.title.unwrap_or_default(),
        price,
    };
    let user_id = body.user_id.unwrap_or_default();

    let response = state
        .billing
        .checkout
        .create_preference(&plan, &user_id)
        .await?;
    Ok(Json(response))
}

/// `POST /webhook` - provider payment notifications.
///
/// Responds 200 for every acknowledged outcome (applied, duplicate, or
/// ignored) and 500 when reconciliation failed, which is the provider's
/// signal to redeliver the notification later.
///
/// The body is read as raw text and parsed leniently: redelivery cannot fix
/// an unparseable delivery, so it is acknowledged as ignored instead of
/// rejected by the extractor.
pub async fn webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let Ok(event) = serde_json::from_str::<Value>(&body) else {
        tracing::warn!("unparseable webhook body - acknowledging as ignored");
        return Ok(Json(json!({ "status": "ignored" })));
    };

    let outcome = state.billing.webhooks.handle_event(&event).await?;

    let response = match &outcome {
        ReconcileOutcome::Applied(entitlement) => json!({
            "status": "applied",
            "user_id": entitlement.user_id,
        }),
        ReconcileOutcome::AlreadyApplied => json!({ "status": "already_applied" }),
        ReconcileOutcome::Ignored(_) => json!({ "status": "ignored" }),
    };
    Ok(Json(response))
}
