//! Checkout preference building

use std::sync::Arc;

use serde::Serialize;

use crate::client::{BackUrls, PaymentGateway, PreferenceItem, PreferenceRequest};
use crate::error::{BillingError, BillingResult};

/// Currency all plans are priced in.
const CURRENCY_ID: &str = "BRL";

/// A plan the storefront asks to check out.
#[derive(Debug, Clone)]
pub struct PlanCheckout {
    pub plan_id: String,
    pub title: String,
    pub price: f64,
}

/// Gateway-assigned checkout session id, returned to the storefront.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub id: String,
}

/// Builds and submits checkout preferences.
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    back_urls: BackUrls,
}

impl CheckoutService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, back_urls: BackUrls) -> Self {
        Self { gateway, back_urls }
    }

    /// Build and submit a one-item checkout preference for `user_id`.
    ///
    /// The raw user id rides the preference's `external_reference`, the
    /// provider's dedicated opaque reference field, so the payment record
    /// this session eventually produces can be correlated back to the user
    /// during webhook reconciliation.
    ///
    /// Input violations fail with `InvalidRequest` before any network call.
    /// Gateway failures are not retried here: without an idempotency key a
    /// blind retry could create a second session.
    pub async fn create_preference(
        &self,
        plan: &PlanCheckout,
        user_id: &str,
    ) -> BillingResult<CheckoutResponse> {
        validate(plan, user_id)?;

        let request = PreferenceRequest {
            items: vec![PreferenceItem {
                id: plan.plan_id.clone(),
                title: format!("Plano {} - Serralheria PRO", plan.title),
                quantity: 1,
                unit_price: plan.price,
                currency_id: CURRENCY_ID.to_string(),
            }],
            external_reference: user_id.to_string(),
            back_urls: self.back_urls.clone(),
            auto_return: (!self.back_urls.success.is_empty()).then(|| "approved".to_string()),
        };

        let preference = self.gateway.create_preference(&request).await?;
        tracing::info!(
            preference_id = %preference.id,
            user_id,
            plan_id = %plan.plan_id,
            "checkout preference created"
        );
        Ok(CheckoutResponse { id: preference.id })
    }
}

fn validate(plan: &PlanCheckout, user_id: &str) -> BillingResult<()> {
    if user_id.trim().is_empty() {
        return Err(BillingError::InvalidRequest("userId is required".into()));
    }
    if plan.plan_id.trim().is_empty() {
        return Err(BillingError::InvalidRequest("planId is required".into()));
    }
    if plan.title.trim().is_empty() {
        return Err(BillingError::InvalidRequest("title is required".into()));
    }
    if !plan.price.is_finite() || plan.price < 0.0 {
        return Err(BillingError::InvalidRequest(
            "price must be a finite non-negative number".into(),
        ));
    }
    Ok(())
}
