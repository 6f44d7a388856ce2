// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Serralheria PRO Billing Module
//!
//! Handles Mercado Pago integration for plan checkout and payment
//! reconciliation.
//!
//! ## Features
//!
//! - **Checkout**: build one-item payment preferences carrying a user
//!   correlation token
//! - **Webhooks**: reconcile at-least-once payment notifications against
//!   authoritative payment records
//! - **Entitlements**: idempotent, payment-keyed 30-day plan activation

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod store;
pub mod webhooks;


// Checkout
pub use checkout::{CheckoutResponse, CheckoutService, PlanCheckout};

// Client
pub use client::{
    AdditionalInfo, AdditionalInfoItem, BackUrls, MercadoPagoClient, MercadoPagoConfig, Payment,
    PaymentGateway, PaymentStatus, PreferenceItem, PreferenceRequest, PreferenceResponse,
};

// Entitlement
pub use entitlement::{ApplyOutcome, EntitlementService, ENTITLEMENT_PERIOD_DAYS};

// Error
pub use error::{BillingError, BillingResult};

// Store
pub use store::{Entitlement, EntitlementStore, InMemoryEntitlementStore, PostgresEntitlementStore};

// Webhooks
pub use webhooks::{
    IgnoreReason, Notification, NotificationKind, ReconcileOutcome, WebhookHandler, DEFAULT_PLAN,
};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines checkout, reconciliation, and
/// entitlement functionality.
pub struct BillingService {
    pub checkout: CheckoutService,
    pub entitlements: EntitlementService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a billing service from environment variables, persisting to
    /// Postgres.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(MercadoPagoClient::from_env()?);
        let store: Arc<dyn EntitlementStore> = Arc::new(PostgresEntitlementStore::new(pool));
        Ok(Self::new(gateway, store, BackUrls::from_env()))
    }

    /// Create a billing service with explicit collaborators, enabling test
    /// doubles for both the gateway and the store.
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn EntitlementStore>,
        back_urls: BackUrls,
    ) -> Self {
        let entitlements = EntitlementService::new(store);
        Self {
            checkout: CheckoutService::new(gateway.clone(), back_urls),
            webhooks: WebhookHandler::new(gateway, entitlements.clone()),
            entitlements,
        }
    }
}
