//! Payment notification handling
//!
//! Reconciles at-least-once provider notifications against authoritative
//! payment records and activates entitlements for approved payments.
//!
//! Each notification runs `Received → Classified → Resolved → Applied |
//! Ignored`; any error out of [`WebhookHandler::handle_event`] is the
//! `Failed` state and must be answered with a retryable (5xx) status so the
//! provider redelivers. Every `Ok` outcome must be acknowledged with a
//! success status, including events this system will never act on, or the
//! provider redelivers them forever.

use std::sync::Arc;

use serde_json::Value;

use crate::client::{PaymentGateway, PaymentStatus};
use crate::entitlement::{ApplyOutcome, EntitlementService};
use crate::error::{BillingError, BillingResult};
use crate::store::Entitlement;

/// Plan activated when the payment record does not name one.
///
/// Preferences built by this backend carry the plan id on the line item;
/// records for sessions created by older frontends only carry the user
/// correlation.
pub const DEFAULT_PLAN: &str = "pro";

/// Kind declared by an inbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Payment,
    Other,
}

/// A provider notification reduced to the fields this system acts on.
///
/// The body is classification input only; payment status is always resolved
/// through a fresh gateway fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub payment_id: Option<String>,
}

impl Notification {
    /// Parse either provider envelope: `{"type": "payment", "data": {"id":
    /// ...}}` or the legacy `{"topic": "payment", "id": ...}`. Ids may be
    /// JSON strings or numbers.
    pub fn parse(body: &Value) -> Self {
        let kind = body
            .get("type")
            .or_else(|| body.get("topic"))
            .and_then(Value::as_str);
        if kind != Some("payment") {
            return Self {
                kind: NotificationKind::Other,
                payment_id: None,
            };
        }

        let payment_id = body
            .get("data")
            .and_then(|data| data.get("id"))
            .or_else(|| body.get("id"))
            .and_then(id_as_string);

        Self {
            kind: NotificationKind::Payment,
            payment_id,
        }
    }
}

fn id_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Why a notification terminated in the `Ignored` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a payment event; acknowledged as handled-but-no-op.
    NotAPayment,
    /// Payment event with no extractable payment id. Redelivery cannot
    /// complete a structurally incomplete event, so it is acknowledged.
    MissingPaymentId,
    /// Authoritative record is not approved; the provider notifies again
    /// when the status changes.
    NotApproved(PaymentStatus),
}

/// Terminal state of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Approved payment reconciled and entitlement written.
    Applied(Entitlement),
    /// Duplicate delivery of an already-reconciled payment.
    AlreadyApplied,
    /// Nothing to do; acknowledge so the provider stops redelivering.
    Ignored(IgnoreReason),
}

/// Webhook handler for provider payment notifications.
pub struct WebhookHandler {
    gateway: Arc<dyn PaymentGateway>,
    entitlements: EntitlementService,
}

impl WebhookHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, entitlements: EntitlementService) -> Self {
        Self {
            gateway,
            entitlements,
        }
    }

    /// Reconcile one notification.
    pub async fn handle_event(&self, body: &Value) -> BillingResult<ReconcileOutcome> {
        let notification = Notification::parse(body);

        if notification.kind != NotificationKind::Payment {
            tracing::debug!("ignoring non-payment notification");
            return Ok(ReconcileOutcome::Ignored(IgnoreReason::NotAPayment));
        }

        let Some(payment_id) = notification.payment_id else {
            tracing::warn!(body = %body, "payment notification without a payment id");
            return Ok(ReconcileOutcome::Ignored(IgnoreReason::MissingPaymentId));
        };

        // The notification body is attacker-reachable; only the record
        // fetched from the gateway decides financial state.
        let payment = self.gateway.get_payment(&payment_id).await?;

        if payment.status != PaymentStatus::Approved {
            tracing::info!(
                payment_id = %payment.id,
                status = ?payment.status,
                "payment not approved - no entitlement action"
            );
            return Ok(ReconcileOutcome::Ignored(IgnoreReason::NotApproved(
                payment.status,
            )));
        }

        let Some(user_id) = payment.correlation_token() else {
            tracing::error!(
                payment_id = %payment.id,
                "approved payment with no correlation token - cannot resolve a user"
            );
            return Err(BillingError::MissingCorrelation {
                payment_id: payment.id.clone(),
            });
        };

        let plan = payment.plan_id().unwrap_or(DEFAULT_PLAN);

        match self.entitlements.apply(user_id, plan, &payment.id).await? {
            ApplyOutcome::Applied(entitlement) => Ok(ReconcileOutcome::Applied(entitlement)),
            ApplyOutcome::AlreadyApplied => Ok(ReconcileOutcome::AlreadyApplied),
        }
    }
}
