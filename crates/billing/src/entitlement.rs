//! Entitlement activation
//!
//! Applies a confirmed payment to the store, at most once per payment id.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::error::BillingResult;
use crate::store::{Entitlement, EntitlementStore};

/// How long a confirmed payment entitles the user to the plan.
pub const ENTITLEMENT_PERIOD_DAYS: i64 = 30;

/// Outcome of applying a confirmed payment.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The entitlement was written for this payment.
    Applied(Entitlement),
    /// An earlier delivery of the same payment already applied it.
    AlreadyApplied,
}

/// Idempotent entitlement writer.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Activate `plan` for `user_id`, at most once per `payment_id`.
    ///
    /// Notification delivery is at-least-once, so the same approved payment
    /// can arrive any number of times. Idempotence is keyed by payment id:
    /// the claim below is atomic in the store, duplicate deliveries skip the
    /// write entirely, and a replay can never reset or shorten a window an
    /// earlier delivery established.
    pub async fn apply(
        &self,
        user_id: &str,
        plan: &str,
        payment_id: &str,
    ) -> BillingResult<ApplyOutcome> {
        if !self.store.claim_payment(payment_id, user_id).await? {
            tracing::info!(
                payment_id,
                user_id,
                "duplicate payment delivery - entitlement already applied"
            );
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let now = OffsetDateTime::now_utc();
        let entitlement = Entitlement {
            user_id: user_id.to_string(),
            plan: plan.to_string(),
            activated_at: now,
            valid_until: now + Duration::days(ENTITLEMENT_PERIOD_DAYS),
        };

        match self.store.upsert_entitlement(&entitlement).await {
            Ok(written) => {
                tracing::info!(
                    user_id,
                    plan,
                    payment_id,
                    valid_until = %written.valid_until,
                    "entitlement activated"
                );
                Ok(ApplyOutcome::Applied(written))
            }
            Err(err) => {
                // Give the claim back so provider redelivery retries the write.
                if let Err(release_err) = self.store.release_payment(payment_id).await {
                    tracing::error!(
                        payment_id,
                        user_id,
                        error = %release_err,
                        "failed to release payment claim after store error; \
                         payment may need manual reconciliation"
                    );
                }
                Err(err)
            }
        }
    }
}
