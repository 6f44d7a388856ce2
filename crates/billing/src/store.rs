//! Entitlement store
//!
//! Keyed persistence for subscription entitlements plus the payment-id
//! claim table that makes webhook reconciliation idempotent. The trait is
//! implemented for Postgres in production and for an in-memory map used by
//! tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

/// A user's subscription entitlement: access to `plan` until `valid_until`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Entitlement {
    pub user_id: String,
    pub plan: String,
    pub activated_at: OffsetDateTime,
    pub valid_until: OffsetDateTime,
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Atomically claim exclusive rights to apply `payment_id`.
    ///
    /// Returns `false` when an earlier delivery already claimed it. At most
    /// one of any number of concurrent duplicate deliveries sees `true`.
    async fn claim_payment(&self, payment_id: &str, user_id: &str) -> BillingResult<bool>;

    /// Undo a claim whose entitlement write failed, so provider redelivery
    /// can reprocess the payment.
    async fn release_payment(&self, payment_id: &str) -> BillingResult<()>;

    /// Merge-upsert keyed by user id. Only the entitlement fields are
    /// written; anything else stored against the user is preserved, and
    /// `valid_until` never moves backwards.
    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> BillingResult<Entitlement>;

    async fn get_entitlement(&self, user_id: &str) -> BillingResult<Option<Entitlement>>;
}

/// Postgres-backed entitlement store.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn claim_payment(&self, payment_id: &str, user_id: &str) -> BillingResult<bool> {
        // INSERT ... ON CONFLICT DO NOTHING is the atomic claim: exactly one
        // concurrent duplicate wins the row.
        let result = sqlx::query(
            r#"
            INSERT INTO processed_payments (payment_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(payment_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BillingError::Store(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_payment(&self, payment_id: &str) -> BillingResult<()> {
        sqlx::query("DELETE FROM processed_payments WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await
            .map_err(|e| BillingError::Store(e.to_string()))?;
        Ok(())
    }

    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> BillingResult<Entitlement> {
        let written: Entitlement = sqlx::query_as(
            r#"
            INSERT INTO user_entitlements (user_id, plan, activated_at, valid_until)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                activated_at = EXCLUDED.activated_at,
                valid_until = GREATEST(user_entitlements.valid_until, EXCLUDED.valid_until)
            RETURNING user_id, plan, activated_at, valid_until
            "#,
        )
        .bind(&entitlement.user_id)
        .bind(&entitlement.plan)
        .bind(entitlement.activated_at)
        .bind(entitlement.valid_until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BillingError::Store(e.to_string()))?;

        Ok(written)
    }

    async fn get_entitlement(&self, user_id: &str) -> BillingResult<Option<Entitlement>> {
        sqlx::query_as(
            "SELECT user_id, plan, activated_at, valid_until FROM user_entitlements WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BillingError::Store(e.to_string()))
    }
}

/// In-memory entitlement store for tests and local development.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    processed: HashSet<String>,
    entitlements: HashMap<String, Entitlement>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> BillingResult<std::sync::MutexGuard<'_, InMemoryState>> {
        self.inner
            .lock()
            .map_err(|_| BillingError::Store("entitlement store mutex poisoned".into()))
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn claim_payment(&self, payment_id: &str, _user_id: &str) -> BillingResult<bool> {
        Ok(self.lock()?.processed.insert(payment_id.to_string()))
    }

    async fn release_payment(&self, payment_id: &str) -> BillingResult<()> {
        self.lock()?.processed.remove(payment_id);
        Ok(())
    }

    async fn upsert_entitlement(&self, entitlement: &Entitlement) -> BillingResult<Entitlement> {
        let mut state = self.lock()?;
        let mut written = entitlement.clone();
        if let Some(existing) = state.entitlements.get(&entitlement.user_id) {
            if existing.valid_until > written.valid_until {
                written.valid_until = existing.valid_until;
            }
        }
        state
            .entitlements
            .insert(written.user_id.clone(), written.clone());
        Ok(written)
    }

    async fn get_entitlement(&self, user_id: &str) -> BillingResult<Option<Entitlement>> {
        Ok(self.lock()?.entitlements.get(user_id).cloned())
    }
}
