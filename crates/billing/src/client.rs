//! Mercado Pago client
//!
//! Thin HTTP wrapper over the two gateway calls this system makes: creating
//! a checkout preference and fetching an authoritative payment record by id.
//! The [`PaymentGateway`] trait is the seam the rest of the crate depends
//! on, so tests can substitute the client with a double.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BillingError, BillingResult};

/// Timeout applied to every outbound gateway call. A hung call must surface
/// as a gateway error so notification reconciliation fails and the provider
/// redelivers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com";

/// One line item on a checkout preference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub currency_id: String,
}

/// Redirect targets the provider sends the buyer back to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

impl BackUrls {
    /// Storefront redirect targets from `CHECKOUT_SUCCESS_URL`,
    /// `CHECKOUT_FAILURE_URL` and `CHECKOUT_PENDING_URL`.
    pub fn from_env() -> Self {
        Self {
            success: std::env::var("CHECKOUT_SUCCESS_URL").unwrap_or_default(),
            failure: std::env::var("CHECKOUT_FAILURE_URL").unwrap_or_default(),
            pending: std::env::var("CHECKOUT_PENDING_URL").unwrap_or_default(),
        }
    }
}

/// Checkout preference submitted to the gateway.
///
/// `external_reference` is the correlation token: the provider echoes it
/// back on the payment record, which is how an asynchronous notification is
/// matched to the user who started the checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub external_reference: String,
    pub back_urls: BackUrls,
    /// Only sent when a success back URL exists; the gateway rejects
    /// `auto_return` without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_return: Option<String>,
}

/// Gateway response to preference creation. The id is opaque.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceResponse {
    pub id: String,
}

/// Payment status as reported by the gateway. Anything this system does not
/// act on collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdditionalInfoItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdditionalInfo {
    #[serde(default)]
    pub items: Vec<AdditionalInfoItem>,
}

/// Authoritative payment record fetched from the gateway by id.
///
/// This is the only trusted source of payment status; the webhook body that
/// named the id is reachable by anyone who can POST to the endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub additional_info: Option<AdditionalInfo>,
}

impl Payment {
    /// The correlation token identifying the user who started the checkout.
    ///
    /// Prefers the dedicated `external_reference` field; falls back to the
    /// first line-item description, which is where sessions created by
    /// older frontends carried the user id.
    pub fn correlation_token(&self) -> Option<&str> {
        self.external_reference
            .as_deref()
            .filter(|token| !token.is_empty())
            .or_else(|| {
                let item = self.additional_info.as_ref()?.items.first()?;
                item.description.as_deref().filter(|d| !d.is_empty())
            })
    }

    /// Plan id carried on the first line item, when the record has one.
    pub fn plan_id(&self) -> Option<&str> {
        let item = self.additional_info.as_ref()?.items.first()?;
        item.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The gateway reports payment ids as numbers in some shapes and strings in
/// others; normalize to a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected payment id: {other}"
        ))),
    }
}

/// Abstraction over the payment provider, so the checkout builder and the
/// webhook handler can be exercised against a test double.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a checkout preference. Not retried: the call carries no
    /// idempotency key, so a blind retry could create a second session.
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> BillingResult<PreferenceResponse>;

    /// Fetch the authoritative payment record by id.
    async fn get_payment(&self, payment_id: &str) -> BillingResult<Payment>;
}

/// Mercado Pago configuration.
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    /// Overridable so tests can point the client at a local mock server.
    pub base_url: String,
}

impl MercadoPagoConfig {
    pub fn from_env() -> BillingResult<Self> {
        let access_token = std::env::var("MERCADO_PAGO_ACCESS_TOKEN")
            .map_err(|_| BillingError::Config("MERCADO_PAGO_ACCESS_TOKEN must be set".into()))?;
        let base_url = std::env::var("MERCADO_PAGO_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            access_token,
            base_url,
        })
    }
}

/// HTTP client for the Mercado Pago API.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> BillingResult<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    /// Read an error body for diagnostics, truncated so a hostile upstream
    /// cannot blow up the logs.
    async fn error_body(response: reqwest::Response) -> String {
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(512);
        body
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> BillingResult<PreferenceResponse> {
        let url = format!("{}/checkout/preferences", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_body(response).await;
            tracing::error!(status = status.as_u16(), %message, "preference creation rejected");
            return Err(BillingError::Gateway {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(response.json::<PreferenceResponse>().await?)
    }

    async fn get_payment(&self, payment_id: &str) -> BillingResult<Payment> {
        let url = format!("{}/v1/payments/{}", self.config.base_url, payment_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_body(response).await;
            tracing::error!(payment_id, status = status.as_u16(), %message, "payment fetch failed");
            return Err(BillingError::Gateway {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(response.json::<Payment>().await?)
    }
}
