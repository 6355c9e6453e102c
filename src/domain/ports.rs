use super::investment::{Amount, CampaignId, InvestmentId, InvestmentStatus};
use crate::error::GatewayError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type GwResult<T> = std::result::Result<T, GatewayError>;

/// Live USD to local-currency rate lookup. A single attempt per flow open;
/// failures are recovered by the rate adapter, never by the caller.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn usd_rate(&self) -> GwResult<Decimal>;
}

/// Client secret identifying a payment intent on the card provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecret(pub String);

/// Opaque payment-method handle produced by tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardToken(pub String);

/// Raw card input collected by the opaque tokenization widget. Never stored
/// or logged.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

/// Terminal success signal from intent confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub transaction_ref: String,
}

/// The direct card-authorization provider.
///
/// `tokenize` and `confirm` are separate calls so a tokenization failure can
/// be retried against the still-valid intent without a new `create_intent`
/// round-trip.
#[async_trait]
pub trait CardGateway: Send + Sync {
    async fn create_intent(
        &self,
        investment: &InvestmentId,
        amount: Amount,
    ) -> GwResult<ClientSecret>;

    async fn tokenize(&self, details: &CardDetails, holder_name: &str) -> GwResult<CardToken>;

    async fn confirm(&self, secret: &ClientSecret, token: &CardToken) -> GwResult<Confirmation>;
}

/// Checkout URL plus the idempotency reference it was created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    pub url: String,
    pub reference: String,
}

/// Status reported by the redirect provider for one reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollStatus {
    Pending,
    Success,
    Failed { reason: Option<String> },
}

/// The provider-hosted redirect/checkout provider.
#[async_trait]
pub trait RedirectGateway: Send + Sync {
    async fn create_checkout_link(
        &self,
        investment: &InvestmentId,
        amount: Amount,
        converted_amount: Decimal,
        reference: &str,
    ) -> GwResult<CheckoutLink>;

    /// Transport errors here are treated by callers as still-pending, not as
    /// terminal failure.
    async fn check_status(&self, reference: &str) -> GwResult<PollStatus>;
}

/// The local source of truth for investment records.
#[async_trait]
pub trait InvestmentBackend: Send + Sync {
    /// Must be idempotent with respect to repeated calls for the same
    /// (id, status) pair: a duplicate commit is an ack, not an error and not
    /// a second mutation.
    async fn commit_status(&self, id: &InvestmentId, status: InvestmentStatus) -> GwResult<()>;
}

/// Read views derived from investment state. Invalidated together after a
/// successful settle so stale totals never sit next to a fresh row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKey {
    InvestmentList,
    CampaignTotals(CampaignId),
    InvestorStats,
    FounderStats,
    NotificationFeed,
}

/// Fire-and-forget invalidation of dependent read views. The given set is
/// applied all-or-nothing.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, keys: &[CacheKey]);
}

/// Handle to an opened checkout window.
pub trait CheckoutWindow: Send + Sync {
    fn is_open(&self) -> bool;
    fn close(&self);
}

/// The presentation capability of opening a provider-hosted checkout window.
pub trait CheckoutSurface: Send + Sync {
    /// Returns `None` when the window could not be opened (popup blocked).
    fn open_window(&self, url: &str) -> Option<Box<dyn CheckoutWindow>>;
}

pub type RateFeedArc = Arc<dyn RateFeed>;
pub type CardGatewayArc = Arc<dyn CardGateway>;
pub type RedirectGatewayArc = Arc<dyn RedirectGateway>;
pub type InvestmentBackendArc = Arc<dyn InvestmentBackend>;
pub type CacheInvalidatorArc = Arc<dyn CacheInvalidator>;
