use crate::application::orchestrator::Collaborators;
use crate::domain::investment::{
    Amount, CampaignId, Investment, InvestmentId, InvestmentStatus,
};
use crate::domain::ports::{
    CacheInvalidator, CacheKey, CardDetails, CardGateway, CardToken, CheckoutLink,
    CheckoutSurface, CheckoutWindow, ClientSecret, Confirmation, InvestmentBackend, PollStatus,
    RateFeed, RedirectGateway,
};
use crate::error::GatewayError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate feed that always answers with a fixed multiplier.
pub struct FixedRateFeed {
    rate: Decimal,
}

impl FixedRateFeed {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl RateFeed for FixedRateFeed {
    async fn usd_rate(&self) -> Result<Decimal, GatewayError> {
        Ok(self.rate)
    }
}

/// Rate feed that always times out, for exercising the fallback path.
pub struct OfflineRateFeed;

#[async_trait]
impl RateFeed for OfflineRateFeed {
    async fn usd_rate(&self) -> Result<Decimal, GatewayError> {
        Err(GatewayError::new("rate feed timed out"))
    }
}

/// Scriptable card provider. Succeeds unless told otherwise; tokenize
/// declines are one-shot so a retry against the same intent can pass.
#[derive(Default)]
pub struct SimCardGateway {
    fail_intent: Option<String>,
    tokenize_declines: Mutex<VecDeque<String>>,
    confirm_decline: Option<String>,
    intents: AtomicUsize,
    tokenizes: AtomicUsize,
    confirms: AtomicUsize,
}

impl SimCardGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent_failure(mut self, reason: impl Into<String>) -> Self {
        self.fail_intent = Some(reason.into());
        self
    }

    /// The next tokenize call is declined with this reason.
    pub fn with_tokenize_decline(self, reason: impl Into<String>) -> Self {
        lock(&self.tokenize_declines).push_back(reason.into());
        self
    }

    pub fn with_confirm_decline(mut self, reason: impl Into<String>) -> Self {
        self.confirm_decline = Some(reason.into());
        self
    }

    pub fn intent_count(&self) -> usize {
        self.intents.load(Ordering::SeqCst)
    }

    pub fn tokenize_count(&self) -> usize {
        self.tokenizes.load(Ordering::SeqCst)
    }

    pub fn confirm_count(&self) -> usize {
        self.confirms.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardGateway for SimCardGateway {
    async fn create_intent(
        &self,
        investment: &InvestmentId,
        _amount: Amount,
    ) -> Result<ClientSecret, GatewayError> {
        self.intents.fetch_add(1, Ordering::SeqCst);
        match &self.fail_intent {
            Some(reason) => Err(GatewayError::new(reason.clone())),
            None => Ok(ClientSecret(format!("cs_{investment}"))),
        }
    }

    async fn tokenize(
        &self,
        _details: &CardDetails,
        _holder_name: &str,
    ) -> Result<CardToken, GatewayError> {
        self.tokenizes.fetch_add(1, Ordering::SeqCst);
        match lock(&self.tokenize_declines).pop_front() {
            Some(reason) => Err(GatewayError::new(reason)),
            None => Ok(CardToken("tok_sim".to_string())),
        }
    }

    async fn confirm(
        &self,
        secret: &ClientSecret,
        _token: &CardToken,
    ) -> Result<Confirmation, GatewayError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        match &self.confirm_decline {
            Some(reason) => Err(GatewayError::new(reason.clone())),
            None => Ok(Confirmation {
                transaction_ref: format!("ch_{}", secret.0),
            }),
        }
    }
}

/// Scriptable redirect provider. `check_status` answers from the script and
/// falls back to pending once the script runs out.
#[derive(Default)]
pub struct SimRedirectGateway {
    fail_link: Option<String>,
    polls: Mutex<VecDeque<PollStatus>>,
    links: Mutex<Vec<CheckoutLink>>,
    poll_count: AtomicUsize,
}

impl SimRedirectGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link_failure(mut self, reason: impl Into<String>) -> Self {
        self.fail_link = Some(reason.into());
        self
    }

    pub fn with_poll_script(self, script: impl IntoIterator<Item = PollStatus>) -> Self {
        lock(&self.polls).extend(script);
        self
    }

    pub fn link_count(&self) -> usize {
        lock(&self.links).len()
    }

    pub fn last_reference(&self) -> Option<String> {
        lock(&self.links).last().map(|l| l.reference.clone())
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedirectGateway for SimRedirectGateway {
    async fn create_checkout_link(
        &self,
        _investment: &InvestmentId,
        _amount: Amount,
        _converted_amount: Decimal,
        reference: &str,
    ) -> Result<CheckoutLink, GatewayError> {
        if let Some(reason) = &self.fail_link {
            return Err(GatewayError::new(reason.clone()));
        }
        let link = CheckoutLink {
            url: format!("https://checkout.example/{reference}"),
            reference: reference.to_string(),
        };
        lock(&self.links).push(link.clone());
        Ok(link)
    }

    async fn check_status(&self, _reference: &str) -> Result<PollStatus, GatewayError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.polls).pop_front().unwrap_or(PollStatus::Pending))
    }
}

/// In-memory source of truth for investment statuses.
///
/// `commit_status` is idempotent: re-committing the current status is an ack
/// without a second mutation. Unknown investments start from pending.
#[derive(Default)]
pub struct InMemoryInvestmentBackend {
    records: RwLock<HashMap<InvestmentId, InvestmentStatus>>,
    applied: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryInvestmentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail, for exercising the reconciliation path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn status_of(&self, id: &InvestmentId) -> InvestmentStatus {
        self.records
            .read()
            .await
            .get(id)
            .copied()
            .unwrap_or(InvestmentStatus::Pending)
    }

    /// Number of commits that actually mutated a record.
    pub fn commit_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvestmentBackend for InMemoryInvestmentBackend {
    async fn commit_status(
        &self,
        id: &InvestmentId,
        status: InvestmentStatus,
    ) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::new("backend unavailable"));
        }
        let mut records = self.records.write().await;
        let current = records.get(id).copied().unwrap_or(InvestmentStatus::Pending);
        if current == status {
            // Repeat commit: ack without mutating.
            return Ok(());
        }
        if !current.can_advance_to(status) {
            return Err(GatewayError::new(format!(
                "illegal status transition {current} -> {status}"
            )));
        }
        records.insert(id.clone(), status);
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every invalidated key set as one unit.
#[derive(Default)]
pub struct RecordingInvalidator {
    sets: Mutex<Vec<Vec<CacheKey>>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidations(&self) -> Vec<Vec<CacheKey>> {
        lock(&self.sets).clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, keys: &[CacheKey]) {
        lock(&self.sets).push(keys.to_vec());
    }
}

/// Checkout window whose open flag tests can flip, standing in for the user
/// closing the popup.
pub struct SimWindow {
    open: Arc<AtomicBool>,
}

impl CheckoutWindow for SimWindow {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Presentation surface that can simulate a popup blocker.
#[derive(Default)]
pub struct SimSurface {
    blocked: bool,
    windows: Mutex<Vec<Arc<AtomicBool>>>,
}

impl SimSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocked() -> Self {
        Self {
            blocked: true,
            ..Self::default()
        }
    }

    /// Simulates the user closing the most recently opened window.
    pub fn user_closes_last(&self) {
        if let Some(flag) = lock(&self.windows).last() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn window_count(&self) -> usize {
        lock(&self.windows).len()
    }

    pub fn last_is_open(&self) -> Option<bool> {
        lock(&self.windows).last().map(|f| f.load(Ordering::SeqCst))
    }
}

impl CheckoutSurface for SimSurface {
    fn open_window(&self, _url: &str) -> Option<Box<dyn CheckoutWindow>> {
        if self.blocked {
            return None;
        }
        let flag = Arc::new(AtomicBool::new(true));
        lock(&self.windows).push(flag.clone());
        Some(Box::new(SimWindow { open: flag }))
    }
}

/// Handles onto the simulated collaborators, for assertions after a run.
pub struct SimHandles {
    pub card: Arc<SimCardGateway>,
    pub redirect: Arc<SimRedirectGateway>,
    pub backend: Arc<InMemoryInvestmentBackend>,
    pub caches: Arc<RecordingInvalidator>,
}

/// All-success collaborator set with a fixed 1650 rate.
pub fn sample_collaborators() -> (Collaborators, SimHandles) {
    collaborators_with(
        Arc::new(FixedRateFeed::new(dec!(1650))),
        SimCardGateway::new(),
        SimRedirectGateway::new(),
    )
}

/// Collaborator set built around scripted gateways.
pub fn collaborators_with(
    rates: Arc<dyn RateFeed>,
    card: SimCardGateway,
    redirect: SimRedirectGateway,
) -> (Collaborators, SimHandles) {
    let card = Arc::new(card);
    let redirect = Arc::new(redirect);
    let backend = Arc::new(InMemoryInvestmentBackend::new());
    let caches = Arc::new(RecordingInvalidator::new());
    let collaborators = Collaborators {
        rates,
        card: card.clone(),
        redirect: redirect.clone(),
        backend: backend.clone(),
        caches: caches.clone(),
    };
    let handles = SimHandles {
        card,
        redirect,
        backend,
        caches,
    };
    (collaborators, handles)
}

/// Pending investment fixture with a whole-dollar USD amount.
pub fn sample_investment(id: &str, amount_usd: u32) -> Investment {
    let amount = Amount::new(Decimal::from(amount_usd)).expect("sample amount must be positive");
    Investment::pending(
        InvestmentId::new(id),
        CampaignId::new("campaign-1"),
        amount,
    )
}
