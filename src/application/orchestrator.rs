use crate::application::card::CardFlowController;
use crate::application::rates::RateQuoter;
use crate::application::redirect::{
    INITIAL_POLL_DELAY, POLL_INTERVAL, RedirectFlowController, RedirectState, next_state,
};
use crate::domain::investment::{CampaignId, Investment, InvestmentStatus};
use crate::domain::ports::{
    CacheInvalidatorArc, CacheKey, CardDetails, CardGatewayArc, CheckoutLink, CheckoutSurface,
    CheckoutWindow, ClientSecret, InvestmentBackendArc, RateFeedArc, RedirectGatewayArc,
};
use crate::domain::rate::Quote;
use crate::domain::session::{AttemptState, PaymentProvider, PaymentSession};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Top-level state of the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Closed,
    RateLoading,
    MethodSelection,
    CardFlow,
    RedirectFlow,
    Settling,
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::RateLoading => "rate_loading",
            Self::MethodSelection => "method_selection",
            Self::CardFlow => "card_flow",
            Self::RedirectFlow => "redirect_flow",
            Self::Settling => "settling",
        }
    }
}

/// Terminal result of a payment attempt, surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Charge confirmed and backend record committed.
    Paid { transaction_ref: String },
    /// The provider rejected the charge. The investment stays pending and
    /// the user may retry or switch paths.
    Declined { reason: String },
    /// The user closed the checkout window while the charge was still
    /// pending. Not a failure: the payment may have completed out-of-band,
    /// so the user is directed to check their dashboard.
    AmbiguousAbandoned,
    /// The charge succeeded but the backend commit did not. Money has moved;
    /// reported as pending verification, never as a payment failure.
    PendingVerification { transaction_ref: String },
}

/// External collaborators the orchestrator is wired with.
pub struct Collaborators {
    pub rates: RateFeedArc,
    pub card: CardGatewayArc,
    pub redirect: RedirectGatewayArc,
    pub backend: InvestmentBackendArc,
    pub caches: CacheInvalidatorArc,
}

struct FlowInner {
    state: FlowState,
    session: Option<PaymentSession>,
    quote: Option<Quote>,
    window: Option<Box<dyn CheckoutWindow>>,
    status: InvestmentStatus,
}

/// Owns the payment session for one investment and drives it to a terminal
/// outcome across the two mutually exclusive provider paths.
///
/// Methods take `&self`; flow state lives behind a `RwLock` so the redirect
/// polling loop can run as its own task while `close` remains callable. Each
/// session carries a generation number: `close` and `open` bump the counter,
/// and any network result that comes back under a stale generation is
/// discarded instead of applied.
pub struct PaymentOrchestrator {
    investment: Investment,
    quoter: RateQuoter,
    card: CardFlowController,
    redirect: RedirectFlowController,
    backend: InvestmentBackendArc,
    caches: CacheInvalidatorArc,
    inner: RwLock<FlowInner>,
    generation: AtomicU64,
}

impl PaymentOrchestrator {
    pub fn new(investment: Investment, collaborators: Collaborators) -> Self {
        let status = investment.status;
        Self {
            investment,
            quoter: RateQuoter::new(collaborators.rates),
            card: CardFlowController::new(collaborators.card),
            redirect: RedirectFlowController::new(collaborators.redirect),
            backend: collaborators.backend,
            caches: collaborators.caches,
            inner: RwLock::new(FlowInner {
                state: FlowState::Closed,
                session: None,
                quote: None,
                window: None,
                status,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn investment(&self) -> &Investment {
        &self.investment
    }

    pub async fn state(&self) -> FlowState {
        self.inner.read().await.state
    }

    /// The core's local view of the investment status.
    pub async fn status(&self) -> InvestmentStatus {
        self.inner.read().await.status
    }

    pub async fn current_quote(&self) -> Option<Quote> {
        self.inner.read().await.quote
    }

    pub async fn session_state(&self) -> Option<(PaymentProvider, AttemptState)> {
        self.inner
            .read()
            .await
            .session
            .as_ref()
            .map(|s| (s.provider, s.attempt_state))
    }

    /// Opens the flow: resets all session state unconditionally and fetches
    /// a fresh converted estimate. Lands in method selection whether the
    /// quote is live or fallback.
    pub async fn open(&self) -> Quote {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.write().await;
            inner.session = None;
            inner.window = None;
            inner.quote = None;
            inner.state = FlowState::RateLoading;
        }
        info!(investment = %self.investment.id, "payment flow opened");

        let quote = self.quoter.quote(self.investment.amount).await;

        let mut inner = self.inner.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            inner.quote = Some(quote);
            inner.state = FlowState::MethodSelection;
        }
        quote
    }

    /// Closes the presentation surface. Cancels any outstanding polling via
    /// the generation bump and discards the session. The investment status
    /// is left at pending/processing; nothing is committed on a close.
    pub async fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        if let Some(session) = inner.session.take() {
            debug!(attempt_state = ?session.attempt_state, "session discarded on close");
        }
        // The handle is dropped, not closed: the provider window belongs to
        // the user and the charge may still complete out-of-band.
        inner.window = None;
        inner.quote = None;
        inner.state = FlowState::Closed;
        info!(investment = %self.investment.id, status = %inner.status, "payment flow closed");
    }

    /// Enters the card path: creates a payment intent and waits for card
    /// input. Rejected synchronously if the sibling path is in flight.
    pub async fn start_card(&self) -> Result<()> {
        let generation = self.enter_path(PaymentProvider::Card, "start card payment").await?;

        match self.card.create_intent(&self.investment).await {
            Ok(secret) => {
                let mut inner = self.inner.write().await;
                let Some(session) = Self::live_session(&mut inner, generation) else {
                    return Err(PaymentError::SessionClosed);
                };
                session.external_ref = Some(secret.0);
                session.attempt_state = AttemptState::AwaitingInput;
                Ok(())
            }
            Err(err) => {
                self.abort_attempt(generation, AttemptState::Failed).await;
                Err(err)
            }
        }
    }

    /// Tokenizes and confirms the card, then settles. Tokenization failures
    /// leave the intent alive so the user can retry the same attempt; a
    /// confirm decline is terminal and returns the flow to method selection.
    pub async fn submit_card(
        &self,
        details: &CardDetails,
        holder_name: &str,
    ) -> Result<FlowOutcome> {
        let (generation, secret) = {
            let mut inner = self.inner.write().await;
            if inner.state != FlowState::CardFlow {
                return Err(PaymentError::InvalidTransition {
                    action: "submit card details",
                    state: inner.state.name(),
                });
            }
            let Some(session) = inner.session.as_mut() else {
                return Err(PaymentError::SessionClosed);
            };
            if session.attempt_state != AttemptState::AwaitingInput {
                return Err(PaymentError::InvalidTransition {
                    action: "submit card details",
                    state: "card_flow",
                });
            }
            let Some(secret) = session.external_ref.clone() else {
                return Err(PaymentError::SessionSetup(
                    "no payment intent available for confirmation".to_string(),
                ));
            };
            session.attempt_state = AttemptState::Submitting;
            (session.generation, ClientSecret(secret))
        };

        let token = match self.card.tokenize(details, holder_name).await {
            Ok(token) => token,
            Err(err) => {
                // The intent is still valid: back to awaiting input so the
                // user can retry without a new create-intent round-trip.
                let mut inner = self.inner.write().await;
                if let Some(session) = Self::live_session(&mut inner, generation) {
                    session.attempt_state = AttemptState::AwaitingInput;
                }
                return Err(err);
            }
        };

        {
            let mut inner = self.inner.write().await;
            let Some(session) = Self::live_session(&mut inner, generation) else {
                return Err(PaymentError::SessionClosed);
            };
            session.attempt_state = AttemptState::Confirming;
        }

        match self.card.confirm(&secret, &token).await {
            Ok(confirmation) => {
                {
                    let mut inner = self.inner.write().await;
                    let Some(session) = Self::live_session(&mut inner, generation) else {
                        return Err(PaymentError::SessionClosed);
                    };
                    session.attempt_state = AttemptState::Succeeded;
                    inner.state = FlowState::Settling;
                }
                self.settle_paid(generation, confirmation.transaction_ref)
                    .await
            }
            Err(PaymentError::ProviderRejected(reason)) => {
                self.abort_attempt(generation, AttemptState::Failed).await;
                Ok(FlowOutcome::Declined { reason })
            }
            Err(err) => {
                self.abort_attempt(generation, AttemptState::Failed).await;
                Err(err)
            }
        }
    }

    /// Enters the redirect path: creates a checkout link under a fresh
    /// idempotency reference and opens the provider-hosted window. A blocked
    /// popup fails the attempt before any polling starts.
    pub async fn start_redirect(&self, surface: &dyn CheckoutSurface) -> Result<CheckoutLink> {
        let converted = {
            let inner = self.inner.read().await;
            match inner.quote {
                Some(quote) => quote.converted_amount,
                None => {
                    return Err(PaymentError::InvalidTransition {
                        action: "start redirect payment",
                        state: inner.state.name(),
                    });
                }
            }
        };

        let generation = self
            .enter_path(PaymentProvider::Redirect, "start redirect payment")
            .await?;
        let reference = RedirectFlowController::make_reference(&self.investment);

        let link = match self
            .redirect
            .create_link(&self.investment, converted, &reference)
            .await
        {
            Ok(link) => link,
            Err(err) => {
                self.abort_attempt(generation, AttemptState::Failed).await;
                return Err(err);
            }
        };

        let window = match self.redirect.open_window(surface, &link) {
            Ok(window) => window,
            Err(err) => {
                self.abort_attempt(generation, AttemptState::Failed).await;
                return Err(err);
            }
        };

        let mut inner = self.inner.write().await;
        let Some(session) = Self::live_session(&mut inner, generation) else {
            return Err(PaymentError::SessionClosed);
        };
        session.external_ref = Some(link.reference.clone());
        inner.window = Some(window);
        Ok(link)
    }

    /// Polls the checkout status to a terminal outcome: a short initial
    /// delay, then a fixed interval. Status-check errors count as pending.
    /// The loop stops as soon as the window is confirmed closed or the
    /// session is torn down; a late poll result is never applied.
    pub async fn run_redirect(&self) -> Result<FlowOutcome> {
        let (generation, reference) = {
            let inner = self.inner.read().await;
            if inner.state != FlowState::RedirectFlow {
                return Err(PaymentError::InvalidTransition {
                    action: "poll checkout status",
                    state: inner.state.name(),
                });
            }
            let Some(session) = inner.session.as_ref() else {
                return Err(PaymentError::SessionClosed);
            };
            let Some(reference) = session.external_ref.clone() else {
                return Err(PaymentError::SessionSetup(
                    "no checkout reference available for polling".to_string(),
                ));
            };
            (session.generation, reference)
        };

        tokio::time::sleep(INITIAL_POLL_DELAY).await;

        let mut state = RedirectState::Polling;
        loop {
            if !self.session_alive(generation).await {
                return Err(PaymentError::SessionClosed);
            }

            let poll = self.redirect.poll_once(&reference).await;

            let window_open = {
                let inner = self.inner.read().await;
                if inner.session.as_ref().map(|s| s.generation) != Some(generation) {
                    // Torn down while the poll was in flight; drop the result.
                    return Err(PaymentError::SessionClosed);
                }
                inner.window.as_ref().is_some_and(|w| w.is_open())
            };

            state = next_state(state, &poll, window_open);
            match &state {
                RedirectState::Polling | RedirectState::LinkRequested => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                RedirectState::Succeeded => {
                    {
                        let mut inner = self.inner.write().await;
                        let Some(session) = Self::live_session(&mut inner, generation) else {
                            return Err(PaymentError::SessionClosed);
                        };
                        session.attempt_state = AttemptState::Succeeded;
                        inner.state = FlowState::Settling;
                        if let Some(window) = inner.window.take() {
                            window.close();
                        }
                    }
                    return self.settle_paid(generation, reference).await;
                }
                RedirectState::AmbiguousClosed => {
                    self.abort_attempt(generation, AttemptState::Abandoned).await;
                    info!(
                        investment = %self.investment.id,
                        "checkout window closed while pending; user directed to check status later"
                    );
                    return Ok(FlowOutcome::AmbiguousAbandoned);
                }
                RedirectState::Failed { reason } => {
                    let reason = reason.clone();
                    self.abort_attempt(generation, AttemptState::Failed).await;
                    return Ok(FlowOutcome::Declined { reason });
                }
            }
        }
    }

    /// Guarded entry into a provider path. The sibling path being
    /// mid-submission or mid-confirmation is a synchronous rejection, not a
    /// queue; no network call has been made when this fails.
    async fn enter_path(&self, provider: PaymentProvider, action: &'static str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        match inner.state {
            FlowState::MethodSelection => {
                if inner.session.as_ref().is_some_and(PaymentSession::is_in_flight) {
                    return Err(PaymentError::FlowBusy);
                }
            }
            FlowState::CardFlow | FlowState::RedirectFlow => return Err(PaymentError::FlowBusy),
            state => {
                return Err(PaymentError::InvalidTransition {
                    action,
                    state: state.name(),
                });
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut session = PaymentSession::new(provider, generation);
        session.attempt_state = AttemptState::Submitting;
        inner.session = Some(session);
        inner.state = match provider {
            PaymentProvider::Card => FlowState::CardFlow,
            PaymentProvider::Redirect => FlowState::RedirectFlow,
        };
        debug!(?provider, "provider path entered");
        Ok(generation)
    }

    /// Commits the paid status and invalidates every dependent read view as
    /// one set. A commit failure after a successful charge is the
    /// reconciliation case: flagged, never reported as a payment failure.
    async fn settle_paid(&self, generation: u64, transaction_ref: String) -> Result<FlowOutcome> {
        let outcome = match self
            .backend
            .commit_status(&self.investment.id, InvestmentStatus::Paid)
            .await
        {
            Ok(()) => {
                self.caches
                    .invalidate(&Self::settle_cache_keys(&self.investment.campaign))
                    .await;
                info!(investment = %self.investment.id, "investment settled as paid");
                FlowOutcome::Paid { transaction_ref }
            }
            Err(err) => {
                error!(
                    investment = %self.investment.id,
                    error = %err,
                    "charge succeeded but status commit failed; flagged for reconciliation"
                );
                FlowOutcome::PendingVerification { transaction_ref }
            }
        };

        let mut inner = self.inner.write().await;
        if inner.session.as_ref().is_some_and(|s| s.generation == generation) {
            if matches!(outcome, FlowOutcome::Paid { .. }) {
                inner.status = InvestmentStatus::Paid;
            }
            inner.session = None;
            inner.window = None;
            inner.state = FlowState::Closed;
        }
        Ok(outcome)
    }

    /// Uniform error-path cleanup: the session ends in the given terminal
    /// attempt state, is destroyed, and the flow returns to method selection,
    /// releasing the mutual-exclusion guard.
    async fn abort_attempt(&self, generation: u64, terminal: AttemptState) {
        let mut inner = self.inner.write().await;
        if inner.session.as_ref().is_some_and(|s| s.generation == generation) {
            debug!(attempt_state = ?terminal, "attempt ended without settling");
            inner.session = None;
            inner.window = None;
            inner.state = FlowState::MethodSelection;
        }
    }

    async fn session_alive(&self, generation: u64) -> bool {
        let inner = self.inner.read().await;
        inner.session.as_ref().map(|s| s.generation) == Some(generation)
    }

    fn live_session<'a>(
        inner: &'a mut FlowInner,
        generation: u64,
    ) -> Option<&'a mut PaymentSession> {
        inner
            .session
            .as_mut()
            .filter(|s| s.generation == generation)
    }

    fn settle_cache_keys(campaign: &CampaignId) -> [CacheKey; 5] {
        [
            CacheKey::InvestmentList,
            CacheKey::CampaignTotals(campaign.clone()),
            CacheKey::InvestorStats,
            CacheKey::FounderStats,
            CacheKey::NotificationFeed,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{sample_collaborators, sample_investment};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_flow_starts_closed() {
        let (collaborators, _handles) = sample_collaborators();
        let orchestrator =
            PaymentOrchestrator::new(sample_investment("inv-1", 500), collaborators);
        assert_eq!(orchestrator.state().await, FlowState::Closed);
        assert_eq!(orchestrator.status().await, InvestmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_open_lands_in_method_selection_with_quote() {
        let (collaborators, _handles) = sample_collaborators();
        let orchestrator =
            PaymentOrchestrator::new(sample_investment("inv-1", 500), collaborators);

        let quote = orchestrator.open().await;
        assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
        assert_eq!(quote.converted_amount, dec!(825000));
        assert_eq!(orchestrator.current_quote().await, Some(quote));
    }

    #[tokio::test]
    async fn test_entry_rejected_when_flow_closed() {
        let (collaborators, handles) = sample_collaborators();
        let orchestrator =
            PaymentOrchestrator::new(sample_investment("inv-1", 500), collaborators);

        let err = orchestrator.start_card().await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidTransition { .. }));
        assert_eq!(handles.card.intent_count(), 0);
    }

    #[tokio::test]
    async fn test_reopen_discards_previous_session() {
        let (collaborators, _handles) = sample_collaborators();
        let orchestrator =
            PaymentOrchestrator::new(sample_investment("inv-1", 500), collaborators);

        orchestrator.open().await;
        orchestrator.start_card().await.unwrap();
        assert!(orchestrator.session_state().await.is_some());

        orchestrator.open().await;
        assert!(orchestrator.session_state().await.is_none());
        assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
    }

    #[tokio::test]
    async fn test_close_leaves_status_untouched() {
        let (collaborators, handles) = sample_collaborators();
        let orchestrator =
            PaymentOrchestrator::new(sample_investment("inv-1", 500), collaborators);

        orchestrator.open().await;
        orchestrator.start_card().await.unwrap();
        orchestrator.close().await;

        assert_eq!(orchestrator.state().await, FlowState::Closed);
        assert_eq!(orchestrator.status().await, InvestmentStatus::Pending);
        assert_eq!(handles.backend.commit_count(), 0);
    }
}
