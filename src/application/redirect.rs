use crate::domain::investment::Investment;
use crate::domain::ports::{
    CheckoutLink, CheckoutSurface, CheckoutWindow, PollStatus, RedirectGatewayArc,
};
use crate::error::{PaymentError, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Delay before the first status poll, giving the provider time to register
/// the checkout session.
pub const INITIAL_POLL_DELAY: Duration = Duration::from_secs(2);
/// Fixed interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// States of the redirect path. `Polling` covers the open-window loop; the
/// three terminal states map onto success, provider failure, and the
/// user-closed-the-window-while-pending outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectState {
    LinkRequested,
    Polling,
    Succeeded,
    AmbiguousClosed,
    Failed { reason: String },
}

impl RedirectState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::LinkRequested | Self::Polling)
    }
}

/// Pure transition function for the polling loop, given the latest poll
/// result and whether the checkout window is still open.
///
/// A success wins even if the window has already been closed: the charge went
/// through out-of-band. Pending with a closed window is the ambiguous
/// outcome, not a failure. Terminal states absorb further input.
pub fn next_state(current: RedirectState, poll: &PollStatus, window_open: bool) -> RedirectState {
    if current.is_terminal() {
        return current;
    }
    match poll {
        PollStatus::Success => RedirectState::Succeeded,
        PollStatus::Failed { reason } => RedirectState::Failed {
            reason: reason
                .clone()
                .unwrap_or_else(|| "payment was not completed".to_string()),
        },
        PollStatus::Pending if window_open => RedirectState::Polling,
        PollStatus::Pending => RedirectState::AmbiguousClosed,
    }
}

/// Drives the asynchronous redirect path: checkout-link creation, window
/// opening and status polling. Timing and cancellation live with the
/// orchestrator, which owns the session.
pub struct RedirectFlowController {
    gateway: RedirectGatewayArc,
}

impl RedirectFlowController {
    pub fn new(gateway: RedirectGatewayArc) -> Self {
        Self { gateway }
    }

    /// Idempotency reference for one attempt, so a retried link request
    /// cannot double-create a provider-side session.
    pub fn make_reference(investment: &Investment) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("{}-{}", investment.id, millis)
    }

    /// Requests a checkout link. Failure is a session-setup failure.
    pub async fn create_link(
        &self,
        investment: &Investment,
        converted_amount: rust_decimal::Decimal,
        reference: &str,
    ) -> Result<CheckoutLink> {
        let link = self
            .gateway
            .create_checkout_link(&investment.id, investment.amount, converted_amount, reference)
            .await
            .map_err(|e| PaymentError::SessionSetup(e.0))?;
        info!(reference = %link.reference, "checkout link created");
        Ok(link)
    }

    /// Opens the checkout window. A blocked popup is a distinct, actionable
    /// input failure; polling against a window that never opened would be
    /// polling against nothing.
    pub fn open_window(
        &self,
        surface: &dyn CheckoutSurface,
        link: &CheckoutLink,
    ) -> Result<Box<dyn CheckoutWindow>> {
        surface.open_window(&link.url).ok_or_else(|| {
            PaymentError::Input(
                "the checkout window was blocked; allow popups for this site and try again"
                    .to_string(),
            )
        })
    }

    /// One status check. Transport errors count as still-pending: the
    /// provider may simply not have registered the session yet.
    pub async fn poll_once(&self, reference: &str) -> PollStatus {
        match self.gateway.check_status(reference).await {
            Ok(status) => status,
            Err(err) => {
                debug!(error = %err, "status check failed, treating as pending");
                PollStatus::Pending
            }
        }
    }
}
