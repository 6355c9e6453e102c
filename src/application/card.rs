use crate::domain::investment::Investment;
use crate::domain::ports::{CardDetails, CardGatewayArc, CardToken, ClientSecret, Confirmation};
use crate::error::{PaymentError, Result};
use tracing::{debug, info};

/// Drives the direct card-authorization path: intent creation, tokenization
/// and confirmation, each a separate round-trip and a separate failure point.
///
/// The controller classifies every gateway error into a [`PaymentError`]
/// category; the orchestrator never sees a raw error. Session bookkeeping
/// (attempt state, guard release) stays with the orchestrator.
pub struct CardFlowController {
    gateway: CardGatewayArc,
}

impl CardFlowController {
    pub fn new(gateway: CardGatewayArc) -> Self {
        Self { gateway }
    }

    /// Requests a payment intent for the investment amount. Failure here is
    /// a session-setup failure: terminal, session discarded.
    pub async fn create_intent(&self, investment: &Investment) -> Result<ClientSecret> {
        let secret = self
            .gateway
            .create_intent(&investment.id, investment.amount)
            .await
            .map_err(|e| PaymentError::SessionSetup(e.0))?;
        debug!(investment = %investment.id, "payment intent created");
        Ok(secret)
    }

    /// Tokenizes card details into a payment-method handle.
    ///
    /// The holder name is validated before any network call. A tokenization
    /// failure is surfaced with the provider's reason; the caller keeps the
    /// intent alive so the user can retry without a new `create_intent`.
    pub async fn tokenize(&self, details: &CardDetails, holder_name: &str) -> Result<CardToken> {
        if holder_name.trim().is_empty() {
            return Err(PaymentError::Input(
                "cardholder name is required".to_string(),
            ));
        }
        self.gateway
            .tokenize(details, holder_name)
            .await
            .map_err(|e| PaymentError::ProviderRejected(e.0))
    }

    /// Confirms the intent with the tokenized payment method. Success here is
    /// the authoritative provider-side signal; the backend commit that
    /// follows it is the terminal event the orchestrator settles on.
    pub async fn confirm(&self, secret: &ClientSecret, token: &CardToken) -> Result<Confirmation> {
        let confirmation = self
            .gateway
            .confirm(secret, token)
            .await
            .map_err(|e| PaymentError::ProviderRejected(e.0))?;
        info!(transaction_ref = %confirmation.transaction_ref, "card charge confirmed");
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::SimCardGateway;
    use std::sync::Arc;

    fn details() -> CardDetails {
        CardDetails {
            number: "4242424242424242".to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_holder_name_fails_before_network() {
        let gateway = Arc::new(SimCardGateway::new());
        let controller = CardFlowController::new(gateway.clone());

        let err = controller.tokenize(&details(), "   ").await.unwrap_err();
        assert!(matches!(err, PaymentError::Input(_)));
        assert_eq!(gateway.tokenize_count(), 0);
    }

    #[tokio::test]
    async fn test_tokenize_decline_carries_provider_reason() {
        let gateway = Arc::new(SimCardGateway::new().with_tokenize_decline("invalid card number"));
        let controller = CardFlowController::new(gateway);

        let err = controller
            .tokenize(&details(), "Ada Obi")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PaymentError::ProviderRejected("invalid card number".to_string())
        );
    }

    #[tokio::test]
    async fn test_intent_failure_is_session_setup() {
        let gateway = Arc::new(SimCardGateway::new().with_intent_failure("provider unavailable"));
        let controller = CardFlowController::new(gateway);
        let investment = crate::infrastructure::in_memory::sample_investment("inv-1", 500);

        let err = controller.create_intent(&investment).await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::SessionSetup("provider unavailable".to_string())
        );
    }
}
