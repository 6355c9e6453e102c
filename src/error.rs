use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Raw failure reported by an external collaborator.
///
/// Gateway errors never cross the path-controller boundary: controllers
/// translate them into a [`PaymentError`] category before the orchestrator
/// sees them, so guard-release logic stays uniform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GatewayError(pub String);

impl GatewayError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Classified payment failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Intent or checkout-link creation failed. Terminal for the attempt.
    #[error("could not set up payment session: {0}")]
    SessionSetup(String),
    /// User-correctable input problem (missing cardholder name, blocked
    /// popup). The user may fix it and retry immediately.
    #[error("{0}")]
    Input(String),
    /// The provider declined or rejected the charge.
    #[error("payment rejected: {0}")]
    ProviderRejected(String),
    /// The charge succeeded but the backend status commit did not. Money has
    /// moved; this must never be reported as a payment failure.
    #[error("payment received, status pending verification: {0}")]
    Reconciliation(String),
    /// Another payment attempt is mid-submission or mid-confirmation.
    #[error("another payment attempt is already in flight")]
    FlowBusy,
    /// The flow was asked to do something its current state does not allow.
    #[error("cannot {action} while the payment flow is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    /// The session was torn down while a result was in flight. Late results
    /// observing this must be discarded, never applied.
    #[error("payment session was closed")]
    SessionClosed,
}
