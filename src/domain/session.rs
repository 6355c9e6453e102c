use serde::Serialize;
use std::time::Instant;

/// Which of the two mutually exclusive provider paths a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Card,
    Redirect,
}

/// Lifecycle of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    #[default]
    Idle,
    AwaitingInput,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
    Abandoned,
}

impl AttemptState {
    /// In-flight states are what the mutual-exclusion guard checks. No error
    /// path may return control with the session left in one of these.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Confirming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Abandoned)
    }
}

/// One attempt to settle one investment through one provider path.
///
/// Created by the orchestrator when a path is entered and destroyed on a
/// terminal outcome or when the presentation surface closes. `generation`
/// ties every in-flight network result to the session that issued it: a
/// result whose generation no longer matches the orchestrator's current one
/// is late and must be dropped.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub provider: PaymentProvider,
    /// Provider-issued identifier: the client secret on the card path, the
    /// idempotency reference on the redirect path. Required before
    /// confirmation or polling.
    pub external_ref: Option<String>,
    pub attempt_state: AttemptState,
    pub created_at: Instant,
    pub generation: u64,
}

impl PaymentSession {
    pub fn new(provider: PaymentProvider, generation: u64) -> Self {
        Self {
            provider,
            external_ref: None,
            attempt_state: AttemptState::Idle,
            created_at: Instant::now(),
            generation,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.attempt_state.is_in_flight()
    }
}
