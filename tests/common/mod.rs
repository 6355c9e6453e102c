use fundpay::application::orchestrator::PaymentOrchestrator;
use fundpay::domain::ports::CardDetails;
use fundpay::infrastructure::in_memory::{
    FixedRateFeed, SimCardGateway, SimHandles, SimRedirectGateway, collaborators_with,
    sample_investment,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Orchestrator for a $500 pending investment wired to the given scripted
/// gateways, with a fixed 1650 rate feed.
pub fn orchestrator_with(
    card: SimCardGateway,
    redirect: SimRedirectGateway,
) -> (Arc<PaymentOrchestrator>, SimHandles) {
    let (collaborators, handles) =
        collaborators_with(Arc::new(FixedRateFeed::new(dec!(1650))), card, redirect);
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        sample_investment("inv-1", 500),
        collaborators,
    ));
    (orchestrator, handles)
}

pub fn card_details() -> CardDetails {
    CardDetails {
        number: "4242424242424242".to_string(),
        exp_month: 12,
        exp_year: 2030,
        cvc: "123".to_string(),
    }
}
