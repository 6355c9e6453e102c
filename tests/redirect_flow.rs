mod common;

use common::orchestrator_with;
use fundpay::application::orchestrator::{FlowOutcome, FlowState, PaymentOrchestrator};
use fundpay::domain::investment::InvestmentId;
use fundpay::domain::investment::InvestmentStatus;
use fundpay::domain::ports::PollStatus;
use fundpay::domain::rate::RateSource;
use fundpay::error::PaymentError;
use fundpay::infrastructure::in_memory::{
    OfflineRateFeed, SimCardGateway, SimRedirectGateway, SimSurface, collaborators_with,
    sample_investment,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_redirect_flow_settles_paid_after_pending_polls() {
    let (orchestrator, handles) = orchestrator_with(
        SimCardGateway::new(),
        SimRedirectGateway::new().with_poll_script([
            PollStatus::Pending,
            PollStatus::Pending,
            PollStatus::Success,
        ]),
    );

    let quote = orchestrator.open().await;
    assert_eq!(quote.converted_amount, dec!(825000));

    let surface = Arc::new(SimSurface::new());
    let link = orchestrator.start_redirect(surface.as_ref()).await.unwrap();
    assert!(link.reference.starts_with("inv-1-"));

    let poller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_redirect().await })
    };
    let outcome = poller.await.unwrap().unwrap();

    assert_eq!(
        outcome,
        FlowOutcome::Paid {
            transaction_ref: link.reference.clone()
        }
    );
    assert_eq!(handles.redirect.poll_count(), 3);
    // The checkout window was closed programmatically on success.
    assert_eq!(surface.last_is_open(), Some(false));

    let id = InvestmentId::new("inv-1");
    assert_eq!(handles.backend.status_of(&id).await, InvestmentStatus::Paid);
    assert_eq!(handles.caches.invalidations().len(), 1);
    assert_eq!(orchestrator.state().await, FlowState::Closed);
    assert!(orchestrator.session_state().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_user_closing_window_is_ambiguous_not_failed() {
    // The provider keeps answering pending for the whole run.
    let (orchestrator, handles) =
        orchestrator_with(SimCardGateway::new(), SimRedirectGateway::new());

    orchestrator.open().await;
    let surface = Arc::new(SimSurface::new());
    orchestrator.start_redirect(surface.as_ref()).await.unwrap();

    let poller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_redirect().await })
    };

    // Let a couple of pending polls happen, then close the window.
    tokio::time::sleep(Duration::from_millis(5500)).await;
    surface.user_closes_last();

    let outcome = poller.await.unwrap().unwrap();
    assert_eq!(outcome, FlowOutcome::AmbiguousAbandoned);
    assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
    assert_eq!(orchestrator.status().await, InvestmentStatus::Pending);
    assert_eq!(handles.backend.commit_count(), 0);

    // Polling stopped with the window: no orphaned interval keeps firing.
    let polls_at_exit = handles.redirect.poll_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(handles.redirect.poll_count(), polls_at_exit);
}

#[tokio::test]
async fn test_blocked_popup_fails_without_polling() {
    let (orchestrator, handles) =
        orchestrator_with(SimCardGateway::new(), SimRedirectGateway::new());

    orchestrator.open().await;
    let surface = SimSurface::blocked();
    let err = orchestrator.start_redirect(&surface).await.unwrap_err();

    assert!(matches!(err, PaymentError::Input(_)));
    assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
    assert!(orchestrator.session_state().await.is_none());
    assert_eq!(handles.redirect.poll_count(), 0);
}

#[tokio::test]
async fn test_link_failure_discards_session() {
    let (orchestrator, _handles) = orchestrator_with(
        SimCardGateway::new(),
        SimRedirectGateway::new().with_link_failure("provider unavailable"),
    );

    orchestrator.open().await;
    let surface = SimSurface::new();
    let err = orchestrator.start_redirect(&surface).await.unwrap_err();

    assert_eq!(
        err,
        PaymentError::SessionSetup("provider unavailable".to_string())
    );
    assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
    assert_eq!(surface.window_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_fallback_leaves_redirect_usable() {
    let (collaborators, handles) = collaborators_with(
        Arc::new(OfflineRateFeed),
        SimCardGateway::new(),
        SimRedirectGateway::new().with_poll_script([PollStatus::Success]),
    );
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        sample_investment("inv-1", 500),
        collaborators,
    ));

    let quote = orchestrator.open().await;
    assert_eq!(quote.rate.source, RateSource::Fallback);
    assert_eq!(quote.rate.rate, dec!(1650));
    assert_eq!(quote.converted_amount, dec!(825000));

    let surface = Arc::new(SimSurface::new());
    orchestrator.start_redirect(surface.as_ref()).await.unwrap();
    let poller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_redirect().await })
    };
    let outcome = poller.await.unwrap().unwrap();
    assert!(matches!(outcome, FlowOutcome::Paid { .. }));

    let id = InvestmentId::new("inv-1");
    assert_eq!(handles.backend.status_of(&id).await, InvestmentStatus::Paid);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_provider_failure_is_declined() {
    let (orchestrator, handles) = orchestrator_with(
        SimCardGateway::new(),
        SimRedirectGateway::new().with_poll_script([
            PollStatus::Pending,
            PollStatus::Failed {
                reason: Some("charge was not completed".to_string()),
            },
        ]),
    );

    orchestrator.open().await;
    let surface = Arc::new(SimSurface::new());
    orchestrator.start_redirect(surface.as_ref()).await.unwrap();
    let poller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_redirect().await })
    };

    let outcome = poller.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        FlowOutcome::Declined {
            reason: "charge was not completed".to_string()
        }
    );
    assert_eq!(orchestrator.state().await, FlowState::MethodSelection);
    assert_eq!(handles.backend.commit_count(), 0);
}
