use clap::{Parser, ValueEnum};
use fundpay::application::orchestrator::PaymentOrchestrator;
use fundpay::domain::investment::{Amount, CampaignId, Investment, InvestmentId};
use fundpay::domain::ports::{CardDetails, PollStatus};
use fundpay::infrastructure::in_memory::{
    FixedRateFeed, OfflineRateFeed, SimCardGateway, SimRedirectGateway, SimSurface,
    collaborators_with,
};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

/// Drives one scripted payment scenario against simulated providers.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Investment amount in USD
    amount: Decimal,

    /// Provider path to drive
    #[arg(long, value_enum, default_value_t = Flow::Card)]
    flow: Flow,

    /// Script the provider to decline the charge
    #[arg(long)]
    decline: bool,

    /// Script the investor closing the checkout window mid-poll (redirect only)
    #[arg(long)]
    abandon: bool,

    /// Script an unreachable rate feed to exercise the fallback
    #[arg(long)]
    offline_rates: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Flow {
    Card,
    Redirect,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let amount = Amount::new(cli.amount).into_diagnostic()?;
    let investment = Investment::pending(
        InvestmentId::new("inv-demo"),
        CampaignId::new("campaign-demo"),
        amount,
    );

    let rates: Arc<dyn fundpay::domain::ports::RateFeed> = if cli.offline_rates {
        Arc::new(OfflineRateFeed)
    } else {
        Arc::new(FixedRateFeed::new(dec!(1650)))
    };

    let card = if cli.decline {
        SimCardGateway::new().with_confirm_decline("insufficient funds")
    } else {
        SimCardGateway::new()
    };

    let redirect = if cli.decline {
        SimRedirectGateway::new().with_poll_script([
            PollStatus::Pending,
            PollStatus::Failed {
                reason: Some("charge was not completed".to_string()),
            },
        ])
    } else if cli.abandon {
        // No terminal status: the provider keeps answering pending.
        SimRedirectGateway::new()
    } else {
        SimRedirectGateway::new().with_poll_script([PollStatus::Pending, PollStatus::Success])
    };

    let (collaborators, _handles) = collaborators_with(rates, card, redirect);
    let orchestrator = Arc::new(PaymentOrchestrator::new(investment, collaborators));

    let quote = orchestrator.open().await;
    println!(
        "quote: {}",
        serde_json::to_string(&quote).into_diagnostic()?
    );

    let outcome = match cli.flow {
        Flow::Card => {
            orchestrator.start_card().await.into_diagnostic()?;
            let details = CardDetails {
                number: "4242424242424242".to_string(),
                exp_month: 12,
                exp_year: 2030,
                cvc: "123".to_string(),
            };
            orchestrator
                .submit_card(&details, "Demo Investor")
                .await
                .into_diagnostic()?
        }
        Flow::Redirect => {
            let surface = Arc::new(SimSurface::new());
            let link = orchestrator
                .start_redirect(surface.as_ref())
                .await
                .into_diagnostic()?;
            println!("checkout window opened at {}", link.url);

            let poller = {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.run_redirect().await })
            };
            if cli.abandon {
                tokio::time::sleep(Duration::from_secs(3)).await;
                surface.user_closes_last();
            }
            poller.await.into_diagnostic()?.into_diagnostic()?
        }
    };

    println!(
        "outcome: {}",
        serde_json::to_string(&outcome).into_diagnostic()?
    );
    println!("investment status: {}", orchestrator.status().await);

    Ok(())
}
