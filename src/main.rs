//! KalshiGuard CLI
//!
//! Capital-preservation decision engine for Kalshi binary markets.

use chrono::Utc;
use clap::{Parser, Subcommand};
use kalshi_guard::{
    audit::{AuditSink, LogAuditSink},
    config::Config,
    edge::EdgeDetector,
    engine::AnalysisEngine,
    governance::GovernanceEngine,
    probability::{ProbabilityEngine, StaticAnchorProvider},
    proposal::{ApprovalInbox, ProposalRegistry, QueuedNotifier},
    risk::{BankrollTracker, RiskGateway},
    types::PriceSnapshot,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kalshi-guard")]
#[command(about = "Capital-preservation decision engine for binary prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a market snapshot and print the edge decision
    Analyze {
        /// Market ticker to analyze
        ticker: String,
    },
    /// Run the full pipeline and open a proposal if risk approves
    Propose {
        /// Market ticker to evaluate
        ticker: String,
    },
    /// Run one governance self-review cycle
    SelfReview,
    /// Show bankroll and governance status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let engine = build_engine(&config);

    match cli.command {
        Commands::Analyze { ticker } => {
            let snapshot = demo_snapshot(&ticker);
            let analysis = engine.analyze_snapshot(&snapshot);
            println!("{}", analysis.signal.explanation);
            println!(
                "\nDecision: {} | EV {:.2}% | confidence {:.4}",
                analysis.signal.side, analysis.signal.ev_percent, analysis.signal.confidence
            );
        }
        Commands::Propose { ticker } => {
            let snapshot = demo_snapshot(&ticker);
            let outcome = engine.propose_trade(&snapshot).await?;
            println!("{}", outcome.analysis.signal.explanation);
            if let Some(proposal) = &outcome.proposal {
                println!(
                    "\nProposal {} pending approval ({} x{} contracts, max risk ${})",
                    proposal.proposal_id, proposal.side, proposal.contracts, proposal.max_risk
                );
            } else {
                println!("\nTrade blocked: {}", outcome.risk.blockers.join(", "));
            }
        }
        Commands::SelfReview => {
            let report = engine.self_review().await;
            println!(
                "Kelly scale: {:.2} | mode: {}",
                report.adjustment.kelly_scale_factor, report.adjustment.risk_mode
            );
            for line in &report.adjustment.rationale {
                println!("- {}", line);
            }
        }
        Commands::Status => {
            let gateway = engine.gateway();
            let tracker = gateway.tracker();
            let tracker = tracker.read().clone();
            println!(
                "Bankroll: ${} | buying power: ${} | exposure capacity: ${}",
                tracker.current_bankroll(),
                tracker.buying_power(),
                tracker.exposure_capacity()
            );
            println!(
                "Kelly multiplier: {:.2}x | governance scale: {:.2}x",
                tracker.kelly_multiplier(),
                gateway.governance_scale()
            );
        }
    }

    Ok(())
}

fn build_engine(config: &Config) -> AnalysisEngine {
    let audit: Arc<dyn AuditSink> = Arc::new(LogAuditSink);
    let tracker = Arc::new(parking_lot::RwLock::new(BankrollTracker::new(&config.risk)));
    let gateway = Arc::new(RiskGateway::new(
        config.risk.clone(),
        config.stress.clone(),
        tracker,
    ));
    let registry = Arc::new(ProposalRegistry::new(
        config.approval.clone(),
        Arc::new(QueuedNotifier::new()),
        Arc::new(ApprovalInbox::new(config.approval.approver.clone())),
        audit.clone(),
    ));

    AnalysisEngine::new(
        Arc::new(StaticAnchorProvider::with_reference_anchors()),
        Arc::new(ProbabilityEngine::new()),
        EdgeDetector::new(config.thresholds.clone()),
        gateway,
        registry,
        Arc::new(GovernanceEngine::new()),
        audit,
    )
}

/// Deterministic demo snapshot standing in for the market-data collaborator
fn demo_snapshot(ticker: &str) -> PriceSnapshot {
    match ticker {
        "WEATHER-NYC-SNOW" => PriceSnapshot {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            yes_bid: 44.0,
            yes_ask: 47.0,
            no_bid: 52.0,
            no_ask: 55.0,
            volume: 8_200,
            open_interest: 3_100,
        },
        _ => PriceSnapshot {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            yes_bid: 72.0,
            yes_ask: 74.0,
            no_bid: 26.0,
            no_ask: 28.0,
            volume: 45_000,
            open_interest: 12_000,
        },
    }
}
