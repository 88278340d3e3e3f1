//! End-to-end pipeline tests

#[cfg(test)]
mod tests {
    use crate::audit::{AuditSink, LogAuditSink};
    use crate::config::{ApprovalConfig, EdgeThresholds, RiskLimits, StressConfig};
    use crate::edge::EdgeDetector;
    use crate::engine::AnalysisEngine;
    use crate::governance::GovernanceEngine;
    use crate::probability::{ProbabilityEngine, StaticAnchorProvider};
    use crate::proposal::{
        ApprovalInbox, ApprovalWait, ExecutionConnector, OrderRequest, OrderResult,
        ProposalRegistry, ProposalStatus, QueuedNotifier,
    };
    use crate::risk::{
        BankrollTracker, MarketView, MonteCarloStressTester, RiskGateway, RiskRequest,
        StressScenario,
    };
    use crate::types::{ExternalAnchor, PriceSnapshot, Side};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const APPROVER: &str = "+15555550100";

    struct AcceptingConnector;

    #[async_trait]
    impl ExecutionConnector for AcceptingConnector {
        async fn place_order(&self, request: &OrderRequest) -> crate::error::Result<OrderResult> {
            Ok(OrderResult {
                status: "accepted".to_string(),
                order_id: Some(format!("ord-{}", request.client_order_id)),
            })
        }
    }

    fn reference_snapshot() -> PriceSnapshot {
        PriceSnapshot {
            ticker: "FED-RATE-25MAR".to_string(),
            timestamp: Utc::now(),
            yes_bid: 72.0,
            yes_ask: 74.0,
            no_bid: 26.0,
            no_ask: 28.0,
            volume: 45_000,
            open_interest: 12_000,
        }
    }

    fn build_engine(thresholds: EdgeThresholds, provider: StaticAnchorProvider) -> AnalysisEngine {
        let limits = RiskLimits::default();
        let audit: Arc<dyn AuditSink> = Arc::new(LogAuditSink);
        let tracker = Arc::new(parking_lot::RwLock::new(BankrollTracker::new(&limits)));
        let gateway = Arc::new(RiskGateway::new(limits, StressConfig::default(), tracker));
        let approval = ApprovalConfig {
            approver: APPROVER.to_string(),
            timeout_secs: 2,
            poll_interval_ms: 10,
        };
        let registry = Arc::new(ProposalRegistry::new(
            approval,
            Arc::new(QueuedNotifier::new()),
            Arc::new(ApprovalInbox::new(APPROVER)),
            audit.clone(),
        ));
        AnalysisEngine::new(
            Arc::new(provider),
            Arc::new(ProbabilityEngine::new()),
            EdgeDetector::new(thresholds),
            gateway,
            registry,
            Arc::new(GovernanceEngine::new()),
            audit,
        )
    }

    #[test]
    fn test_reference_market_ensemble_band() {
        // A 72/74 market with a single strong 0.70 anchor must land the
        // ensemble in [0.60, 0.80]; with production gates any directional
        // side additionally needs the confirmation minimum.
        let mut provider = StaticAnchorProvider::new();
        provider.insert(
            "FED-RATE-25MAR",
            vec![ExternalAnchor::new(
                "cme_fedwatch",
                0.70,
                0.86,
                "CME watch implies hold probability near 70%",
            )],
        );
        let engine = build_engine(EdgeThresholds::default(), provider);
        let analysis = engine.analyze_snapshot(&reference_snapshot());

        assert!((0.60..=0.80).contains(&analysis.estimate.ensemble_yes));
        if analysis.signal.side.is_directional() {
            assert!(analysis.decision.confirmation_count() >= 4);
        }
    }

    #[test]
    fn test_spec_stress_profile_is_well_formed() {
        // bankroll=50, stake=0.50, p=0.58, payout=0.35, 1000x25.
        let tester = MonteCarloStressTester::new(StressConfig::default(), 40.0);
        let report = tester.run_seeded(
            &StressScenario {
                bankroll: 50.0,
                risk_amount: 0.50,
                win_probability: 0.58,
                payout_multiple: 0.35,
            },
            7,
        );
        assert_eq!(report.simulations, 1_000);
        assert_eq!(report.steps, 25);
        assert!((0.0..=1.0).contains(&report.ruin_probability));
        assert!(report.p5_terminal <= report.p50_terminal);
        assert!(report.p50_terminal <= report.p95_terminal);
    }

    #[tokio::test]
    async fn test_full_lifecycle_to_execution() {
        // Loose gates and a strongly mispriced market so the pipeline runs
        // all the way through approval and execution.
        let thresholds = EdgeThresholds {
            min_ev_threshold: -2.0,
            min_confidence: 0.10,
            min_confirmations: 0,
        };
        let mut provider = StaticAnchorProvider::new();
        provider.insert(
            "HOT-MARKET",
            vec![
                ExternalAnchor::new("model_a", 0.95, 0.90, "strong consensus"),
                ExternalAnchor::new("model_b", 0.95, 0.90, "strong consensus"),
                ExternalAnchor::new("model_c", 0.95, 0.90, "strong consensus"),
            ],
        );
        let engine = build_engine(thresholds, provider);

        let snapshot = PriceSnapshot {
            ticker: "HOT-MARKET".to_string(),
            timestamp: Utc::now(),
            yes_bid: 38.0,
            yes_ask: 40.0,
            no_bid: 58.0,
            no_ask: 60.0,
            volume: 45_000,
            open_interest: 12_000,
        };

        let outcome = engine.propose_trade(&snapshot).await.unwrap();
        assert!(outcome.risk.approved, "blockers: {:?}", outcome.risk.blockers);
        let proposal = outcome.proposal.unwrap();
        assert_eq!(proposal.status, ProposalStatus::PendingApproval);

        // The whitelisted approver replies with the exact phrase.
        let registry = engine.registry();
        registry
            .inbox()
            .record_incoming(APPROVER, format!("APPROVE TRADE ID {}", proposal.proposal_id))
            .await;
        let wait = registry
            .wait_for_approval(&proposal.proposal_id)
            .await
            .unwrap();
        assert_eq!(wait, ApprovalWait::Approved);

        let executed = registry
            .execute(&proposal.proposal_id, &AcceptingConnector)
            .await
            .unwrap();
        assert_eq!(executed.status, ProposalStatus::Executed);

        // A second execute is a conflict, not a double-submit.
        let err = registry
            .execute(&proposal.proposal_id, &AcceptingConnector)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::GuardError::ProposalConflict(_)));
    }

    #[tokio::test]
    async fn test_governance_feedback_shrinks_next_assessment() {
        let limits = RiskLimits::default();
        let tracker = Arc::new(parking_lot::RwLock::new(BankrollTracker::new(&limits)));
        let gateway = RiskGateway::new(limits, StressConfig::default(), tracker);
        let governance = GovernanceEngine::new();

        let request = RiskRequest {
            market: MarketView::Snapshot(PriceSnapshot {
                ticker: "FED-RATE-25MAR".to_string(),
                timestamp: Utc::now(),
                yes_bid: 38.0,
                yes_ask: 40.0,
                no_bid: 58.0,
                no_ask: 60.0,
                volume: 20_000,
                open_interest: 9_000,
            }),
            side: Side::Yes,
            probability_yes: 0.85,
        };

        let before = gateway.assess_seeded(&request, 7);
        // A bad week triggers capital preservation; sizing shrinks.
        governance.run_self_review(&gateway, 0.0, 0.9).await;
        let after = gateway.assess_seeded(&request, 7);

        assert!(after.sizing.kelly_fraction_applied < before.sizing.kelly_fraction_applied);
        assert!(gateway.governance_scale() < 1.0);
    }

    #[tokio::test]
    async fn test_bankroll_growth_unlocks_higher_sizing_tier() {
        let limits = RiskLimits::default();
        let tracker = Arc::new(parking_lot::RwLock::new(BankrollTracker::new(&limits)));
        let gateway = RiskGateway::new(limits, StressConfig::default(), tracker.clone());

        let request = RiskRequest {
            market: MarketView::Snapshot(reference_snapshot()),
            side: Side::Yes,
            probability_yes: 0.80,
        };

        let base = gateway.assess_seeded(&request, 7);
        tracker.write().apply_pnl(dec!(10.00)); // +20% growth
        let grown = gateway.assess_seeded(&request, 7);

        assert!(grown.sizing.kelly_fraction_applied > base.sizing.kelly_fraction_applied);
    }
}
