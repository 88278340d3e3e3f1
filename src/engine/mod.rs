//! Decision pipeline orchestration
//!
//! Wires the probability engine, edge detector, risk gateway, proposal
//! registry, and governance loop into one explainable flow:
//!
//! ```text
//! snapshot -> probability -> edge -> risk -> (if approved) proposal
//! ```
//!
//! All collaborators are explicit constructed dependencies; lifecycle is
//! owned by the process entry point, not by module-level singletons.

use crate::audit::{AuditEvent, AuditSeverity, AuditSink};
use crate::edge::{EdgeDecision, EdgeDetector};
use crate::governance::{DecisionRecord, GovernanceEngine, GovernanceReport};
use crate::probability::{AnchorProvider, ProbabilityEngine, ProbabilityEstimate};
use crate::proposal::{ProposalRegistry, TradeProposal};
use crate::risk::{MarketView, RiskAssessment, RiskGateway, RiskRequest};
use crate::types::{ExternalAnchor, PriceSnapshot, Side};
use rust_decimal::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Explainable EV signal for API and logging surfaces
#[derive(Debug, Clone, Serialize)]
pub struct EvSignal {
    pub ticker: String,
    pub side: Side,
    pub ev_percent: f64,
    pub confidence: f64,
    pub explanation: String,
    pub data_sources: Vec<String>,
}

/// Full analysis payload for one market snapshot
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub signal: EvSignal,
    pub estimate: ProbabilityEstimate,
    pub decision: EdgeDecision,
    pub snapshot: PriceSnapshot,
}

/// Composite payload for the live proposal flow
#[derive(Debug, Clone, Serialize)]
pub struct ProposalOutcome {
    pub analysis: AnalysisResult,
    pub risk: RiskAssessment,
    pub proposal: Option<TradeProposal>,
}

/// High-level engine computing edge, risk, and proposals for snapshots
pub struct AnalysisEngine {
    anchors: Arc<dyn AnchorProvider>,
    probability: Arc<ProbabilityEngine>,
    edge: EdgeDetector,
    gateway: Arc<RiskGateway>,
    registry: Arc<ProposalRegistry>,
    governance: Arc<GovernanceEngine>,
    audit: Arc<dyn AuditSink>,
}

impl AnalysisEngine {
    pub fn new(
        anchors: Arc<dyn AnchorProvider>,
        probability: Arc<ProbabilityEngine>,
        edge: EdgeDetector,
        gateway: Arc<RiskGateway>,
        registry: Arc<ProposalRegistry>,
        governance: Arc<GovernanceEngine>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            anchors,
            probability,
            edge,
            gateway,
            registry,
            governance,
            audit,
        }
    }

    pub fn gateway(&self) -> Arc<RiskGateway> {
        self.gateway.clone()
    }

    pub fn registry(&self) -> Arc<ProposalRegistry> {
        self.registry.clone()
    }

    /// Compute the explainable edge analysis for one snapshot
    pub fn analyze_snapshot(&self, snapshot: &PriceSnapshot) -> AnalysisResult {
        let anchors = self.anchors.anchors_for(&snapshot.ticker);
        let estimate = self.probability.estimate(snapshot, &anchors);
        let confidence = ProbabilityEngine::aggregate_confidence(&estimate, &anchors);
        let decision = self.edge.evaluate(snapshot, &estimate, confidence);

        let explanation = Self::build_explanation(&estimate, &decision, &anchors);
        let signal = EvSignal {
            ticker: snapshot.ticker.clone(),
            side: decision.side,
            ev_percent: decision.ev_percent,
            confidence,
            explanation,
            data_sources: anchors.iter().map(|a| a.source.clone()).collect(),
        };

        AnalysisResult {
            signal,
            estimate,
            decision,
            snapshot: snapshot.clone(),
        }
    }

    /// Analyze, risk-check, and (if risk approves) open a human-approval
    /// proposal. Also records the decision for governance replay and emits
    /// audit events for the outcome.
    pub async fn propose_trade(&self, snapshot: &PriceSnapshot) -> crate::error::Result<ProposalOutcome> {
        let analysis = self.analyze_snapshot(snapshot);

        self.governance
            .record_decision(DecisionRecord {
                ticker: analysis.signal.ticker.clone(),
                side: analysis.signal.side,
                confidence: analysis.signal.confidence,
                ev_percent: analysis.signal.ev_percent,
            })
            .await;

        let request = RiskRequest {
            market: MarketView::Snapshot(snapshot.clone()),
            side: analysis.decision.side,
            probability_yes: analysis.estimate.ensemble_yes,
        };
        let risk = self.gateway.assess(&request);

        if !risk.stress.pass_threshold {
            self.audit
                .record(AuditEvent::new(
                    "risk_gateway",
                    "stress_test_failed",
                    AuditSeverity::Warning,
                    format!(
                        "Stress test ruin probability {:.2}% above ceiling",
                        risk.stress.ruin_probability * 100.0
                    ),
                    json!({"ticker": risk.ticker, "ruin_probability": risk.stress.ruin_probability}),
                ))
                .await;
        }

        let proposal = if risk.approved {
            let proposal = self
                .registry
                .create(
                    &risk.ticker,
                    risk.side,
                    risk.contracts,
                    risk.sizing.recommended_risk,
                )
                .await?;
            info!(
                ticker = %risk.ticker,
                proposal_id = %proposal.proposal_id,
                risk = %risk.sizing.recommended_risk,
                "Trade proposal dispatched for approval"
            );
            Some(proposal)
        } else {
            self.audit
                .record(AuditEvent::new(
                    "risk_gateway",
                    "trade_blocked",
                    AuditSeverity::Info,
                    format!("Trade blocked for {}", risk.ticker),
                    json!({"ticker": risk.ticker, "blockers": risk.blockers}),
                ))
                .await;
            None
        };

        Ok(ProposalOutcome {
            analysis,
            risk,
            proposal,
        })
    }

    /// Trigger one governance self-review cycle over the recorded history,
    /// using the live loss accumulators from the gateway's tracker.
    pub async fn self_review(&self) -> GovernanceReport {
        let (daily_loss, weekly_loss) = {
            let tracker = self.gateway.tracker();
            let tracker = tracker.read();
            (
                tracker.daily_loss.to_f64().unwrap_or(0.0),
                tracker.weekly_loss.to_f64().unwrap_or(0.0),
            )
        };
        let report = self
            .governance
            .run_self_review(&self.gateway, daily_loss, weekly_loss)
            .await;

        self.audit
            .record(AuditEvent::new(
                "governance",
                "self_review",
                AuditSeverity::Info,
                format!(
                    "Self-review set Kelly scale to {:.2} ({})",
                    report.adjustment.kelly_scale_factor, report.adjustment.risk_mode
                ),
                json!({
                    "kelly_scale_factor": report.adjustment.kelly_scale_factor,
                    "risk_mode": report.adjustment.risk_mode,
                    "trade_count": report.snapshot.trade_count,
                }),
            ))
            .await;

        report
    }

    fn build_explanation(
        estimate: &ProbabilityEstimate,
        decision: &EdgeDecision,
        anchors: &[ExternalAnchor],
    ) -> String {
        let sources = anchors
            .iter()
            .map(|a| a.source.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let confirmations = decision
            .confirmations
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let confirmations = if confirmations.is_empty() {
            "none".to_string()
        } else {
            confirmations
        };
        format!(
            "Edge analysis for {}\n\
             - Market implied YES: {:.1}%\n\
             - External consensus YES: {:.1}%\n\
             - Bayesian YES: {:.1}%\n\
             - Internal signal YES: {:.1}%\n\
             - Ensemble YES: {:.1}%\n\
             - Confirmations ({}): {}\n\
             - Side: {} | EV: {:.2}%\n\
             - Sources: {}",
            estimate.ticker,
            estimate.market_implied_yes * 100.0,
            estimate.external_yes * 100.0,
            estimate.bayesian_yes * 100.0,
            estimate.internal_yes * 100.0,
            estimate.ensemble_yes * 100.0,
            decision.confirmation_count(),
            confirmations,
            decision.side,
            decision.ev_percent,
            sources
        )
    }
}
