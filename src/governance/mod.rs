//! Governance self-review loop
//!
//! Periodically replays the engine's decision history into a synthetic equity
//! curve, derives a performance snapshot, and computes conservative risk
//! adjustments. The resulting Kelly scale factor is the only feedback channel
//! into live sizing: it is published to the risk gateway, last writer wins.

use crate::risk::RiskGateway;
use crate::types::Side;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// One historical decision, as replayed for self-review
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub ticker: String,
    pub side: Side,
    pub confidence: f64,
    pub ev_percent: f64,
}

/// Realized-performance view reconstructed from decision history
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerformanceSnapshot {
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub daily_loss: f64,
    pub weekly_loss: f64,
}

impl PerformanceSnapshot {
    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            return 0.5;
        }
        self.wins as f64 / self.trade_count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    Normal,
    CapitalPreservation,
}

impl std::fmt::Display for RiskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskMode::Normal => write!(f, "normal"),
            RiskMode::CapitalPreservation => write!(f, "capital_preservation"),
        }
    }
}

/// Parameter adjustment computed by one self-review cycle
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceAdjustment {
    /// Multiplier applied to Kelly sizing, clamped to [0.40, 1.10]
    pub kelly_scale_factor: f64,
    pub min_confidence_delta: f64,
    pub min_ev_delta: f64,
    pub risk_mode: RiskMode,
    pub rationale: Vec<String>,
}

/// Computes conservative parameter adjustments from recent performance
pub struct GovernancePolicy;

impl GovernancePolicy {
    /// Pure policy function over one performance snapshot
    pub fn evaluate(&self, perf: &PerformanceSnapshot) -> GovernanceAdjustment {
        let mut rationale = Vec::new();
        let mut kelly_scale: f64 = 1.0;
        let mut min_conf_delta = 0.0;
        let mut min_ev_delta = 0.0;
        let mut risk_mode = RiskMode::Normal;

        let win_rate = perf.win_rate();

        if perf.max_drawdown >= 2.0 || perf.weekly_loss >= 0.8 {
            kelly_scale *= 0.5;
            min_conf_delta += 0.01;
            min_ev_delta += 0.05;
            risk_mode = RiskMode::CapitalPreservation;
            rationale.push("High drawdown detected; halving Kelly exposure.".to_string());
        }

        if perf.daily_loss >= 0.20 {
            kelly_scale *= 0.7;
            min_conf_delta += 0.005;
            rationale.push("Daily loss elevated; reducing sizing further.".to_string());
        }

        if perf.trade_count >= 20 && win_rate < 0.50 {
            kelly_scale *= 0.85;
            min_ev_delta += 0.03;
            rationale.push("Sub-50% win rate over sample; tightening edge threshold.".to_string());
        }

        if perf.total_pnl > 1.5 && perf.max_drawdown < 0.5 && win_rate >= 0.58 {
            kelly_scale = (kelly_scale * 1.05).min(1.10);
            rationale.push("Stable positive performance; slight measured sizing unlock.".to_string());
        }

        if rationale.is_empty() {
            rationale.push("Performance stable; no policy changes required.".to_string());
        }

        GovernanceAdjustment {
            kelly_scale_factor: kelly_scale.clamp(0.40, 1.10),
            min_confidence_delta: min_conf_delta,
            min_ev_delta,
            risk_mode,
            rationale,
        }
    }
}

/// Self-review outcome: the snapshot it saw and the adjustment it chose
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceReport {
    pub snapshot: PerformanceSnapshot,
    pub adjustment: GovernanceAdjustment,
}

/// Runs governance analysis over the recorded decision history
pub struct GovernanceEngine {
    policy: GovernancePolicy,
    history: RwLock<Vec<DecisionRecord>>,
}

impl GovernanceEngine {
    pub fn new() -> Self {
        Self {
            policy: GovernancePolicy,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Record one pipeline decision for future replay
    pub async fn record_decision(&self, record: DecisionRecord) {
        self.history.write().await.push(record);
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Replay the decision history into a synthetic equity curve.
    ///
    /// Per-trade pnl = clamp(ev_percent/100 x 0.5, +/-0.5) x clamp(confidence,
    /// 0, 1); HOLD entries are skipped. Drawdown is peak-to-trough on the
    /// resulting curve.
    pub async fn build_performance_snapshot(
        &self,
        daily_loss: f64,
        weekly_loss: f64,
    ) -> PerformanceSnapshot {
        let history = self.history.read().await;

        let mut equity = 0.0f64;
        let mut peak = 0.0f64;
        let mut max_drawdown = 0.0f64;
        let mut wins = 0usize;
        let mut losses = 0usize;

        for record in history.iter() {
            if !record.side.is_directional() {
                continue;
            }
            let pnl = ((record.ev_percent / 100.0) * 0.5).clamp(-0.5, 0.5)
                * record.confidence.clamp(0.0, 1.0);
            if pnl >= 0.0 {
                wins += 1;
            } else {
                losses += 1;
            }
            equity += pnl;
            peak = peak.max(equity);
            max_drawdown = max_drawdown.max(peak - equity);
        }

        PerformanceSnapshot {
            trade_count: wins + losses,
            wins,
            losses,
            total_pnl: equity,
            max_drawdown,
            daily_loss,
            weekly_loss,
        }
    }

    /// One self-review cycle: rebuild performance, evaluate policy, and
    /// publish the Kelly scale factor to the risk gateway.
    pub async fn run_self_review(
        &self,
        gateway: &RiskGateway,
        daily_loss: f64,
        weekly_loss: f64,
    ) -> GovernanceReport {
        let snapshot = self.build_performance_snapshot(daily_loss, weekly_loss).await;
        let adjustment = self.policy.evaluate(&snapshot);

        info!(
            kelly_scale = adjustment.kelly_scale_factor,
            risk_mode = %adjustment.risk_mode,
            trades = snapshot.trade_count,
            "Governance self-review complete"
        );
        gateway.set_governance_scale(adjustment.kelly_scale_factor);

        GovernanceReport {
            snapshot,
            adjustment,
        }
    }
}

impl Default for GovernanceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskLimits, StressConfig};
    use crate::risk::BankrollTracker;
    use std::sync::Arc;

    fn snapshot(
        trade_count: usize,
        wins: usize,
        total_pnl: f64,
        max_drawdown: f64,
        daily_loss: f64,
        weekly_loss: f64,
    ) -> PerformanceSnapshot {
        PerformanceSnapshot {
            trade_count,
            wins,
            losses: trade_count - wins,
            total_pnl,
            max_drawdown,
            daily_loss,
            weekly_loss,
        }
    }

    #[test]
    fn test_stable_performance_leaves_policy_unchanged() {
        let adjustment = GovernancePolicy.evaluate(&snapshot(10, 6, 0.5, 0.1, 0.0, 0.0));
        assert_eq!(adjustment.kelly_scale_factor, 1.0);
        assert_eq!(adjustment.risk_mode, RiskMode::Normal);
        assert_eq!(
            adjustment.rationale,
            vec!["Performance stable; no policy changes required.".to_string()]
        );
    }

    #[test]
    fn test_deep_drawdown_enters_capital_preservation() {
        let adjustment = GovernancePolicy.evaluate(&snapshot(15, 7, -1.0, 2.3, 0.0, 0.9));
        assert!(adjustment.kelly_scale_factor < 1.0);
        assert_eq!(adjustment.risk_mode, RiskMode::CapitalPreservation);
        assert!(adjustment.min_ev_delta >= 0.05);
    }

    #[test]
    fn test_daily_loss_compounds_the_cut() {
        let adjustment = GovernancePolicy.evaluate(&snapshot(15, 7, -1.0, 2.3, 0.25, 0.9));
        // 0.5 x 0.7 = 0.35, clamped up to the 0.40 band floor.
        assert_eq!(adjustment.kelly_scale_factor, 0.40);
        assert_eq!(adjustment.rationale.len(), 2);
    }

    #[test]
    fn test_poor_win_rate_over_sample_tightens_threshold() {
        let adjustment = GovernancePolicy.evaluate(&snapshot(25, 10, -0.3, 0.4, 0.0, 0.0));
        assert!((adjustment.kelly_scale_factor - 0.85).abs() < 1e-9);
        assert!((adjustment.min_ev_delta - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_strong_performance_unlocks_capped_scale() {
        let adjustment = GovernancePolicy.evaluate(&snapshot(30, 18, 2.0, 0.2, 0.0, 0.0));
        assert!(adjustment.kelly_scale_factor > 1.0);
        assert!(adjustment.kelly_scale_factor <= 1.10);
    }

    #[test]
    fn test_scale_always_within_band() {
        let worst = GovernancePolicy.evaluate(&snapshot(40, 10, -5.0, 9.0, 5.0, 5.0));
        assert!(worst.kelly_scale_factor >= 0.40);
        let best = GovernancePolicy.evaluate(&snapshot(40, 35, 9.0, 0.0, 0.0, 0.0));
        assert!(best.kelly_scale_factor <= 1.10);
    }

    fn record(side: Side, confidence: f64, ev_percent: f64) -> DecisionRecord {
        DecisionRecord {
            ticker: "TEST".to_string(),
            side,
            confidence,
            ev_percent,
        }
    }

    #[tokio::test]
    async fn test_replay_skips_hold_and_tracks_drawdown() {
        let engine = GovernanceEngine::new();
        engine.record_decision(record(Side::Yes, 1.0, 40.0)).await; // +0.2
        engine.record_decision(record(Side::Hold, 1.0, 90.0)).await; // skipped
        engine.record_decision(record(Side::No, 1.0, -60.0)).await; // -0.3
        engine.record_decision(record(Side::Yes, 0.5, 20.0)).await; // +0.05

        let perf = engine.build_performance_snapshot(0.0, 0.0).await;
        assert_eq!(perf.trade_count, 3);
        assert_eq!(perf.wins, 2);
        assert_eq!(perf.losses, 1);
        assert!((perf.total_pnl - (-0.05)).abs() < 1e-9);
        assert!((perf.max_drawdown - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_replay_clamps_extreme_ev() {
        let engine = GovernanceEngine::new();
        // 400% EV clamps at the +0.5 per-trade ceiling.
        engine.record_decision(record(Side::Yes, 1.0, 400.0)).await;
        let perf = engine.build_performance_snapshot(0.0, 0.0).await;
        assert!((perf.total_pnl - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_self_review_publishes_scale_to_gateway() {
        let limits = RiskLimits::default();
        let tracker = Arc::new(parking_lot::RwLock::new(BankrollTracker::new(&limits)));
        let gateway = RiskGateway::new(limits, StressConfig::default(), tracker);

        let engine = GovernanceEngine::new();
        // Heavy weekly loss forces the halving rule.
        let report = engine.run_self_review(&gateway, 0.0, 0.9).await;

        assert_eq!(report.adjustment.risk_mode, RiskMode::CapitalPreservation);
        assert!((gateway.governance_scale() - report.adjustment.kelly_scale_factor).abs() < 1e-12);
        assert!(gateway.governance_scale() < 1.0);
    }
}
