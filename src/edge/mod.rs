//! Edge detection and EV gating
//!
//! Computes expected value per side from the ensemble probability and the ask
//! prices, collects confirmation tags, and forces HOLD unless every threshold
//! gate passes. HOLD never carries an EV claim for sizing downstream.

use crate::config::EdgeThresholds;
use crate::probability::ProbabilityEstimate;
use crate::types::{PriceSnapshot, Side};
use serde::Serialize;

/// Independent boolean confirmation signals, used only for counting/display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    ExternalCalibrationGap,
    BayesianRepricing,
    EnsembleAgreement,
    LiquidityCheck,
    TightSpread,
    PositiveRawEv,
}

impl std::fmt::Display for Confirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Confirmation::ExternalCalibrationGap => "external_calibration_gap",
            Confirmation::BayesianRepricing => "bayesian_repricing",
            Confirmation::EnsembleAgreement => "ensemble_agreement",
            Confirmation::LiquidityCheck => "liquidity_check",
            Confirmation::TightSpread => "tight_spread",
            Confirmation::PositiveRawEv => "positive_raw_ev",
        };
        write!(f, "{}", name)
    }
}

/// Named threshold gates; all three must pass for a directional side
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThresholdChecks {
    pub min_ev: bool,
    pub min_confirmations: bool,
    pub min_confidence: bool,
}

impl ThresholdChecks {
    pub fn all_passed(&self) -> bool {
        self.min_ev && self.min_confirmations && self.min_confidence
    }
}

/// Directional decision with full gating diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct EdgeDecision {
    pub ticker: String,
    pub side: Side,
    /// Signed EV as a percentage of stake for the chosen side
    pub ev_percent: f64,
    pub confirmations: Vec<Confirmation>,
    pub threshold_checks: ThresholdChecks,
}

impl EdgeDecision {
    pub fn confirmation_count(&self) -> usize {
        self.confirmations.len()
    }
}

/// Detect and validate edges with strict confirmation and EV gates
pub struct EdgeDetector {
    thresholds: EdgeThresholds,
}

impl EdgeDetector {
    pub fn new(thresholds: EdgeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(
        &self,
        snapshot: &PriceSnapshot,
        estimate: &ProbabilityEstimate,
        confidence: f64,
    ) -> EdgeDecision {
        let yes_ev = Self::ev_percent(snapshot.yes_ask, estimate.ensemble_yes);
        let no_ev = Self::ev_percent(snapshot.no_ask, 1.0 - estimate.ensemble_yes);

        let mut side = if yes_ev >= no_ev { Side::Yes } else { Side::No };
        let ev_percent = yes_ev.max(no_ev);
        let confirmations = Self::build_confirmations(snapshot, estimate, ev_percent);

        let threshold_checks = ThresholdChecks {
            min_ev: ev_percent >= self.thresholds.min_ev_threshold * 100.0,
            min_confirmations: confirmations.len() >= self.thresholds.min_confirmations,
            min_confidence: confidence >= self.thresholds.min_confidence,
        };

        if !threshold_checks.all_passed() {
            side = Side::Hold;
        }

        EdgeDecision {
            ticker: snapshot.ticker.clone(),
            side,
            ev_percent,
            confirmations,
            threshold_checks,
        }
    }

    /// EV as a percentage of stake for buying one side at `ask` cents with
    /// win probability `p_win`. A non-positive ask is maximally unattractive
    /// rather than a division-by-zero.
    fn ev_percent(ask: f64, p_win: f64) -> f64 {
        if ask <= 0.0 {
            return -100.0;
        }
        let expected_cents = p_win * (100.0 - ask) - (1.0 - p_win) * ask;
        (expected_cents / ask) * 100.0
    }

    fn build_confirmations(
        snapshot: &PriceSnapshot,
        estimate: &ProbabilityEstimate,
        best_ev: f64,
    ) -> Vec<Confirmation> {
        let mut confirmations = Vec::new();
        if (estimate.external_yes - estimate.market_implied_yes).abs() >= 0.03 {
            confirmations.push(Confirmation::ExternalCalibrationGap);
        }
        if (estimate.bayesian_yes - estimate.market_implied_yes).abs() >= 0.02 {
            confirmations.push(Confirmation::BayesianRepricing);
        }
        if estimate.model_agreement >= 0.88 {
            confirmations.push(Confirmation::EnsembleAgreement);
        }
        if snapshot.volume >= 5_000 {
            confirmations.push(Confirmation::LiquidityCheck);
        }
        if snapshot.yes_spread() <= 4.0 {
            confirmations.push(Confirmation::TightSpread);
        }
        if best_ev >= 5.0 {
            confirmations.push(Confirmation::PositiveRawEv);
        }
        confirmations
    }
}
