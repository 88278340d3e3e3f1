//! Risk gateway
//!
//! The aggregate risk authority. Three sub-evaluations run independently and
//! are combined into one verdict:
//! - Fractional Kelly sizing against hard dollar/exposure caps
//! - Fail-safe checks (buying power, drawdown windows, liquidity)
//! - Monte Carlo stress testing of the proposed risk profile
//!
//! The gateway only reads the shared bankroll tracker; P&L application is a
//! separate operation performed after trade resolution. Every failing
//! condition contributes a named blocker so callers always see the full
//! "not approved, here is why" list.

pub mod bankroll;
pub mod failsafe;
pub mod sizing;
pub mod stress;

pub use bankroll::BankrollTracker;
pub use failsafe::{FailSafeChecks, FailSafeEvaluator, FailSafeReport};
pub use sizing::{FractionalKellySizer, PositionSizeDecision};
pub use stress::{MonteCarloStressTester, StressScenario, StressTestReport};

use crate::config::{RiskLimits, StressConfig};
use crate::types::{PriceSnapshot, Side};
use parking_lot::RwLock;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Market state for an assessment: a live snapshot or a synthetic
/// paper-trade view. One typed entry point replaces the legacy pattern of
/// sniffing argument shapes at runtime.
#[derive(Debug, Clone)]
pub enum MarketView {
    Snapshot(PriceSnapshot),
    Synthetic(SyntheticState),
}

/// Minimal market state for paper-trade and backtest entry modes
#[derive(Debug, Clone)]
pub struct SyntheticState {
    pub ticker: String,
    pub entry_price_cents: f64,
    pub volume: u64,
    pub spread_cents: f64,
}

impl MarketView {
    pub fn ticker(&self) -> &str {
        match self {
            MarketView::Snapshot(s) => &s.ticker,
            MarketView::Synthetic(s) => &s.ticker,
        }
    }

    /// Entry ask price in cents for the given side
    pub fn ask_for(&self, side: Side) -> f64 {
        match self {
            MarketView::Snapshot(s) => s.ask_for(side),
            MarketView::Synthetic(s) => s.entry_price_cents,
        }
    }

    pub fn volume(&self) -> u64 {
        match self {
            MarketView::Snapshot(s) => s.volume,
            MarketView::Synthetic(s) => s.volume,
        }
    }

    pub fn max_spread(&self) -> f64 {
        match self {
            MarketView::Snapshot(s) => s.max_spread(),
            MarketView::Synthetic(s) => s.spread_cents,
        }
    }
}

/// One unambiguous assessment request
#[derive(Debug, Clone)]
pub struct RiskRequest {
    pub market: MarketView,
    pub side: Side,
    pub probability_yes: f64,
}

/// Aggregated verdict with full rationale
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub ticker: String,
    pub side: Side,
    pub approved: bool,
    pub sizing: PositionSizeDecision,
    pub fail_safe: FailSafeReport,
    pub stress: StressTestReport,
    /// Whole contracts affordable within the recommended risk
    pub contracts: u32,
    pub blockers: Vec<String>,
}

/// Evaluates whether a trade may proceed to the human-approval stage
pub struct RiskGateway {
    limits: RiskLimits,
    tracker: Arc<RwLock<BankrollTracker>>,
    sizer: FractionalKellySizer,
    fail_safes: FailSafeEvaluator,
    stress: MonteCarloStressTester,
    /// Governance Kelly scale factor; written only by self-review runs
    governance_scale: RwLock<f64>,
}

impl RiskGateway {
    pub fn new(
        limits: RiskLimits,
        stress_config: StressConfig,
        tracker: Arc<RwLock<BankrollTracker>>,
    ) -> Self {
        let ruin_floor = limits.min_buying_power.to_f64().unwrap_or(0.0);
        Self {
            sizer: FractionalKellySizer::new(limits.max_trade_risk),
            fail_safes: FailSafeEvaluator::new(limits.clone()),
            stress: MonteCarloStressTester::new(stress_config, ruin_floor),
            limits,
            tracker,
            governance_scale: RwLock::new(1.0),
        }
    }

    /// The governance feedback channel: last writer wins, never torn
    pub fn set_governance_scale(&self, scale: f64) {
        *self.governance_scale.write() = scale;
    }

    pub fn governance_scale(&self) -> f64 {
        *self.governance_scale.read()
    }

    pub fn tracker(&self) -> Arc<RwLock<BankrollTracker>> {
        self.tracker.clone()
    }

    /// Run the full assessment for one request
    pub fn assess(&self, request: &RiskRequest) -> RiskAssessment {
        self.assess_inner(request, None)
    }

    /// Deterministic-stress variant for reproducible tests
    pub fn assess_seeded(&self, request: &RiskRequest, seed: u64) -> RiskAssessment {
        self.assess_inner(request, Some(seed))
    }

    fn assess_inner(&self, request: &RiskRequest, seed: Option<u64>) -> RiskAssessment {
        let tracker = self.tracker.read().clone();
        let effective_multiplier = tracker.kelly_multiplier() * self.governance_scale();

        let sizing = self.sizer.size_risk(
            request.side,
            request.probability_yes,
            tracker.current_bankroll(),
            effective_multiplier,
            tracker.exposure_capacity(),
        );

        let fail_safe = self.fail_safes.evaluate(
            request.market.volume(),
            request.market.max_spread(),
            tracker.buying_power(),
            tracker.daily_loss,
            tracker.weekly_loss,
        );

        let ask_cents = request.market.ask_for(request.side);
        let price = (ask_cents / 100.0).max(0.01);
        let win_probability = match request.side {
            Side::No => 1.0 - request.probability_yes,
            Side::Yes | Side::Hold => request.probability_yes,
        };
        let scenario = StressScenario {
            bankroll: tracker.current_bankroll().to_f64().unwrap_or(0.0),
            risk_amount: sizing.recommended_risk.to_f64().unwrap_or(0.0),
            win_probability,
            payout_multiple: (1.0 - price) / price,
        };
        let stress = match seed {
            Some(seed) => self.stress.run_seeded(&scenario, seed),
            None => self.stress.run(&scenario),
        };

        let mut blockers = Vec::new();
        if !request.side.is_directional() {
            blockers.push("no_trade_signal".to_string());
        }
        if sizing.recommended_risk <= Decimal::ZERO {
            blockers.push("zero_position_size".to_string());
        }
        blockers.extend(fail_safe.reasons.iter().cloned());
        if !stress.pass_threshold {
            blockers.push("stress_test_ruin_probability".to_string());
        }

        let contracts = contracts_for(sizing.recommended_risk, ask_cents);
        let approved = blockers.is_empty();

        if !approved {
            tracing::debug!(
                ticker = request.market.ticker(),
                side = %request.side,
                blockers = ?blockers,
                "Risk gateway rejected trade"
            );
        }

        RiskAssessment {
            ticker: request.market.ticker().to_string(),
            side: request.side,
            approved,
            sizing,
            fail_safe,
            stress,
            contracts,
            blockers,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }
}

/// Whole contracts affordable for a dollar risk budget at an ask in cents
fn contracts_for(risk: Decimal, ask_cents: f64) -> u32 {
    let dollars_per_contract = (ask_cents / 100.0).max(0.01);
    let risk = risk.to_f64().unwrap_or(0.0);
    (risk / dollars_per_contract).floor().max(0.0) as u32
}
