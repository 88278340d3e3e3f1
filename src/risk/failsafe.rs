//! Fail-safe checks that can veto a proposed trade
//!
//! These are hard, non-negotiable limits. Violations are reported as named
//! reasons, never raised as errors; the default answer of this system is
//! "no trade", not a crash.

use crate::config::RiskLimits;
use rust_decimal::Decimal;
use serde::Serialize;

/// The named boolean checks, in evaluation order
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FailSafeChecks {
    pub buying_power_floor: bool,
    pub daily_drawdown: bool,
    pub weekly_drawdown: bool,
    pub liquidity_volume: bool,
    pub liquidity_spread: bool,
}

impl FailSafeChecks {
    fn failing_names(&self) -> Vec<String> {
        let named = [
            ("buying_power_floor", self.buying_power_floor),
            ("daily_drawdown", self.daily_drawdown),
            ("weekly_drawdown", self.weekly_drawdown),
            ("liquidity_volume", self.liquidity_volume),
            ("liquidity_spread", self.liquidity_spread),
        ];
        named
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Check outcome; `reasons` is exactly the failing check names
#[derive(Debug, Clone, Serialize)]
pub struct FailSafeReport {
    pub approved: bool,
    pub checks: FailSafeChecks,
    pub reasons: Vec<String>,
}

/// Evaluate drawdown, liquidity, and buying power constraints
pub struct FailSafeEvaluator {
    limits: RiskLimits,
}

impl FailSafeEvaluator {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn evaluate(
        &self,
        volume: u64,
        max_spread_cents: f64,
        buying_power: Decimal,
        daily_loss: Decimal,
        weekly_loss: Decimal,
    ) -> FailSafeReport {
        let checks = FailSafeChecks {
            buying_power_floor: buying_power >= self.limits.min_buying_power,
            daily_drawdown: daily_loss <= self.limits.daily_loss_limit,
            weekly_drawdown: weekly_loss <= self.limits.weekly_loss_limit,
            liquidity_volume: volume >= self.limits.min_liquidity_volume,
            liquidity_spread: max_spread_cents <= self.limits.max_liquidity_spread,
        };
        let reasons = checks.failing_names();
        FailSafeReport {
            approved: reasons.is_empty(),
            checks,
            reasons,
        }
    }
}
