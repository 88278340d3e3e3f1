//! Bankroll state for micro-bankroll risk controls
//!
//! The tracker is read-only for the risk gateway; only resolved trade P&L
//! mutates it.

use crate::config::RiskLimits;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tracks bankroll, buying power, and drawdown-relevant metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollTracker {
    pub starting_bankroll: Decimal,
    pub realized_pnl: Decimal,
    pub open_exposure: Decimal,
    pub daily_loss: Decimal,
    pub weekly_loss: Decimal,
    /// High-water mark of the bankroll, for drawdown percentage
    pub peak_bankroll: Decimal,
    max_total_exposure: Decimal,
    kelly_base_multiplier: f64,
    kelly_growth_multiplier: f64,
    growth_unlock_ratio: f64,
}

impl BankrollTracker {
    pub fn new(limits: &RiskLimits) -> Self {
        Self {
            starting_bankroll: limits.bankroll_start,
            realized_pnl: Decimal::ZERO,
            open_exposure: Decimal::ZERO,
            daily_loss: Decimal::ZERO,
            weekly_loss: Decimal::ZERO,
            peak_bankroll: limits.bankroll_start,
            max_total_exposure: limits.max_total_exposure,
            kelly_base_multiplier: limits.kelly_base_multiplier,
            kelly_growth_multiplier: limits.kelly_growth_multiplier,
            growth_unlock_ratio: limits.growth_unlock_ratio,
        }
    }

    pub fn current_bankroll(&self) -> Decimal {
        self.starting_bankroll + self.realized_pnl
    }

    pub fn buying_power(&self) -> Decimal {
        (self.current_bankroll() - self.open_exposure).max(Decimal::ZERO)
    }

    pub fn growth_ratio(&self) -> f64 {
        if self.starting_bankroll <= Decimal::ZERO {
            return 1.0;
        }
        (self.current_bankroll() / self.starting_bankroll)
            .to_f64()
            .unwrap_or(1.0)
    }

    /// Two-tier fractional Kelly multiplier: the base tier until bankroll
    /// growth crosses the unlock ratio, the growth tier at/after it.
    pub fn kelly_multiplier(&self) -> f64 {
        if self.growth_ratio() >= self.growth_unlock_ratio {
            self.kelly_growth_multiplier
        } else {
            self.kelly_base_multiplier
        }
    }

    /// Remaining room under the aggregate exposure cap
    pub fn exposure_capacity(&self) -> Decimal {
        (self.max_total_exposure - self.open_exposure).max(Decimal::ZERO)
    }

    /// Peak-to-current drawdown as a fraction of the peak
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_bankroll <= Decimal::ZERO {
            return 0.0;
        }
        ((self.peak_bankroll - self.current_bankroll()) / self.peak_bankroll)
            .to_f64()
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// Apply realized P&L from a resolved trade. Losses roll into the daily
    /// and weekly accumulators; gains advance the peak.
    pub fn apply_pnl(&mut self, pnl: Decimal) {
        self.realized_pnl += pnl;
        if pnl < Decimal::ZERO {
            self.daily_loss += -pnl;
            self.weekly_loss += -pnl;
        }
        let current = self.current_bankroll();
        if current > self.peak_bankroll {
            self.peak_bankroll = current;
        }
    }

    /// Reserve exposure for an accepted position
    pub fn reserve_exposure(&mut self, amount: Decimal) {
        self.open_exposure += amount.max(Decimal::ZERO);
    }

    /// Release exposure when a position resolves
    pub fn release_exposure(&mut self, amount: Decimal) {
        self.open_exposure = (self.open_exposure - amount.max(Decimal::ZERO)).max(Decimal::ZERO);
    }

    /// Roll the daily loss accumulator at start of day
    pub fn reset_daily(&mut self) {
        self.daily_loss = Decimal::ZERO;
    }

    /// Roll the weekly loss accumulator at start of week
    pub fn reset_weekly(&mut self) {
        self.weekly_loss = Decimal::ZERO;
    }
}
