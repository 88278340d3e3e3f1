//! Fractional Kelly position sizing for binary contracts
//!
//! Kelly for a binary bet at unit odds reduces to f* = p - q. The sizer uses
//! that conservative approximation, scales it by the effective multiplier
//! (bankroll tier x governance scale), and clamps the dollar result under the
//! per-trade and aggregate-exposure caps. The result can never exceed
//! min(max_trade_risk, exposure_cap_remaining) and never goes negative.

use crate::types::Side;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

/// Sizing output with the full rationale trail
#[derive(Debug, Clone, Serialize)]
pub struct PositionSizeDecision {
    pub side: Side,
    /// Dollar risk budget for this trade
    pub recommended_risk: Decimal,
    pub kelly_fraction_raw: f64,
    pub kelly_fraction_applied: f64,
    pub max_risk_cap: Decimal,
    pub exposure_cap_remaining: Decimal,
    pub rationale: Vec<String>,
}

/// Computes conservative position risk in dollars for a single trade
pub struct FractionalKellySizer {
    max_trade_risk: Decimal,
}

impl FractionalKellySizer {
    pub fn new(max_trade_risk: Decimal) -> Self {
        Self { max_trade_risk }
    }

    pub fn size_risk(
        &self,
        side: Side,
        prob_yes: f64,
        bankroll: Decimal,
        kelly_multiplier: f64,
        exposure_cap_remaining: Decimal,
    ) -> PositionSizeDecision {
        if !side.is_directional() {
            return PositionSizeDecision {
                side,
                recommended_risk: Decimal::ZERO,
                kelly_fraction_raw: 0.0,
                kelly_fraction_applied: 0.0,
                max_risk_cap: self.max_trade_risk,
                exposure_cap_remaining,
                rationale: vec!["hold_side".to_string()],
            };
        }

        let p_win = match side {
            Side::Yes => prob_yes,
            _ => 1.0 - prob_yes,
        }
        .clamp(0.0, 1.0);

        let q = 1.0 - p_win;
        let kelly_raw = (p_win - q).max(0.0);
        let kelly_applied = kelly_raw * kelly_multiplier;

        let uncapped_risk = bankroll * Decimal::from_f64(kelly_applied).unwrap_or(Decimal::ZERO);
        let cap = self.max_trade_risk.min(exposure_cap_remaining);
        let recommended = uncapped_risk.min(cap).max(Decimal::ZERO);

        let rationale = vec![
            format!("kelly_multiplier={:.2}x", kelly_multiplier),
            format!("p_win={:.4}", p_win),
            format!("kelly_raw={:.4}", kelly_raw),
            format!("uncapped_risk=${:.4}", uncapped_risk),
            format!("hard_cap=${:.2}", cap),
        ];

        PositionSizeDecision {
            side,
            recommended_risk: recommended,
            kelly_fraction_raw: kelly_raw,
            kelly_fraction_applied: kelly_applied,
            max_risk_cap: self.max_trade_risk,
            exposure_cap_remaining,
            rationale,
        }
    }
}
