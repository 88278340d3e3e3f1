//! Configuration
//!
//! All sections deserialize with defaults so an empty config file (or no file
//! at all) yields the conservative baseline the engine ships with. Dollar
//! limits are `Decimal`; probabilities and multipliers are `f64`.

use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub risk: RiskLimits,
    pub thresholds: EdgeThresholds,
    pub stress: StressConfig,
    pub approval: ApprovalConfig,
}

impl Config {
    /// Load configuration from a TOML file, layered with
    /// `KALSHI_GUARD__`-prefixed environment overrides. A missing file is not
    /// an error; defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("KALSHI_GUARD").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Hard bankroll and liquidity limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Starting bankroll in dollars
    pub bankroll_start: Decimal,
    /// Per-trade risk cap in dollars
    pub max_trade_risk: Decimal,
    /// Aggregate open-exposure cap in dollars
    pub max_total_exposure: Decimal,
    /// Buying power floor; trading freezes below this
    pub min_buying_power: Decimal,
    /// Daily realized-loss limit in dollars
    pub daily_loss_limit: Decimal,
    /// Weekly realized-loss limit in dollars
    pub weekly_loss_limit: Decimal,
    /// Fractional Kelly multiplier before the growth unlock
    pub kelly_base_multiplier: f64,
    /// Fractional Kelly multiplier at/after the growth unlock
    pub kelly_growth_multiplier: f64,
    /// Bankroll growth ratio that unlocks the higher multiplier
    pub growth_unlock_ratio: f64,
    /// Minimum snapshot volume for the liquidity fail-safe
    pub min_liquidity_volume: u64,
    /// Maximum bid/ask spread in cents for the liquidity fail-safe
    pub max_liquidity_spread: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            bankroll_start: dec!(50.00),
            max_trade_risk: dec!(0.50),
            max_total_exposure: dec!(2.00),
            min_buying_power: dec!(40.00),
            daily_loss_limit: dec!(0.25),
            weekly_loss_limit: dec!(1.00),
            kelly_base_multiplier: 0.10,
            kelly_growth_multiplier: 0.25,
            growth_unlock_ratio: 1.20,
            min_liquidity_volume: 1_000,
            max_liquidity_spread: 8.0,
        }
    }
}

/// Edge-detector gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeThresholds {
    /// Minimum EV as a fraction of stake (0.40 = 40 EV points)
    pub min_ev_threshold: f64,
    /// Minimum aggregate confidence
    pub min_confidence: f64,
    /// Minimum confirmation-tag count
    pub min_confirmations: usize,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self {
            min_ev_threshold: 0.40,
            min_confidence: 0.97,
            min_confirmations: 4,
        }
    }
}

/// Monte Carlo stress-test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub simulations: usize,
    pub steps: usize,
    /// Ruin-probability ceiling; the stress gate passes strictly below this
    pub max_ruin_probability: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            simulations: 1_000,
            steps: 25,
            max_ruin_probability: 0.05,
        }
    }
}

/// Human-approval protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// The single whitelisted approver identity
    pub approver: String,
    /// Maximum seconds to wait for an approval message
    pub timeout_secs: u64,
    /// Inbox poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            approver: "+15555550100".to_string(),
            timeout_secs: 300,
            poll_interval_ms: 1_000,
        }
    }
}
