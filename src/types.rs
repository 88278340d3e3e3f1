//! Core data types shared across the decision pipeline
//!
//! Everything here is a plain structured record, safe to serialize to any
//! wire format an API layer wants to expose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade side for a binary-outcome contract
///
/// `Hold` is the only safe default: it carries no EV claim and the risk
/// gateway sizes it to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "HOLD")]
    Hold,
}

impl Side {
    /// True for YES/NO, false for HOLD
    pub fn is_directional(&self) -> bool {
        !matches!(self, Side::Hold)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
            Side::Hold => write!(f, "HOLD"),
        }
    }
}

/// One market price snapshot, immutable once read
///
/// Prices are quoted in cents (0-100). One snapshot per ticker per analysis
/// cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub yes_bid: f64,
    pub yes_ask: f64,
    pub no_bid: f64,
    pub no_ask: f64,
    pub volume: u64,
    pub open_interest: u64,
}

impl PriceSnapshot {
    /// Midpoint of the YES market in cents
    pub fn yes_mid(&self) -> f64 {
        (self.yes_bid + self.yes_ask) / 2.0
    }

    pub fn yes_spread(&self) -> f64 {
        self.yes_ask - self.yes_bid
    }

    pub fn no_spread(&self) -> f64 {
        self.no_ask - self.no_bid
    }

    /// Worst spread across both sides, used by liquidity fail-safes
    pub fn max_spread(&self) -> f64 {
        self.yes_spread().max(self.no_spread())
    }

    /// Ask price in cents for the given side (YES ask for HOLD, which is
    /// never sized anyway)
    pub fn ask_for(&self, side: Side) -> f64 {
        match side {
            Side::No => self.no_ask,
            Side::Yes | Side::Hold => self.yes_ask,
        }
    }
}

/// Normalized external reference probability for a market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAnchor {
    pub source: String,
    /// Probability of the YES outcome, 0-1
    pub probability_yes: f64,
    /// Source confidence, 0-1
    pub confidence: f64,
    /// Human-readable context for explanations
    pub context: String,
}

impl ExternalAnchor {
    pub fn new(
        source: impl Into<String>,
        probability_yes: f64,
        confidence: f64,
        context: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            probability_yes,
            confidence,
            context: context.into(),
        }
    }

    /// Conservative fallback anchor for tickers with no external coverage
    pub fn neutral_fallback() -> Self {
        Self::new(
            "fallback_baseline",
            0.50,
            0.45,
            "No external coverage; using neutral baseline",
        )
    }
}
