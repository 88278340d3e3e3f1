//! External calibration anchors
//!
//! The anchor provider is the calibration-data collaborator boundary. The
//! static provider ships deterministic anchor sets so the engine runs offline
//! and in CI; live adapters implement the same trait without changing any
//! downstream analysis code.

use crate::types::ExternalAnchor;
use std::collections::HashMap;

/// Source of external probability anchors for a ticker
pub trait AnchorProvider: Send + Sync {
    /// Anchors for a market ticker. Unknown tickers return a conservative
    /// neutral fallback, never an empty list.
    fn anchors_for(&self, ticker: &str) -> Vec<ExternalAnchor>;

    /// Source names, for explanation strings and audit payloads
    fn source_names(&self, ticker: &str) -> Vec<String> {
        self.anchors_for(ticker)
            .into_iter()
            .map(|a| a.source)
            .collect()
    }
}

/// Fixed anchor sets keyed by ticker, with a neutral fallback
pub struct StaticAnchorProvider {
    anchors: HashMap<String, Vec<ExternalAnchor>>,
}

impl StaticAnchorProvider {
    pub fn new() -> Self {
        Self {
            anchors: HashMap::new(),
        }
    }

    /// Provider seeded with the built-in reference anchor sets
    pub fn with_reference_anchors() -> Self {
        let mut provider = Self::new();
        provider.insert(
            "FED-RATE-25MAR",
            vec![
                ExternalAnchor::new(
                    "cme_fedwatch",
                    0.70,
                    0.86,
                    "CME watch implies hold probability near 70%",
                ),
                ExternalAnchor::new(
                    "fred_rates_regime",
                    0.67,
                    0.72,
                    "FRED regime score favors policy hold",
                ),
                ExternalAnchor::new(
                    "internal_macro_model",
                    0.73,
                    0.75,
                    "Macro nowcast supports hold scenario",
                ),
            ],
        );
        provider.insert(
            "WEATHER-NYC-SNOW",
            vec![
                ExternalAnchor::new(
                    "noaa_blend",
                    0.40,
                    0.78,
                    "NOAA blend puts major snowfall odds around 40%",
                ),
                ExternalAnchor::new(
                    "ecmwf_consensus",
                    0.36,
                    0.74,
                    "ECMWF trend is below contract implication",
                ),
                ExternalAnchor::new(
                    "internal_weather_model",
                    0.42,
                    0.70,
                    "Internal weather model slight bullish snow tilt",
                ),
            ],
        );
        provider
    }

    pub fn insert(&mut self, ticker: impl Into<String>, anchors: Vec<ExternalAnchor>) {
        self.anchors.insert(ticker.into(), anchors);
    }
}

impl Default for StaticAnchorProvider {
    fn default() -> Self {
        Self::with_reference_anchors()
    }
}

impl AnchorProvider for StaticAnchorProvider {
    fn anchors_for(&self, ticker: &str) -> Vec<ExternalAnchor> {
        match self.anchors.get(ticker) {
            Some(anchors) if !anchors.is_empty() => anchors.clone(),
            _ => vec![ExternalAnchor::neutral_fallback()],
        }
    }
}
