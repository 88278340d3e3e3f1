//! Probability ensemble engine
//!
//! Estimates a calibrated YES probability for a binary market by blending
//! four components:
//! - Market-implied probability from the YES mid price
//! - Confidence-weighted external anchor consensus
//! - A Bayesian blend treating the market as a Beta prior and external
//!   consensus as pseudo-observations
//! - An internal microstructure signal (liquidity bonus, depth bias,
//!   spread penalty)
//!
//! The blend weights and calibration come from the offline retraining
//! collaborator's artifact and are swapped atomically: readers clone an
//! `Arc` snapshot, so a half-updated weight set is never observable.

mod anchors;

pub use anchors::{AnchorProvider, StaticAnchorProvider};

use crate::types::{ExternalAnchor, PriceSnapshot};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Convex blend weights over the four probability components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub market_implied: f64,
    pub external: f64,
    pub bayesian: f64,
    pub internal: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            market_implied: 0.35,
            external: 0.30,
            bayesian: 0.25,
            internal: 0.10,
        }
    }
}

impl EnsembleWeights {
    /// Clamp negatives to zero and renormalize to sum to 1. An all-zero or
    /// otherwise invalid set falls back to the defaults.
    pub fn normalized(self) -> Self {
        let m = self.market_implied.max(0.0);
        let e = self.external.max(0.0);
        let b = self.bayesian.max(0.0);
        let i = self.internal.max(0.0);
        let total = m + e + b + i;
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }
        Self {
            market_implied: m / total,
            external: e / total,
            bayesian: b / total,
            internal: i / total,
        }
    }
}

/// Retraining artifact consumed from the offline retraining collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsArtifact {
    #[serde(default)]
    pub weights: EnsembleWeights,
    #[serde(default)]
    pub calibration_bias: f64,
    #[serde(default = "default_temperature")]
    pub calibration_temperature: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_temperature() -> f64 {
    1.0
}

impl Default for WeightsArtifact {
    fn default() -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("status".to_string(), "baseline".to_string());
        Self {
            weights: EnsembleWeights::default(),
            calibration_bias: 0.0,
            calibration_temperature: 1.0,
            metadata,
        }
    }
}

/// Validated, immutable weight/calibration snapshot used by estimates
#[derive(Debug, Clone)]
pub struct CalibratedWeights {
    pub weights: EnsembleWeights,
    /// Temperature around 0.5, floored at 0.8
    pub temperature: f64,
    pub bias: f64,
    pub metadata: HashMap<String, String>,
}

impl From<WeightsArtifact> for CalibratedWeights {
    fn from(artifact: WeightsArtifact) -> Self {
        Self {
            weights: artifact.weights.normalized(),
            temperature: artifact.calibration_temperature.max(0.8),
            bias: artifact.calibration_bias,
            metadata: artifact.metadata,
        }
    }
}

/// Ensemble probability output with component diagnostics
///
/// Derived, recomputed every cycle; never persisted as mutable state.
#[derive(Debug, Clone, Serialize)]
pub struct ProbabilityEstimate {
    pub ticker: String,
    pub market_implied_yes: f64,
    pub external_yes: f64,
    pub bayesian_yes: f64,
    pub internal_yes: f64,
    pub ensemble_yes: f64,
    /// 1 minus the spread across the four raw components, 0-1
    pub model_agreement: f64,
}

fn clamp_prob(p: f64) -> f64 {
    p.clamp(0.01, 0.99)
}

/// Computes conservative YES probabilities from several low-latency components
pub struct ProbabilityEngine {
    state: RwLock<Arc<CalibratedWeights>>,
}

impl ProbabilityEngine {
    /// Engine with baseline weights and identity calibration
    pub fn new() -> Self {
        Self::with_artifact(WeightsArtifact::default())
    }

    pub fn with_artifact(artifact: WeightsArtifact) -> Self {
        Self {
            state: RwLock::new(Arc::new(artifact.into())),
        }
    }

    /// Atomically swap in a retrained weight/calibration set
    pub fn reload(&self, artifact: WeightsArtifact) {
        let snapshot: CalibratedWeights = artifact.into();
        tracing::info!(
            temperature = snapshot.temperature,
            bias = snapshot.bias,
            "Reloading probability weights"
        );
        *self.state.write() = Arc::new(snapshot);
    }

    /// Current weight/calibration snapshot, for status surfaces
    pub fn current_calibration(&self) -> Arc<CalibratedWeights> {
        self.state.read().clone()
    }

    /// Estimate the YES probability for one snapshot
    ///
    /// Pure function of the inputs plus the currently loaded weights.
    pub fn estimate(
        &self,
        snapshot: &PriceSnapshot,
        anchors: &[ExternalAnchor],
    ) -> ProbabilityEstimate {
        let calibration = self.current_calibration();

        let market_implied = Self::market_implied(snapshot);
        let external_yes = Self::external_consensus(anchors);
        let bayesian_yes = Self::bayesian_blend(market_implied, external_yes, anchors);
        let internal_yes = Self::internal_signal(snapshot, market_implied);

        let w = &calibration.weights;
        let ensemble_raw = w.market_implied * market_implied
            + w.external * external_yes
            + w.bayesian * bayesian_yes
            + w.internal * internal_yes;
        let ensemble_yes = Self::apply_calibration(&calibration, ensemble_raw);

        let components = [market_implied, external_yes, bayesian_yes, internal_yes];
        let max = components.iter().cloned().fold(f64::MIN, f64::max);
        let min = components.iter().cloned().fold(f64::MAX, f64::min);
        let model_agreement = (1.0 - (max - min)).clamp(0.0, 1.0);

        ProbabilityEstimate {
            ticker: snapshot.ticker.clone(),
            market_implied_yes: market_implied,
            external_yes,
            bayesian_yes,
            internal_yes,
            ensemble_yes,
            model_agreement,
        }
    }

    /// Confidence score for minimum-gate checks
    pub fn aggregate_confidence(estimate: &ProbabilityEstimate, anchors: &[ExternalAnchor]) -> f64 {
        let anchor_conf = if anchors.is_empty() {
            0.4
        } else {
            anchors.iter().map(|a| a.confidence).sum::<f64>() / anchors.len() as f64
        };
        (0.45 * estimate.model_agreement + 0.35 * anchor_conf + 0.20).clamp(0.0, 0.99)
    }

    fn market_implied(snapshot: &PriceSnapshot) -> f64 {
        clamp_prob(snapshot.yes_mid() / 100.0)
    }

    fn external_consensus(anchors: &[ExternalAnchor]) -> f64 {
        let total_conf: f64 = anchors.iter().map(|a| a.confidence).sum();
        if total_conf <= 0.0 {
            return 0.50;
        }
        let weighted: f64 = anchors
            .iter()
            .map(|a| a.probability_yes * a.confidence)
            .sum();
        clamp_prob(weighted / total_conf)
    }

    fn bayesian_blend(market_implied: f64, external_yes: f64, anchors: &[ExternalAnchor]) -> f64 {
        // Market mid as a Beta prior; external consensus confidence acts as
        // pseudo-observation strength.
        let prior_alpha = 1.0 + market_implied * 8.0;
        let prior_beta = 1.0 + (1.0 - market_implied) * 8.0;
        let total_conf: f64 = anchors.iter().map(|a| a.confidence).sum();
        let ext_strength = total_conf.max(0.1) * 4.0;
        let post_alpha = prior_alpha + external_yes * ext_strength;
        let post_beta = prior_beta + (1.0 - external_yes) * ext_strength;
        clamp_prob(post_alpha / (post_alpha + post_beta))
    }

    fn internal_signal(snapshot: &PriceSnapshot, market_implied: f64) -> f64 {
        // Mild adjustments only; capital preservation favors low sensitivity.
        let spread_penalty = (snapshot.yes_spread() / 100.0).max(0.0);
        let depth_bias = ((snapshot.yes_bid - snapshot.no_bid) / 100.0) * 0.15;
        let liquidity_bonus = (snapshot.volume as f64 / 200_000.0).min(1.0) * 0.03;
        clamp_prob(market_implied + depth_bias + liquidity_bonus - spread_penalty)
    }

    fn apply_calibration(calibration: &CalibratedWeights, probability: f64) -> f64 {
        let centered = (probability - 0.5) / calibration.temperature + 0.5;
        clamp_prob(centered + calibration.bias)
    }
}

impl Default for ProbabilityEngine {
    fn default() -> Self {
        Self::new()
    }
}
