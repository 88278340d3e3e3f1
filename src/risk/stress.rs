//! Monte Carlo bankroll stress testing
//!
//! Simulates many independent multi-step bankroll paths for a proposed trade
//! profile. Each step stakes a fixed fraction of the current bankroll, wins
//! with the trade's win probability (payout = stake x payout_multiple), and a
//! path stops early once it falls to/below the survival floor. The gate
//! passes only while the ruined-path fraction stays strictly under the
//! configured ceiling.
//!
//! Simulation is embarrassingly parallel across paths and keeps no shared
//! state; `run_seeded` is deterministic for tests while `run` reseeds from OS
//! entropy per call.

use crate::config::StressConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Trade profile under stress
#[derive(Debug, Clone, Copy)]
pub struct StressScenario {
    pub bankroll: f64,
    /// Dollar risk per step; converted to a fraction of bankroll internally
    pub risk_amount: f64,
    pub win_probability: f64,
    /// Net payout per dollar staked on a win, e.g. (1 - price) / price
    pub payout_multiple: f64,
}

/// Stress outcome across all simulated paths
#[derive(Debug, Clone, Serialize)]
pub struct StressTestReport {
    pub simulations: usize,
    pub steps: usize,
    /// Fraction of paths that breached the survival floor
    pub ruin_probability: f64,
    pub p5_terminal: f64,
    pub p50_terminal: f64,
    pub p95_terminal: f64,
    pub pass_threshold: bool,
}

/// Runs the preservation-gate stress checks for proposed risk
pub struct MonteCarloStressTester {
    config: StressConfig,
    /// Bankroll level at/below which a path counts as ruined
    ruin_floor: f64,
}

impl MonteCarloStressTester {
    pub fn new(config: StressConfig, ruin_floor: f64) -> Self {
        Self { config, ruin_floor }
    }

    /// Entropy-seeded run for production assessments
    pub fn run(&self, scenario: &StressScenario) -> StressTestReport {
        self.simulate(scenario, StdRng::from_os_rng())
    }

    /// Deterministic run for reproducible tests
    pub fn run_seeded(&self, scenario: &StressScenario, seed: u64) -> StressTestReport {
        self.simulate(scenario, StdRng::seed_from_u64(seed))
    }

    fn simulate(&self, scenario: &StressScenario, mut rng: StdRng) -> StressTestReport {
        let simulations = self.config.simulations.max(1);
        let steps = self.config.steps;

        let risk_fraction = if scenario.bankroll <= 0.0 {
            0.0
        } else {
            (scenario.risk_amount / scenario.bankroll).clamp(0.0, 1.0)
        };

        let mut terminals = Vec::with_capacity(simulations);
        let mut ruined = 0usize;

        for _ in 0..simulations {
            let mut bankroll = scenario.bankroll;
            for _ in 0..steps {
                let stake = bankroll * risk_fraction;
                if rng.random::<f64>() < scenario.win_probability {
                    bankroll += stake * scenario.payout_multiple;
                } else {
                    bankroll -= stake;
                }
                if bankroll <= self.ruin_floor {
                    ruined += 1;
                    break;
                }
            }
            terminals.push(bankroll);
        }

        terminals.sort_by(|a, b| a.total_cmp(b));
        let ruin_probability = ruined as f64 / simulations as f64;

        StressTestReport {
            simulations,
            steps,
            ruin_probability,
            p5_terminal: percentile(&terminals, 0.05),
            p50_terminal: percentile(&terminals, 0.50),
            p95_terminal: percentile(&terminals, 0.95),
            pass_threshold: ruin_probability < self.config.max_ruin_probability,
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
