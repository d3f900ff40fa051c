//! Designer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use bandit_types::{config_error, BanditResult};

use crate::padding::PaddingSchedule;

/// Acquisition and batch-strategy coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UcbPeConfig {
    /// Weight of the completed+active stddev in UCB.
    pub ucb_coefficient: f64,
    /// Optimism of the explore-region boundary used by the PE penalty.
    pub explore_region_ucb_coefficient: f64,
    /// Penalty per unit of explore-region violation.
    pub cb_violation_penalty_coefficient: f64,
    /// Probability that a whole batch uses UCB.
    pub ucb_overwrite_probability: f64,
    /// Probability that a whole batch uses PE (drawn after the UCB draw fails).
    pub pe_overwrite_probability: f64,
    /// Choose exploration slots jointly with the set acquisition.
    pub optimize_set_acquisition_for_exploration: bool,
}

impl Default for UcbPeConfig {
    fn default() -> Self {
        Self {
            ucb_coefficient: 1.8,
            explore_region_ucb_coefficient: 0.5,
            cb_violation_penalty_coefficient: 10.0,
            ucb_overwrite_probability: 0.25,
            pe_overwrite_probability: 0.1,
            optimize_set_acquisition_for_exploration: false,
        }
    }
}

impl UcbPeConfig {
    pub fn with_ucb_coefficient(mut self, value: f64) -> Self {
        self.ucb_coefficient = value;
        self
    }

    pub fn with_explore_region_ucb_coefficient(mut self, value: f64) -> Self {
        self.explore_region_ucb_coefficient = value;
        self
    }

    pub fn with_cb_violation_penalty_coefficient(mut self, value: f64) -> Self {
        self.cb_violation_penalty_coefficient = value;
        self
    }

    pub fn with_ucb_overwrite_probability(mut self, p: f64) -> Self {
        self.ucb_overwrite_probability = p;
        self
    }

    pub fn with_pe_overwrite_probability(mut self, p: f64) -> Self {
        self.pe_overwrite_probability = p;
        self
    }

    pub fn with_set_acquisition(mut self, enabled: bool) -> Self {
        self.optimize_set_acquisition_for_exploration = enabled;
        self
    }

    pub fn validate(&self) -> BanditResult<()> {
        for (name, value) in [
            ("ucb_coefficient", self.ucb_coefficient),
            ("explore_region_ucb_coefficient", self.explore_region_ucb_coefficient),
            ("cb_violation_penalty_coefficient", self.cb_violation_penalty_coefficient),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_error!("{name} must be finite and non-negative, got {value}"));
            }
        }
        for (name, p) in [
            ("ucb_overwrite_probability", self.ucb_overwrite_probability),
            ("pe_overwrite_probability", self.pe_overwrite_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(config_error!("{name} must lie in [0, 1], got {p}"));
            }
        }
        Ok(())
    }
}

/// Top-level designer configuration. Immutable once the designer is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignerConfig {
    pub ucb_pe: UcbPeConfig,
    /// Trials (completed + active) to collect from the seeder before the
    /// acquisition takes over.
    pub num_seed_trials: usize,
    pub ensemble_size: usize,
    /// Namespace decision metadata is written under.
    pub metadata_ns: String,
    pub padding: PaddingSchedule,
    /// Root of the designer's random key.
    pub seed: u64,
    /// Evaluation budget of the default acquisition optimizer, per slot.
    pub acquisition_evaluations: usize,
    /// Random restarts of the default ARD optimizer, per ensemble member.
    pub ard_restarts: usize,
}

impl Default for DesignerConfig {
    fn default() -> Self {
        Self {
            ucb_pe: UcbPeConfig::default(),
            num_seed_trials: 1,
            ensemble_size: 1,
            metadata_ns: "gp_ucb_pe_bandit".to_string(),
            padding: PaddingSchedule::default(),
            seed: 0,
            acquisition_evaluations: 2000,
            ard_restarts: 8,
        }
    }
}

impl DesignerConfig {
    pub fn with_ucb_pe(mut self, config: UcbPeConfig) -> Self {
        self.ucb_pe = config;
        self
    }

    pub fn with_num_seed_trials(mut self, n: usize) -> Self {
        self.num_seed_trials = n;
        self
    }

    pub fn with_ensemble_size(mut self, n: usize) -> Self {
        self.ensemble_size = n;
        self
    }

    pub fn with_metadata_ns(mut self, ns: impl Into<String>) -> Self {
        self.metadata_ns = ns.into();
        self
    }

    pub fn with_padding(mut self, padding: PaddingSchedule) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_acquisition_evaluations(mut self, n: usize) -> Self {
        self.acquisition_evaluations = n;
        self
    }

    pub fn with_ard_restarts(mut self, n: usize) -> Self {
        self.ard_restarts = n;
        self
    }

    pub fn from_json_str(json: &str) -> BanditResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BanditResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> BanditResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> BanditResult<()> {
        self.ucb_pe.validate()?;
        if self.ensemble_size == 0 {
            return Err(config_error!("ensemble_size must be at least 1"));
        }
        if self.metadata_ns.trim().is_empty() {
            return Err(config_error!("metadata_ns must not be empty"));
        }
        if self.acquisition_evaluations == 0 {
            return Err(config_error!("acquisition_evaluations must be at least 1"));
        }
        if self.ard_restarts == 0 {
            return Err(config_error!("ard_restarts must be at least 1"));
        }
        Ok(())
    }
}
