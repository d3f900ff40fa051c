//! Hyperparameter fitting (automatic relevance determination).

use rand::Rng;
use tracing::debug;

use bandit_types::ModelFitError;

use crate::gp::{GaussianProcess, GpParams};
use crate::padding::TrainingData;
use crate::rng::RngKey;

/// Fits kernel hyperparameters to training data.
pub trait ArdOptimizer: Send + Sync + std::fmt::Debug {
    fn fit(&self, data: &TrainingData, key: RngKey) -> Result<GpParams, ModelFitError>;
}

/// Natural-log bounds of the hyperparameter search box.
#[derive(Debug, Clone, PartialEq)]
pub struct LogBounds {
    pub amplitude: (f64, f64),
    pub lengthscale: (f64, f64),
    pub noise_variance: (f64, f64),
}

impl Default for LogBounds {
    fn default() -> Self {
        Self {
            amplitude: (0.05_f64.ln(), 20.0_f64.ln()),
            lengthscale: (0.02_f64.ln(), 10.0_f64.ln()),
            noise_variance: (1e-6_f64.ln(), 0.5_f64.ln()),
        }
    }
}

/// Maximizes the log marginal likelihood from random starting points, then
/// polishes the best start with shrinking coordinate moves in log-space.
#[derive(Debug, Clone)]
pub struct RandomRestartArd {
    pub num_restarts: usize,
    pub refinement_sweeps: usize,
    pub bounds: LogBounds,
}

impl Default for RandomRestartArd {
    fn default() -> Self {
        Self {
            num_restarts: 8,
            refinement_sweeps: 4,
            bounds: LogBounds::default(),
        }
    }
}

impl RandomRestartArd {
    pub fn new(num_restarts: usize) -> Self {
        Self {
            num_restarts: num_restarts.max(1),
            ..Self::default()
        }
    }

    /// Layout: [ln amplitude, ln lengthscale_1..d, ln noise].
    fn to_params(theta: &[f64]) -> GpParams {
        let d = theta.len() - 2;
        GpParams {
            amplitude: theta[0].exp(),
            lengthscales: theta[1..=d].iter().map(|v| v.exp()).collect(),
            noise_variance: theta[d + 1].exp(),
        }
    }

    fn bound(&self, index: usize, dimension: usize) -> (f64, f64) {
        if index == 0 {
            self.bounds.amplitude
        } else if index <= dimension {
            self.bounds.lengthscale
        } else {
            self.bounds.noise_variance
        }
    }

    fn objective(data: &TrainingData, theta: &[f64]) -> f64 {
        match GaussianProcess::fit(data, Self::to_params(theta)) {
            Ok(gp) => {
                let lml = gp.log_marginal_likelihood();
                if lml.is_finite() {
                    lml
                } else {
                    f64::NEG_INFINITY
                }
            }
            Err(_) => f64::NEG_INFINITY,
        }
    }
}

impl ArdOptimizer for RandomRestartArd {
    fn fit(&self, data: &TrainingData, key: RngKey) -> Result<GpParams, ModelFitError> {
        let d = data.dimension;
        if data.num_valid() == 0 {
            return Ok(GpParams::default_for(d));
        }

        let default = GpParams::default_for(d);
        let mut starts = Vec::with_capacity(self.num_restarts.max(1));
        let mut first = vec![default.amplitude.ln()];
        first.extend(default.lengthscales.iter().map(|l| l.ln()));
        first.push(default.noise_variance.ln());
        starts.push(first);

        let mut rng = key.to_rng();
        for _ in 1..self.num_restarts.max(1) {
            let theta: Vec<f64> = (0..d + 2)
                .map(|i| {
                    let (lo, hi) = self.bound(i, d);
                    rng.random_range(lo..=hi)
                })
                .collect();
            starts.push(theta);
        }

        let (mut best, mut best_value) = starts
            .into_iter()
            .map(|theta| {
                let value = Self::objective(data, &theta);
                (theta, value)
            })
            .fold((Vec::new(), f64::NEG_INFINITY), |acc, cand| {
                if cand.1 > acc.1 {
                    cand
                } else {
                    acc
                }
            });
        if !best_value.is_finite() {
            return Err(ModelFitError::NonFiniteLikelihood);
        }

        let mut step = 1.0;
        for _ in 0..self.refinement_sweeps {
            for i in 0..best.len() {
                let (lo, hi) = self.bound(i, d);
                for direction in [1.0, -1.0] {
                    let mut trial = best.clone();
                    trial[i] = (trial[i] + direction * step).clamp(lo, hi);
                    let value = Self::objective(data, &trial);
                    if value > best_value {
                        best = trial;
                        best_value = value;
                        break;
                    }
                }
            }
            step *= 0.5;
        }

        debug!("ARD fit: log marginal likelihood {:.4}", best_value);
        Ok(Self::to_params(&best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smooth_data() -> TrainingData {
        let features: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64 / 11.0]).collect();
        let labels: Vec<f64> = features.iter().map(|x| (6.0 * x[0]).sin()).collect();
        TrainingData::new(features, labels, 1)
    }

    #[test]
    fn empty_data_returns_default_params() {
        let ard = RandomRestartArd::default();
        let params = ard.fit(&TrainingData::new(vec![], vec![], 2), RngKey::new(0)).unwrap();
        assert_eq!(params, GpParams::default_for(2));
    }

    #[test]
    fn fit_improves_on_default_likelihood() {
        let data = smooth_data();
        let ard = RandomRestartArd::default();
        let params = ard.fit(&data, RngKey::new(5)).unwrap();

        let fitted = GaussianProcess::fit(&data, params.clone()).unwrap();
        let baseline = GaussianProcess::fit(&data, GpParams::default_for(1)).unwrap();
        assert!(fitted.log_marginal_likelihood() >= baseline.log_marginal_likelihood());

        let bounds = LogBounds::default();
        assert!(params.amplitude.ln() >= bounds.amplitude.0 - 1e-12);
        assert!(params.amplitude.ln() <= bounds.amplitude.1 + 1e-12);
        assert!(params.noise_variance.ln() <= bounds.noise_variance.1 + 1e-12);
    }

    #[test]
    fn fit_is_deterministic_per_key() {
        let data = smooth_data();
        let ard = RandomRestartArd::new(4);
        assert_eq!(
            ard.fit(&data, RngKey::new(11)).unwrap(),
            ard.fit(&data, RngKey::new(11)).unwrap()
        );
    }
}
