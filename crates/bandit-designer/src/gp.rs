//! Zero-mean Gaussian process with a Matérn 5/2 ARD kernel.
//!
//! Masked (padded) rows get a unit diagonal, zero cross-covariance and a zero
//! label, which makes them algebraically inert: they add exact zeros to every
//! kernel product and to the log marginal likelihood.

use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use bandit_types::ModelFitError;

use crate::padding::TrainingData;

type CholeskyFactor = nalgebra::linalg::Cholesky<f64, Dyn>;

/// Diagonal jitter multipliers tried, in order, when the kernel matrix is not
/// numerically positive definite.
const JITTER_SCHEDULE: [f64; 4] = [0.0, 1e-8, 1e-6, 1e-4];

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Kernel hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpParams {
    /// Signal variance.
    pub amplitude: f64,
    /// ARD lengthscales, one per feature.
    pub lengthscales: Vec<f64>,
    /// Observation noise variance.
    pub noise_variance: f64,
}

impl GpParams {
    pub fn default_for(dimension: usize) -> Self {
        Self {
            amplitude: 1.0,
            lengthscales: vec![0.5; dimension],
            noise_variance: 1e-4,
        }
    }
}

/// Matérn 5/2 kernel with ARD lengthscales.
///
/// `k(x1, x2) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)`
pub fn matern52(x1: &[f64], x2: &[f64], params: &GpParams) -> f64 {
    let mut r_sq = 0.0;
    for ((a, b), l) in x1.iter().zip(x2).zip(&params.lengthscales) {
        let diff = (a - b) / l;
        r_sq += diff * diff;
    }
    let sqrt5_r = (5.0 * r_sq).sqrt();
    params.amplitude * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

#[derive(Debug, Clone)]
struct Posterior {
    cholesky: CholeskyFactor,
    /// (K + σ²I)^{-1} y
    alpha: DVector<f64>,
}

/// A GP conditioned on one [`TrainingData`] set.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    params: GpParams,
    features: Vec<Vec<f64>>,
    mask: Vec<bool>,
    labels: DVector<f64>,
    /// `None` when there are no rows: predictions fall back to the prior.
    posterior: Option<Posterior>,
}

impl GaussianProcess {
    pub fn fit(data: &TrainingData, params: GpParams) -> Result<Self, ModelFitError> {
        if params.lengthscales.len() != data.dimension {
            return Err(ModelFitError::DimensionMismatch {
                expected: data.dimension,
                actual: params.lengthscales.len(),
            });
        }
        if let Some(row) = data.features.iter().find(|row| row.len() != data.dimension) {
            return Err(ModelFitError::DimensionMismatch {
                expected: data.dimension,
                actual: row.len(),
            });
        }

        let labels = DVector::from_iterator(
            data.len(),
            data.labels
                .iter()
                .zip(&data.mask)
                .map(|(y, valid)| if *valid { *y } else { 0.0 }),
        );

        let posterior = if data.is_empty() {
            None
        } else {
            let mut factor = None;
            for jitter in JITTER_SCHEDULE {
                let k = kernel_matrix(&data.features, &data.mask, &params, jitter * params.amplitude);
                if let Some(chol) = CholeskyFactor::new(k) {
                    factor = Some(chol);
                    break;
                }
            }
            let cholesky = factor.ok_or(ModelFitError::NotPositiveDefinite { size: data.len() })?;
            let alpha = cholesky.solve(&labels);
            Some(Posterior { cholesky, alpha })
        };

        Ok(Self {
            params,
            features: data.features.clone(),
            mask: data.mask.clone(),
            labels,
            posterior,
        })
    }

    pub fn params(&self) -> &GpParams {
        &self.params
    }

    fn cross_covariance(&self, x: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.features.len(),
            self.features
                .iter()
                .zip(&self.mask)
                .map(|(row, valid)| if *valid { matern52(x, row, &self.params) } else { 0.0 }),
        )
    }

    /// Posterior mean and variance at `x`.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        match &self.posterior {
            None => (0.0, self.params.amplitude),
            Some(post) => {
                let k_star = self.cross_covariance(x);
                let mean = k_star.dot(&post.alpha);
                let v = post.cholesky.solve(&k_star);
                let var = (self.params.amplitude - k_star.dot(&v)).max(0.0);
                (mean, var)
            }
        }
    }

    /// Joint posterior mean vector and covariance matrix over `xs`.
    pub fn predict_joint(&self, xs: &[Vec<f64>]) -> (DVector<f64>, DMatrix<f64>) {
        let m = xs.len();
        let prior = DMatrix::from_fn(m, m, |i, j| matern52(&xs[i], &xs[j], &self.params));
        match &self.posterior {
            None => (DVector::zeros(m), prior),
            Some(post) => {
                let n = self.features.len();
                let mut k_star = DMatrix::zeros(n, m);
                for (j, x) in xs.iter().enumerate() {
                    k_star.set_column(j, &self.cross_covariance(x));
                }
                let mean = k_star.transpose() * &post.alpha;
                let v = post.cholesky.solve(&k_star);
                let cov = prior - k_star.transpose() * v;
                let cov = (&cov + cov.transpose()) * 0.5;
                (mean, cov)
            }
        }
    }

    /// Log marginal likelihood of the valid rows.
    pub fn log_marginal_likelihood(&self) -> f64 {
        match &self.posterior {
            None => 0.0,
            Some(post) => {
                let n_valid = self.mask.iter().filter(|&&valid| valid).count() as f64;
                let l = post.cholesky.l_dirty();
                let half_log_det: f64 = (0..l.nrows()).map(|i| l[(i, i)].ln()).sum();
                -0.5 * self.labels.dot(&post.alpha) - half_log_det - 0.5 * n_valid * LN_2PI
            }
        }
    }
}

fn kernel_matrix(features: &[Vec<f64>], mask: &[bool], params: &GpParams, jitter: f64) -> DMatrix<f64> {
    let n = features.len();
    DMatrix::from_fn(n, n, |i, j| match (mask[i], mask[j]) {
        (true, true) if i == j => {
            matern52(&features[i], &features[j], params) + params.noise_variance + jitter
        }
        (true, true) => matern52(&features[i], &features[j], params),
        _ if i == j => 1.0,
        _ => 0.0,
    })
}
