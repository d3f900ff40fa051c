//! Acquisition policies: UCB, pure exploration (PE) and set pure exploration.
//!
//! Every value is computed in the warped label space from ensemble
//! predictions under one of the two model views:
//!
//! - UCB: `mean(completed) + ucb_coefficient * stddev(completed + active)`
//! - PE: `stddev(completed + active) - penalty * max(0, violation)`
//! - Set-PE: `log det Cov(completed + active)` over the whole set, minus the
//!   members' PE penalties
//!
//! The PE violation measures how far a point's optimistic estimate
//! `mean + explore_region_ucb_coefficient * stddev` (completed-only view)
//! falls below the explore threshold: the completed-only posterior mean at
//! the completed trial with the largest such optimistic estimate.

use nalgebra::linalg::Cholesky;
use serde::{Deserialize, Serialize};

use crate::config::UcbPeConfig;
use crate::ensemble::{ModelView, SurrogateEnsemble};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionPolicy {
    Ucb,
    Pe,
    SetPe,
}

/// Predictions backing a decision record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointEstimate {
    pub mean: f64,
    pub stddev: f64,
    pub stddev_from_all: f64,
}

pub struct AcquisitionEngine<'a> {
    ensemble: &'a SurrogateEnsemble,
    config: &'a UcbPeConfig,
    threshold: Option<f64>,
}

impl<'a> AcquisitionEngine<'a> {
    pub fn new(ensemble: &'a SurrogateEnsemble, config: &'a UcbPeConfig) -> Self {
        let coefficient = config.explore_region_ucb_coefficient;
        let threshold = ensemble
            .completed_features()
            .map(|x| ensemble.predict(x, ModelView::CompletedOnly))
            .map(|p| (p.mean + coefficient * p.stddev, p.mean))
            .fold(None, |best: Option<(f64, f64)>, cand| match best {
                Some(b) if b.0 >= cand.0 => Some(b),
                _ => Some(cand),
            })
            .map(|(_, mean)| mean);
        Self {
            ensemble,
            config,
            threshold,
        }
    }

    pub fn explore_threshold(&self) -> Option<f64> {
        self.threshold
    }

    pub fn estimate(&self, x: &[f64]) -> PointEstimate {
        let completed = self.ensemble.predict(x, ModelView::CompletedOnly);
        let all = self.ensemble.predict(x, ModelView::CompletedAndActive);
        PointEstimate {
            mean: completed.mean,
            stddev: completed.stddev,
            stddev_from_all: all.stddev,
        }
    }

    pub fn ucb_from(&self, estimate: &PointEstimate) -> f64 {
        estimate.mean + self.config.ucb_coefficient * estimate.stddev_from_all
    }

    pub fn ucb(&self, x: &[f64]) -> f64 {
        self.ucb_from(&self.estimate(x))
    }

    /// Distance below the explore threshold; non-positive inside the region.
    pub fn constraint_violation_from(&self, estimate: &PointEstimate) -> f64 {
        match self.threshold {
            Some(threshold) => {
                threshold
                    - (estimate.mean + self.config.explore_region_ucb_coefficient * estimate.stddev)
            }
            None => f64::NEG_INFINITY,
        }
    }

    pub fn penalty_from(&self, estimate: &PointEstimate) -> f64 {
        self.config.cb_violation_penalty_coefficient
            * self.constraint_violation_from(estimate).max(0.0)
    }

    pub fn pe_from(&self, estimate: &PointEstimate) -> f64 {
        estimate.stddev_from_all - self.penalty_from(estimate)
    }

    pub fn pe(&self, x: &[f64]) -> f64 {
        self.pe_from(&self.estimate(x))
    }

    /// Log-determinant of the joint completed+active predictive covariance
    /// over `xs`, minus the summed PE penalties. `-inf` if singular.
    pub fn set_pe(&self, xs: &[Vec<f64>]) -> f64 {
        if xs.is_empty() {
            return f64::NEG_INFINITY;
        }
        let (_, cov) = self.ensemble.predict_joint(xs, ModelView::CompletedAndActive);
        let log_det = match Cholesky::new(cov) {
            Some(chol) => {
                let l = chol.l_dirty();
                2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>()
            }
            None => return f64::NEG_INFINITY,
        };
        let penalty: f64 = xs.iter().map(|x| self.penalty_from(&self.estimate(x))).sum();
        log_det - penalty
    }

    /// Score a candidate set under `policy`. Point policies score `xs[0]`.
    pub fn score(&self, policy: AcquisitionPolicy, xs: &[Vec<f64>]) -> f64 {
        match policy {
            AcquisitionPolicy::Ucb => xs.first().map_or(f64::NEG_INFINITY, |x| self.ucb(x)),
            AcquisitionPolicy::Pe => xs.first().map_or(f64::NEG_INFINITY, |x| self.pe(x)),
            AcquisitionPolicy::SetPe => self.set_pe(xs),
        }
    }
}
