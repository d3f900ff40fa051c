//! Ensemble of independently fitted GPs with explicit moment composition.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bandit_types::ModelFitError;

use crate::ard::ArdOptimizer;
use crate::gp::{GaussianProcess, GpParams};
use crate::padding::{PaddingPolicy, TrainingData};
use crate::rng::RngKey;

/// Which trials a prediction is conditioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelView {
    CompletedOnly,
    CompletedAndActive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub mean: f64,
    pub stddev: f64,
}

/// Law-of-total-variance reduction of per-member `(mean, variance)` pairs:
/// mean of means, and variance of means plus mean of variances.
pub fn combine_moments(moments: &[(f64, f64)]) -> (f64, f64) {
    if moments.is_empty() {
        return (0.0, 0.0);
    }
    let m = moments.len() as f64;
    let mean = moments.iter().map(|(mu, _)| mu).sum::<f64>() / m;
    let spread = moments.iter().map(|(mu, _)| (mu - mean).powi(2)).sum::<f64>() / m;
    let within = moments.iter().map(|(_, var)| var).sum::<f64>() / m;
    (mean, spread + within)
}

/// Matrix form of [`combine_moments`] for joint predictions.
pub fn combine_joint_moments(moments: &[(DVector<f64>, DMatrix<f64>)]) -> (DVector<f64>, DMatrix<f64>) {
    let Some((first_mean, _)) = moments.first() else {
        return (DVector::zeros(0), DMatrix::zeros(0, 0));
    };
    let k = first_mean.len();
    let m = moments.len() as f64;
    let mut mean = DVector::zeros(k);
    for (mu, _) in moments {
        mean += mu;
    }
    mean /= m;

    let mut cov = DMatrix::zeros(k, k);
    for (mu, sigma) in moments {
        let centered = mu - &mean;
        cov += sigma;
        cov += &centered * centered.transpose();
    }
    cov /= m;
    (mean, cov)
}

#[derive(Debug, Clone)]
struct EnsembleMember {
    completed: GaussianProcess,
    with_active: GaussianProcess,
}

impl EnsembleMember {
    fn gp(&self, view: ModelView) -> &GaussianProcess {
        match view {
            ModelView::CompletedOnly => &self.completed,
            ModelView::CompletedAndActive => &self.with_active,
        }
    }

    /// Condition on completed rows plus `pending` points labelled with this
    /// member's completed-only posterior mean.
    fn conditioned(
        completed: &TrainingData,
        completed_gp: &GaussianProcess,
        pending: &[Vec<f64>],
        padding: &dyn PaddingPolicy,
    ) -> Result<GaussianProcess, ModelFitError> {
        let pseudo_labels: Vec<f64> = pending.iter().map(|x| completed_gp.predict(x).0).collect();
        let data = completed.extended(pending, &pseudo_labels).pad(padding);
        GaussianProcess::fit(&data, completed_gp.params().clone())
    }
}

/// Fixed-size ordered collection of fitted surrogate models.
#[derive(Debug, Clone)]
pub struct SurrogateEnsemble {
    members: Vec<EnsembleMember>,
    completed: TrainingData,
    pending: Vec<Vec<f64>>,
    padding: Arc<dyn PaddingPolicy>,
}

impl SurrogateEnsemble {
    /// Fit `size` members in parallel, one split key each. Members whose fit
    /// fails are dropped; an empty result is an error.
    pub fn fit(
        completed: TrainingData,
        pending: Vec<Vec<f64>>,
        size: usize,
        ard: &dyn ArdOptimizer,
        padding: Arc<dyn PaddingPolicy>,
        key: RngKey,
    ) -> Result<Self, ModelFitError> {
        let completed = completed.unpadded();
        let padded = completed.pad(padding.as_ref());
        let keys = key.split_n(size.max(1));
        let attempted = keys.len();

        let results: Vec<Result<EnsembleMember, ModelFitError>> = keys
            .into_par_iter()
            .map(|member_key| {
                let params: GpParams = ard.fit(&padded, member_key)?;
                let completed_gp = GaussianProcess::fit(&padded, params)?;
                let with_active =
                    EnsembleMember::conditioned(&completed, &completed_gp, &pending, padding.as_ref())?;
                Ok(EnsembleMember {
                    completed: completed_gp,
                    with_active,
                })
            })
            .collect();

        let mut members = Vec::with_capacity(attempted);
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(member) => members.push(member),
                Err(e) => warn!("dropping ensemble member {index}: {e}"),
            }
        }
        if members.is_empty() {
            return Err(ModelFitError::EmptyEnsemble { attempted });
        }
        debug!(
            "fitted {}/{} ensemble members on {} completed and {} pending points",
            members.len(),
            attempted,
            completed.len(),
            pending.len()
        );

        Ok(Self {
            members,
            completed,
            pending,
            padding,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn num_completed(&self) -> usize {
        self.completed.len()
    }

    pub fn pending(&self) -> &[Vec<f64>] {
        &self.pending
    }

    pub fn completed_features(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.completed.features.iter().map(Vec::as_slice)
    }

    pub fn member_params(&self) -> Vec<&GpParams> {
        self.members.iter().map(|m| m.completed.params()).collect()
    }

    /// Replace the pending set and recondition the completed+active view.
    pub fn condition_on(&mut self, pending: Vec<Vec<f64>>) -> Result<(), ModelFitError> {
        let padding = self.padding.clone();
        let completed = &self.completed;
        let updated: Vec<GaussianProcess> = self
            .members
            .par_iter()
            .map(|member| {
                EnsembleMember::conditioned(completed, &member.completed, &pending, padding.as_ref())
            })
            .collect::<Result<_, _>>()?;
        for (member, gp) in self.members.iter_mut().zip(updated) {
            member.with_active = gp;
        }
        self.pending = pending;
        Ok(())
    }

    /// Add one point to the pending set.
    pub fn add_pending(&mut self, point: Vec<f64>) -> Result<(), ModelFitError> {
        let mut pending = self.pending.clone();
        pending.push(point);
        self.condition_on(pending)
    }

    pub fn predict(&self, x: &[f64], view: ModelView) -> Prediction {
        let moments: Vec<(f64, f64)> = self.members.iter().map(|m| m.gp(view).predict(x)).collect();
        let (mean, variance) = combine_moments(&moments);
        Prediction {
            mean,
            stddev: variance.max(0.0).sqrt(),
        }
    }

    pub fn predict_joint(&self, xs: &[Vec<f64>], view: ModelView) -> (DVector<f64>, DMatrix<f64>) {
        let moments: Vec<_> = self.members.iter().map(|m| m.gp(view).predict_joint(xs)).collect();
        combine_joint_moments(&moments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ard::RandomRestartArd;
    use crate::padding::{PaddingSchedule, PaddingType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data() -> TrainingData {
        let features = vec![vec![0.1, 0.1], vec![0.2, 0.8], vec![0.6, 0.4], vec![0.9, 0.9], vec![0.5, 0.5]];
        let labels = vec![-1.2, 0.3, 0.9, -0.4, 0.4];
        TrainingData::new(features, labels, 2)
    }

    fn no_padding() -> Arc<dyn PaddingPolicy> {
        Arc::new(PaddingSchedule::default())
    }

    #[test]
    fn single_member_combination_is_pass_through() {
        assert_eq!(combine_moments(&[(1.5, 0.25)]), (1.5, 0.25));
    }

    #[test]
    fn combination_uses_law_of_total_variance() {
        let (mean, var) = combine_moments(&[(1.0, 0.5), (3.0, 1.5)]);
        assert!((mean - 2.0).abs() < 1e-12);
        // variance of means (1.0) + mean of variances (1.0)
        assert!((var - 2.0).abs() < 1e-12);
    }

    #[test]
    fn joint_combination_matches_scalar_on_diagonal() {
        let a = (DVector::from_vec(vec![1.0, 0.0]), DMatrix::from_row_slice(2, 2, &[0.5, 0.1, 0.1, 0.4]));
        let b = (DVector::from_vec(vec![3.0, 2.0]), DMatrix::from_row_slice(2, 2, &[1.5, 0.2, 0.2, 0.6]));
        let (mean, cov) = combine_joint_moments(&[a, b]);
        assert_eq!(mean, DVector::from_vec(vec![2.0, 1.0]));
        assert!((cov[(0, 0)] - combine_moments(&[(1.0, 0.5), (3.0, 1.5)]).1).abs() < 1e-12);
        assert!((cov[(1, 1)] - combine_moments(&[(0.0, 0.4), (2.0, 0.6)]).1).abs() < 1e-12);
        // cross term: mean cov (0.15) + covariance of means (1.0)
        assert!((cov[(0, 1)] - 1.15).abs() < 1e-12);
    }

    #[test]
    fn completed_and_active_view_has_smaller_stddev() {
        let mut ensemble = SurrogateEnsemble::fit(
            data(),
            vec![],
            3,
            &RandomRestartArd::new(3),
            no_padding(),
            RngKey::new(2),
        )
        .unwrap();
        assert_eq!(ensemble.len(), 3);

        let x = [0.35, 0.35];
        let before = ensemble.predict(&x, ModelView::CompletedAndActive);
        assert_eq!(before, ensemble.predict(&x, ModelView::CompletedOnly));

        ensemble.add_pending(vec![0.33, 0.36]).unwrap();
        let completed = ensemble.predict(&x, ModelView::CompletedOnly);
        let with_active = ensemble.predict(&x, ModelView::CompletedAndActive);
        assert_eq!(completed, before);
        assert!(with_active.stddev < completed.stddev);
        assert!((with_active.mean - completed.mean).abs() < 1e-6);
        assert_eq!(ensemble.pending().len(), 1);
    }

    #[test]
    fn padding_does_not_change_ensemble_predictions() {
        let pending = vec![vec![0.7, 0.2]];
        let plain = SurrogateEnsemble::fit(
            data(),
            pending.clone(),
            2,
            &RandomRestartArd::new(3),
            no_padding(),
            RngKey::new(4),
        )
        .unwrap();
        let padded = SurrogateEnsemble::fit(
            data(),
            pending,
            2,
            &RandomRestartArd::new(3),
            Arc::new(PaddingSchedule::new(PaddingType::MultiplesOf10)),
            RngKey::new(4),
        )
        .unwrap();

        for view in [ModelView::CompletedOnly, ModelView::CompletedAndActive] {
            for x in [[0.0, 1.0], [0.5, 0.45], [0.75, 0.25]] {
                let a = plain.predict(&x, view);
                let b = padded.predict(&x, view);
                assert!((a.mean - b.mean).abs() < 1e-9);
                assert!((a.stddev - b.stddev).abs() < 1e-9);
            }
        }
    }

    /// Fails every other call.
    #[derive(Debug, Default)]
    struct FlakyArd {
        calls: AtomicUsize,
    }

    impl ArdOptimizer for FlakyArd {
        fn fit(&self, data: &TrainingData, _key: RngKey) -> Result<GpParams, ModelFitError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(ModelFitError::NonFiniteLikelihood)
            } else {
                Ok(GpParams::default_for(data.dimension))
            }
        }
    }

    #[derive(Debug)]
    struct BrokenArd;

    impl ArdOptimizer for BrokenArd {
        fn fit(&self, _data: &TrainingData, _key: RngKey) -> Result<GpParams, ModelFitError> {
            Err(ModelFitError::NonFiniteLikelihood)
        }
    }

    #[test]
    fn failed_members_are_dropped() {
        let ensemble =
            SurrogateEnsemble::fit(data(), vec![], 4, &FlakyArd::default(), no_padding(), RngKey::new(0))
                .unwrap();
        assert_eq!(ensemble.len(), 2);
    }

    #[test]
    fn all_members_failing_is_fatal() {
        let err = SurrogateEnsemble::fit(data(), vec![], 3, &BrokenArd, no_padding(), RngKey::new(0))
            .unwrap_err();
        assert_eq!(err, ModelFitError::EmptyEnsemble { attempted: 3 });
    }
}
