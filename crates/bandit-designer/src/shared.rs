//! Thread-safe handle around a designer.

use std::sync::Arc;

use parking_lot::Mutex;

use bandit_types::{ActiveTrials, BanditResult, CompletedTrials, Suggestion, Trial};

use crate::designer::UcbPeDesigner;

/// Cloneable handle serializing access to one [`UcbPeDesigner`].
#[derive(Debug, Clone)]
pub struct SharedDesigner {
    inner: Arc<Mutex<UcbPeDesigner>>,
}

impl SharedDesigner {
    pub fn new(designer: UcbPeDesigner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(designer)),
        }
    }

    pub fn suggest(&self, count: usize) -> BanditResult<Vec<Suggestion>> {
        self.inner.lock().suggest(count)
    }

    pub fn update(&self, completed: CompletedTrials, active: ActiveTrials) -> BanditResult<()> {
        self.inner.lock().update(completed, active)
    }

    /// Update and suggest under one lock, so no other caller can interleave.
    pub fn update_and_suggest(
        &self,
        completed: CompletedTrials,
        active: ActiveTrials,
        count: usize,
    ) -> BanditResult<Vec<Suggestion>> {
        let mut designer = self.inner.lock();
        designer.update(completed, active)?;
        designer.suggest(count)
    }

    pub fn num_completed(&self) -> usize {
        self.inner.lock().num_completed()
    }

    pub fn best_trial(&self) -> Option<Trial> {
        self.inner.lock().best_trial().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DesignerConfig;
    use bandit_types::{Measurement, MetricInformation, ObjectiveDirection, ProblemStatement, SearchSpace};
    use std::thread;

    fn designer() -> UcbPeDesigner {
        let problem = ProblemStatement::new(SearchSpace::new().add_float("x", 0.0, 1.0))
            .with_metric(MetricInformation::new("y", ObjectiveDirection::Maximize));
        UcbPeDesigner::new(
            problem,
            DesignerConfig::default()
                .with_num_seed_trials(4)
                .with_acquisition_evaluations(100)
                .with_ard_restarts(2),
        )
        .unwrap()
    }

    #[test]
    fn concurrent_callers_share_one_ledger() {
        let shared = SharedDesigner::new(designer());
        let handles: Vec<_> = (0..4u64)
            .map(|worker| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let suggestion = shared.suggest(1).unwrap().remove(0);
                    let trial = suggestion
                        .to_trial(worker)
                        .complete(Measurement::new().with_metric("y", worker as f64));
                    shared
                        .update(CompletedTrials::new(vec![trial]), ActiveTrials::default())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.num_completed(), 4);
        assert_eq!(shared.best_trial().map(|t| t.id), Some(3));

        let batch = shared
            .update_and_suggest(CompletedTrials::default(), ActiveTrials::default(), 2)
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|s| !s.metadata.is_empty()));
    }
}
