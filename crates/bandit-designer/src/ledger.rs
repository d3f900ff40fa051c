//! Trial bookkeeping across `update` calls.

use std::collections::BTreeMap;

use tracing::debug;

use bandit_types::{
    ActiveTrials, BanditError, BanditResult, CompletedTrials, MetricInformation,
    ObjectiveDirection, Trial, TrialId,
};

/// Accumulated completed trials (deduplicated by id, ordered by id) and the
/// latest active set.
#[derive(Debug, Clone, Default)]
pub struct TrialLedger {
    completed: BTreeMap<TrialId, Trial>,
    active: Vec<Trial>,
    best: Option<(TrialId, f64)>,
    /// Completed count when the last model-driven batch was suggested.
    seen_completed: usize,
}

impl TrialLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge newly completed trials and replace the active set. Returns the
    /// number of completed trials that were not already known.
    pub fn record(
        &mut self,
        completed: CompletedTrials,
        active: ActiveTrials,
        metric: &MetricInformation,
    ) -> BanditResult<usize> {
        if let Some(trial) = completed.trials.iter().find(|t| !t.is_completed()) {
            return Err(BanditError::InvalidTrial {
                trial_id: trial.id,
                message: "passed as completed but is still active".to_string(),
            });
        }

        let mut added = 0;
        for trial in completed.trials {
            if self.completed.contains_key(&trial.id) {
                debug!("ignoring duplicate completed trial {}", trial.id);
                continue;
            }
            self.update_best(&trial, metric);
            self.completed.insert(trial.id, trial);
            added += 1;
        }
        self.active = active.trials;
        Ok(added)
    }

    fn update_best(&mut self, trial: &Trial, metric: &MetricInformation) {
        if trial.is_infeasible() {
            return;
        }
        let Some(value) = trial.objective(&metric.name).filter(|v| v.is_finite()) else {
            return;
        };
        let improves = match self.best {
            None => true,
            Some((_, best)) => match metric.goal {
                ObjectiveDirection::Maximize => value > best,
                ObjectiveDirection::Minimize => value < best,
            },
        };
        if improves {
            self.best = Some((trial.id, value));
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &Trial> + '_ {
        self.completed.values()
    }

    pub fn active(&self) -> &[Trial] {
        &self.active
    }

    pub fn num_completed(&self) -> usize {
        self.completed.len()
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    /// Trials counted against the seeding budget.
    pub fn num_seen(&self) -> usize {
        self.completed.len() + self.active.len()
    }

    /// Best feasible completed trial under the metric goal.
    pub fn best_trial(&self) -> Option<&Trial> {
        self.best.and_then(|(id, _)| self.completed.get(&id))
    }

    /// Whether trials completed since the last model-driven batch.
    pub fn has_unseen_completions(&self) -> bool {
        self.completed.len() > self.seen_completed
    }

    pub fn mark_seen(&mut self) {
        self.seen_completed = self.completed.len();
    }
}
