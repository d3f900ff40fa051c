//! Trials, measurements and the caller-supplied completed/active partitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::metadata::Metadata;
use crate::search::ParameterMap;

/// Caller-assigned trial identifier.
pub type TrialId = u64;

/// Metric values observed for a trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub metrics: BTreeMap<String, f64>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Active,
    Completed,
}

/// A single trial: one parameter assignment and, once evaluated, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub parameters: ParameterMap,
    pub status: TrialStatus,
    pub final_measurement: Option<Measurement>,
    /// Set when the evaluation finished but produced no usable objective.
    pub infeasibility_reason: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(id: TrialId, parameters: ParameterMap) -> Self {
        Self {
            id,
            parameters,
            status: TrialStatus::Active,
            final_measurement: None,
            infeasibility_reason: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn complete(mut self, measurement: Measurement) -> Self {
        self.status = TrialStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.final_measurement = Some(measurement);
        self
    }

    pub fn complete_infeasible(mut self, reason: impl Into<String>) -> Self {
        self.status = TrialStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.infeasibility_reason = Some(reason.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }

    pub fn is_infeasible(&self) -> bool {
        self.infeasibility_reason.is_some()
    }

    /// Objective value for `metric`, if the trial completed feasibly and
    /// reported it.
    pub fn objective(&self, metric: &str) -> Option<f64> {
        if self.is_infeasible() {
            return None;
        }
        self.final_measurement.as_ref()?.get(metric)
    }
}

/// Trials that finished since the previous update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrials {
    pub trials: Vec<Trial>,
}

impl CompletedTrials {
    pub fn new(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Every trial pending at the time of an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrials {
    pub trials: Vec<Trial>,
}

impl ActiveTrials {
    pub fn new(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// A candidate produced by a designer, not yet registered as a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub parameters: ParameterMap,
    pub metadata: Metadata,
}

impl Suggestion {
    pub fn new(parameters: ParameterMap) -> Self {
        Self {
            parameters,
            metadata: Metadata::new(),
        }
    }

    pub fn to_trial(&self, id: TrialId) -> Trial {
        Trial::new(id, self.parameters.clone()).with_metadata(self.metadata.clone())
    }
}
