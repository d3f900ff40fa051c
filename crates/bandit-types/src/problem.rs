//! Problem statement: search space plus the metric being optimized.

use serde::{Deserialize, Serialize};

use crate::errors::{BanditError, BanditResult};
use crate::search::SearchSpace;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

/// Description of a single objective metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInformation {
    pub name: String,
    pub goal: ObjectiveDirection,
    /// Smallest value the metric can take, when known.
    pub min_value: Option<f64>,
    /// Largest value the metric can take, when known.
    pub max_value: Option<f64>,
}

impl MetricInformation {
    pub fn new(name: impl Into<String>, goal: ObjectiveDirection) -> Self {
        Self {
            name: name.into(),
            goal,
            min_value: None,
            max_value: None,
        }
    }

    pub fn with_bounds(mut self, min_value: f64, max_value: f64) -> Self {
        self.min_value = Some(min_value);
        self.max_value = Some(max_value);
        self
    }

    pub fn min_value_or(&self, default: impl FnOnce() -> f64) -> f64 {
        self.min_value.filter(|v| v.is_finite()).unwrap_or_else(default)
    }

    pub fn max_value_or(&self, default: impl FnOnce() -> f64) -> f64 {
        self.max_value.filter(|v| v.is_finite()).unwrap_or_else(default)
    }

    /// Bounds with explicit defaults for missing or inverted sides.
    pub fn bounds(&self) -> (f64, f64) {
        let low = self.min_value_or(|| f64::MIN);
        let high = self.max_value_or(|| f64::MAX);
        if low > high {
            (f64::MIN, f64::MAX)
        } else {
            (low, high)
        }
    }
}

/// What to optimize, and over which space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemStatement {
    pub search_space: SearchSpace,
    pub metric_information: Vec<MetricInformation>,
}

impl ProblemStatement {
    pub fn new(search_space: SearchSpace) -> Self {
        Self {
            search_space,
            metric_information: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: MetricInformation) -> Self {
        self.metric_information.push(metric);
        self
    }

    /// The single objective this designer optimizes.
    pub fn objective(&self) -> BanditResult<&MetricInformation> {
        match self.metric_information.as_slice() {
            [metric] => Ok(metric),
            [] => Err(BanditError::Config(
                "problem statement has no objective metric".to_string(),
            )),
            metrics => Err(BanditError::Config(format!(
                "expected exactly one objective metric, got {}",
                metrics.len()
            ))),
        }
    }
}
