//! Search space definitions and concrete parameter assignments.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::SearchSpaceError;

/// A parameter assignment keyed by parameter name.
pub type ParameterMap = HashMap<String, ParameterValue>;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes the feasible values of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous range [low, high] modelled in log-space.
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

impl ParameterKind {
    /// Whether `value` is a feasible value of this kind.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Self::FloatRange { low, high }, ParameterValue::Float(v))
            | (Self::LogUniform { low, high }, ParameterValue::Float(v)) => {
                v.is_finite() && *v >= *low && *v <= *high
            }
            (Self::IntRange { low, high }, ParameterValue::Int(v)) => *v >= *low && *v <= *high,
            (Self::Choice { values }, ParameterValue::Json(v)) => values.contains(v),
            _ => false,
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check that every range is well formed.
    pub fn validate(&self) -> Result<(), SearchSpaceError> {
        if self.parameters.is_empty() {
            return Err(SearchSpaceError::Empty);
        }
        for param in &self.parameters {
            let problem = match &param.kind {
                ParameterKind::FloatRange { low, high } => {
                    (!low.is_finite() || !high.is_finite() || low > high)
                        .then(|| format!("[{low}, {high}] is not a finite ordered range"))
                }
                ParameterKind::IntRange { low, high } => {
                    (low > high).then(|| format!("[{low}, {high}] is empty"))
                }
                ParameterKind::LogUniform { low, high } => (!low.is_finite()
                    || !high.is_finite()
                    || *low <= 0.0
                    || low > high)
                    .then(|| format!("[{low}, {high}] must be positive and ordered")),
                ParameterKind::Choice { values } => {
                    values.is_empty().then(|| "no categories".to_string())
                }
            };
            if let Some(message) = problem {
                return Err(SearchSpaceError::InvalidRange {
                    name: param.name.clone(),
                    message,
                });
            }
        }
        Ok(())
    }

    /// Whether `params` assigns a feasible value to every parameter.
    pub fn contains(&self, params: &ParameterMap) -> bool {
        self.assert_contains(params).is_ok()
    }

    /// Like [`SearchSpace::contains`], but reports the first violation.
    pub fn assert_contains(&self, params: &ParameterMap) -> Result<(), SearchSpaceError> {
        for param in &self.parameters {
            let value = params
                .get(&param.name)
                .ok_or_else(|| SearchSpaceError::MissingParameter(param.name.clone()))?;
            if !param.kind.contains(value) {
                let type_matches = matches!(
                    (&param.kind, value),
                    (ParameterKind::FloatRange { .. }, ParameterValue::Float(_))
                        | (ParameterKind::LogUniform { .. }, ParameterValue::Float(_))
                        | (ParameterKind::IntRange { .. }, ParameterValue::Int(_))
                        | (ParameterKind::Choice { .. }, ParameterValue::Json(_))
                );
                return Err(if type_matches {
                    SearchSpaceError::OutOfBounds {
                        name: param.name.clone(),
                        value: value.to_string(),
                    }
                } else {
                    SearchSpaceError::WrongType {
                        name: param.name.clone(),
                        value: value.to_string(),
                    }
                });
            }
        }
        Ok(())
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("num_layers", 1, 8)
            .add_float("dropout", 0.0, 0.5)
            .add_log_uniform("lr", 1e-5, 1e-1)
            .add_choice("optimizer", vec![serde_json::json!("adam"), serde_json::json!("sgd")])
    }

    fn sample_params() -> ParameterMap {
        let mut params = ParameterMap::new();
        params.insert("num_layers".into(), ParameterValue::Int(3));
        params.insert("dropout".into(), ParameterValue::Float(0.1));
        params.insert("lr".into(), ParameterValue::Float(1e-3));
        params.insert("optimizer".into(), ParameterValue::Json(serde_json::json!("sgd")));
        params
    }

    #[test]
    fn search_space_builder_chain() {
        let space = sample_space();
        assert_eq!(space.parameters.len(), 4);
        assert!(space.validate().is_ok());
    }

    #[test]
    fn contains_accepts_feasible_assignment() {
        assert!(sample_space().contains(&sample_params()));
    }

    #[test]
    fn assert_contains_reports_violations() {
        let space = sample_space();

        let mut params = sample_params();
        params.insert("dropout".into(), ParameterValue::Float(0.9));
        assert!(matches!(
            space.assert_contains(&params),
            Err(SearchSpaceError::OutOfBounds { .. })
        ));

        let mut params = sample_params();
        params.insert("num_layers".into(), ParameterValue::Float(3.0));
        assert!(matches!(
            space.assert_contains(&params),
            Err(SearchSpaceError::WrongType { .. })
        ));

        let mut params = sample_params();
        params.remove("lr");
        assert_eq!(
            space.assert_contains(&params),
            Err(SearchSpaceError::MissingParameter("lr".into()))
        );

        let mut params = sample_params();
        params.insert("optimizer".into(), ParameterValue::Json(serde_json::json!("rmsprop")));
        assert!(!space.contains(&params));
    }

    #[test]
    fn validate_rejects_malformed_ranges() {
        assert_eq!(SearchSpace::new().validate(), Err(SearchSpaceError::Empty));
        assert!(SearchSpace::new().add_float("x", 1.0, 0.0).validate().is_err());
        assert!(SearchSpace::new().add_log_uniform("x", 0.0, 1.0).validate().is_err());
        assert!(SearchSpace::new().add_choice("c", vec![]).validate().is_err());
        assert!(SearchSpace::new().add_int("i", 2, 2).validate().is_ok());
    }

    #[test]
    fn parameter_value_serde_is_untagged() {
        let json = serde_json::to_string(&ParameterValue::Int(4)).unwrap();
        assert_eq!(json, "4");
        let back: ParameterValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(back, ParameterValue::Float(0.25));
    }
}
