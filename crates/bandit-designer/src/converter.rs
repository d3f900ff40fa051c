//! Conversion between parameter assignments and model features, and between
//! raw objective values and the warped label space the GP is fitted in.
//!
//! Features live in the unit cube: continuous and integer parameters map to
//! one coordinate each (log-scaled where requested), categorical parameters to
//! a one-hot block.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use bandit_types::{
    BanditResult, MetricInformation, ObjectiveDirection, ParameterKind, ParameterMap,
    ParameterValue, SearchSpace, SearchSpaceError, Trial,
};

use crate::optimizer::FeatureDomain;

#[derive(Debug, Clone)]
enum Encoding {
    Linear { low: f64, high: f64 },
    Log { low: f64, high: f64 },
    Integer { low: i64, high: i64 },
    OneHot { values: Vec<serde_json::Value> },
}

#[derive(Debug, Clone)]
struct FeatureBlock {
    name: String,
    offset: usize,
    encoding: Encoding,
}

impl FeatureBlock {
    fn width(&self) -> usize {
        match &self.encoding {
            Encoding::OneHot { values } => values.len(),
            _ => 1,
        }
    }
}

fn unit(value: f64, low: f64, high: f64) -> f64 {
    if high > low {
        ((value - low) / (high - low)).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn from_unit(t: f64, low: f64, high: f64) -> f64 {
    if high > low {
        (low + t.clamp(0.0, 1.0) * (high - low)).clamp(low, high)
    } else {
        low
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Bidirectional mapping between a [`SearchSpace`] and unit-cube features.
#[derive(Debug, Clone)]
pub struct FeatureConverter {
    blocks: Vec<FeatureBlock>,
    dimension: usize,
}

impl FeatureConverter {
    pub fn new(space: &SearchSpace) -> BanditResult<Self> {
        space.validate()?;
        let mut blocks = Vec::with_capacity(space.parameters.len());
        let mut offset = 0;
        for param in &space.parameters {
            let encoding = match &param.kind {
                ParameterKind::FloatRange { low, high } => Encoding::Linear {
                    low: *low,
                    high: *high,
                },
                ParameterKind::LogUniform { low, high } => Encoding::Log {
                    low: *low,
                    high: *high,
                },
                ParameterKind::IntRange { low, high } => Encoding::Integer {
                    low: *low,
                    high: *high,
                },
                ParameterKind::Choice { values } => Encoding::OneHot {
                    values: values.clone(),
                },
            };
            let block = FeatureBlock {
                name: param.name.clone(),
                offset,
                encoding,
            };
            offset += block.width();
            blocks.push(block);
        }
        Ok(Self {
            blocks,
            dimension: offset,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn to_features(&self, params: &ParameterMap) -> Result<Vec<f64>, SearchSpaceError> {
        let mut features = vec![0.0; self.dimension];
        for block in &self.blocks {
            let value = params
                .get(&block.name)
                .ok_or_else(|| SearchSpaceError::MissingParameter(block.name.clone()))?;
            let wrong_type = || SearchSpaceError::WrongType {
                name: block.name.clone(),
                value: value.to_string(),
            };
            match (&block.encoding, value) {
                (Encoding::Linear { low, high }, ParameterValue::Float(v)) => {
                    features[block.offset] = unit(*v, *low, *high);
                }
                (Encoding::Log { low, high }, ParameterValue::Float(v)) => {
                    if *v <= 0.0 {
                        return Err(SearchSpaceError::OutOfBounds {
                            name: block.name.clone(),
                            value: value.to_string(),
                        });
                    }
                    features[block.offset] = unit(v.ln(), low.ln(), high.ln());
                }
                (Encoding::Integer { low, high }, ParameterValue::Int(v)) => {
                    features[block.offset] = unit(*v as f64, *low as f64, *high as f64);
                }
                (Encoding::OneHot { values }, ParameterValue::Json(v)) => {
                    let idx = values.iter().position(|c| c == v).ok_or_else(|| {
                        SearchSpaceError::OutOfBounds {
                            name: block.name.clone(),
                            value: v.to_string(),
                        }
                    })?;
                    features[block.offset + idx] = 1.0;
                }
                _ => return Err(wrong_type()),
            }
        }
        Ok(features)
    }

    /// Decode features into parameters. Out-of-range coordinates are clamped.
    pub fn to_parameters(&self, features: &[f64]) -> ParameterMap {
        let mut params = ParameterMap::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let t = features.get(block.offset).copied().unwrap_or(0.5);
            let value = match &block.encoding {
                Encoding::Linear { low, high } => ParameterValue::Float(from_unit(t, *low, *high)),
                Encoding::Log { low, high } => {
                    let v = from_unit(t, low.ln(), high.ln()).exp();
                    ParameterValue::Float(v.clamp(*low, *high))
                }
                Encoding::Integer { low, high } => {
                    let v = from_unit(t, *low as f64, *high as f64).round() as i64;
                    ParameterValue::Int(v.clamp(*low, *high))
                }
                Encoding::OneHot { values } => {
                    let end = (block.offset + values.len()).min(features.len());
                    let idx = if block.offset < end {
                        argmax(&features[block.offset..end])
                    } else {
                        0
                    };
                    ParameterValue::Json(values[idx].clone())
                }
            };
            params.insert(block.name.clone(), value);
        }
        params
    }
}

impl FeatureDomain for FeatureConverter {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<f64> {
        let mut features = vec![0.0; self.dimension];
        for block in &self.blocks {
            match &block.encoding {
                Encoding::OneHot { values } => {
                    features[block.offset + rng.random_range(0..values.len())] = 1.0;
                }
                _ => features[block.offset] = rng.random::<f64>(),
            }
        }
        self.project(&mut features);
        features
    }

    /// Snap features onto the decodable lattice: clamp continuous
    /// coordinates, round integers, make categorical blocks one-hot.
    fn project(&self, features: &mut [f64]) {
        for block in &self.blocks {
            match &block.encoding {
                Encoding::Linear { .. } | Encoding::Log { .. } => {
                    let t = features[block.offset];
                    features[block.offset] = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
                }
                Encoding::Integer { low, high } => {
                    let t = features[block.offset];
                    let t = if t.is_finite() { t } else { 0.5 };
                    let (lo, hi) = (*low as f64, *high as f64);
                    features[block.offset] = unit(from_unit(t, lo, hi).round(), lo, hi);
                }
                Encoding::OneHot { values } => {
                    let slot = &mut features[block.offset..block.offset + values.len()];
                    let cleaned: Vec<f64> = slot
                        .iter()
                        .map(|v| if v.is_finite() { *v } else { f64::NEG_INFINITY })
                        .collect();
                    let idx = argmax(&cleaned);
                    for (i, v) in slot.iter_mut().enumerate() {
                        *v = if i == idx { 1.0 } else { 0.0 };
                    }
                }
            }
        }
    }

    fn contains(&self, features: &[f64]) -> bool {
        if features.len() != self.dimension {
            return false;
        }
        self.blocks.iter().all(|block| match &block.encoding {
            Encoding::OneHot { values } => {
                let slot = &features[block.offset..block.offset + values.len()];
                slot.iter().all(|v| *v == 0.0 || *v == 1.0)
                    && slot.iter().filter(|v| **v == 1.0).count() == 1
            }
            _ => {
                let t = features[block.offset];
                t.is_finite() && (0.0..=1.0).contains(&t)
            }
        })
    }
}

/// Maps raw objective values into the standardized, maximization-oriented
/// label space.
#[derive(Debug, Clone)]
pub struct LabelWarper {
    metric: MetricInformation,
}

impl LabelWarper {
    pub fn new(metric: MetricInformation) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> &MetricInformation {
        &self.metric
    }

    /// Warp the objectives of `trials`. Infeasible trials, and trials whose
    /// metric is missing or non-finite, are imputed below the worst feasible
    /// value.
    pub fn warp<'a>(&self, trials: impl IntoIterator<Item = &'a Trial>) -> Vec<f64> {
        let (low, high) = self.metric.bounds();
        let raw: Vec<Option<f64>> = trials
            .into_iter()
            .map(|trial| {
                let value = trial.objective(&self.metric.name).filter(|v| v.is_finite());
                if value.is_none() && !trial.is_infeasible() {
                    warn!(
                        "trial {} has no finite value for metric {}; treating as infeasible",
                        trial.id, self.metric.name
                    );
                }
                value.map(|v| {
                    let v = v.clamp(low, high);
                    match self.metric.goal {
                        ObjectiveDirection::Maximize => v,
                        ObjectiveDirection::Minimize => -v,
                    }
                })
            })
            .collect();

        let feasible: Vec<f64> = raw.iter().flatten().copied().collect();
        if feasible.is_empty() {
            return vec![0.0; raw.len()];
        }
        let worst = feasible.iter().copied().fold(f64::INFINITY, f64::min);
        let best = feasible.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = best - worst;
        let imputed = if spread > 0.0 { worst - 0.5 * spread } else { worst - 1.0 };

        let labels: Vec<f64> = raw.iter().map(|v| v.unwrap_or(imputed)).collect();
        let n = labels.len() as f64;
        let mean = labels.iter().sum::<f64>() / n;
        let var = labels.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        let std = if var > 1e-20 { var.sqrt() } else { 1.0 };
        labels.iter().map(|y| (y - mean) / std).collect()
    }
}
