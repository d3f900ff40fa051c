//! Fixed-shape padding of model training arrays.
//!
//! Padded rows are masked out: the GP treats them as isolated unit-variance
//! points with zero labels, so they never influence a prediction.

use serde::{Deserialize, Serialize};

/// Maps a trial count to the padded array length.
pub trait PaddingPolicy: Send + Sync + std::fmt::Debug {
    /// Padded capacity for `n` rows. Always `>= n`.
    fn padded_len(&self, n: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingType {
    #[default]
    None,
    MultiplesOf10,
    PowersOf2,
}

impl PaddingType {
    fn pad(self, n: usize) -> usize {
        match self {
            Self::None => n,
            Self::MultiplesOf10 => n.div_ceil(10) * 10,
            Self::PowersOf2 if n == 0 => 0,
            Self::PowersOf2 => n.next_power_of_two(),
        }
    }
}

/// Padding schedule for the trial axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingSchedule {
    pub num_trials: PaddingType,
}

impl PaddingSchedule {
    pub fn new(num_trials: PaddingType) -> Self {
        Self { num_trials }
    }
}

impl PaddingPolicy for PaddingSchedule {
    fn padded_len(&self, n: usize) -> usize {
        self.num_trials.pad(n)
    }
}

/// Model inputs: feature rows, labels and a validity mask of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    /// `false` marks a padded row.
    pub mask: Vec<bool>,
    pub dimension: usize,
}

impl TrainingData {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<f64>, dimension: usize) -> Self {
        let mask = vec![true; features.len()];
        Self {
            features,
            labels,
            mask,
            dimension,
        }
    }

    /// Number of rows including padding.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_valid(&self) -> usize {
        self.mask.iter().filter(|&&valid| valid).count()
    }

    /// Rows that are not padding, with their labels.
    pub fn valid_rows(&self) -> impl Iterator<Item = (&[f64], f64)> + '_ {
        self.features
            .iter()
            .zip(&self.labels)
            .zip(&self.mask)
            .filter(|(_, valid)| **valid)
            .map(|((row, label), _)| (row.as_slice(), *label))
    }

    /// Append rows (and labels) that are real observations.
    pub fn extended(&self, features: &[Vec<f64>], labels: &[f64]) -> Self {
        let mut out = self.unpadded();
        out.features.extend(features.iter().cloned());
        out.labels.extend_from_slice(labels);
        out.mask.extend(std::iter::repeat(true).take(features.len()));
        out
    }

    /// Drop padded rows.
    pub fn unpadded(&self) -> Self {
        let (features, labels): (Vec<_>, Vec<_>) = self
            .valid_rows()
            .map(|(row, label)| (row.to_vec(), label))
            .unzip();
        Self::new(features, labels, self.dimension)
    }

    /// Grow to the policy's capacity with masked zero rows.
    pub fn pad(&self, policy: &dyn PaddingPolicy) -> Self {
        let mut out = self.unpadded();
        let target = policy.padded_len(out.len()).max(out.len());
        let extra = target - out.len();
        out.features
            .extend(std::iter::repeat(vec![0.0; self.dimension]).take(extra));
        out.labels.extend(std::iter::repeat(0.0).take(extra));
        out.mask.extend(std::iter::repeat(false).take(extra));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_lengths() {
        let none = PaddingSchedule::new(PaddingType::None);
        let tens = PaddingSchedule::new(PaddingType::MultiplesOf10);
        let pow2 = PaddingSchedule::new(PaddingType::PowersOf2);

        assert_eq!(none.padded_len(7), 7);
        assert_eq!(tens.padded_len(0), 0);
        assert_eq!(tens.padded_len(1), 10);
        assert_eq!(tens.padded_len(10), 10);
        assert_eq!(tens.padded_len(11), 20);
        assert_eq!(pow2.padded_len(0), 0);
        assert_eq!(pow2.padded_len(5), 8);
        assert_eq!(pow2.padded_len(8), 8);
    }

    #[test]
    fn pad_appends_masked_rows() {
        let data = TrainingData::new(vec![vec![0.1, 0.2], vec![0.3, 0.4]], vec![1.0, -1.0], 2);
        let padded = data.pad(&PaddingSchedule::new(PaddingType::MultiplesOf10));

        assert_eq!(padded.len(), 10);
        assert_eq!(padded.num_valid(), 2);
        assert_eq!(padded.mask[..2], [true, true]);
        assert!(padded.mask[2..].iter().all(|valid| !valid));
        assert!(padded.labels[2..].iter().all(|&y| y == 0.0));
        assert_eq!(padded.unpadded(), data);
    }

    #[test]
    fn extended_keeps_rows_valid_and_drops_padding() {
        let data = TrainingData::new(vec![vec![0.5]], vec![2.0], 1)
            .pad(&PaddingSchedule::new(PaddingType::PowersOf2));
        let grown = data
            .pad(&PaddingSchedule::new(PaddingType::MultiplesOf10))
            .extended(&[vec![0.9]], &[0.0]);
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.num_valid(), 2);
        let rows: Vec<_> = grown.valid_rows().map(|(row, y)| (row[0], y)).collect();
        assert_eq!(rows, vec![(0.5, 2.0), (0.9, 0.0)]);
    }
}
