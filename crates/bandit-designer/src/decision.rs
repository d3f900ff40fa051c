//! Per-suggestion decision record.

use serde::{Deserialize, Serialize};

use bandit_types::Metadata;

/// Predictions (warped label space) and acquisition value behind one
/// suggestion. `use_ucb` is set iff `acquisition` is the UCB value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Completed-only posterior mean.
    pub mean: f64,
    /// Completed-only posterior stddev.
    pub stddev: f64,
    /// Completed+active posterior stddev.
    pub stddev_from_all: f64,
    pub acquisition: f64,
    pub use_ucb: bool,
}

impl DecisionMetadata {
    pub fn write_to(&self, metadata: &mut Metadata, namespace: &str) {
        let ns = metadata.ns_mut(namespace);
        ns.insert("mean".to_string(), self.mean.to_string());
        ns.insert("stddev".to_string(), self.stddev.to_string());
        ns.insert("stddev_from_all".to_string(), self.stddev_from_all.to_string());
        ns.insert("acquisition".to_string(), self.acquisition.to_string());
        ns.insert("use_ucb".to_string(), self.use_ucb.to_string());
    }

    /// Parse a record written by [`DecisionMetadata::write_to`].
    pub fn from_metadata(metadata: &Metadata, namespace: &str) -> Option<Self> {
        let float = |key: &str| metadata.get(namespace, key)?.parse::<f64>().ok();
        Some(Self {
            mean: float("mean")?,
            stddev: float("stddev")?,
            stddev_from_all: float("stddev_from_all")?,
            acquisition: float("acquisition")?,
            use_ucb: metadata.get(namespace, "use_ucb")?.parse().ok()?,
        })
    }
}
