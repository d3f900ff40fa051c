//! # bandit-designer
//!
//! Batch GP-UCB-PE black-box optimization.
//!
//! Provides seed strategies, the GP surrogate ensemble with its completed-only
//! and completed+active views, the UCB / PE / set-PE acquisition policies,
//! batch strategy selection, and the [`UcbPeDesigner`] that ties them to the
//! suggest/update loop.

mod acquisition;
mod ard;
mod config;
mod controller;
mod converter;
mod decision;
mod designer;
mod ensemble;
mod gp;
mod ledger;
mod optimizer;
mod padding;
mod rng;
mod seeding;
mod shared;

pub use acquisition::{AcquisitionEngine, AcquisitionPolicy, PointEstimate};
pub use ard::{ArdOptimizer, LogBounds, RandomRestartArd};
pub use config::{DesignerConfig, UcbPeConfig};
pub use controller::{BatchStrategy, BatchSuggestionController, SlotDecision, SlotGroup};
pub use converter::{FeatureConverter, LabelWarper};
pub use decision::DecisionMetadata;
pub use designer::UcbPeDesigner;
pub use ensemble::{combine_joint_moments, combine_moments, ModelView, Prediction, SurrogateEnsemble};
pub use gp::{matern52, GaussianProcess, GpParams};
pub use ledger::TrialLedger;
pub use optimizer::{AcquisitionOptimizer, EvolutionaryOptimizer, FeatureDomain, OptimizedSet, SetScorer};
pub use padding::{PaddingPolicy, PaddingSchedule, PaddingType, TrainingData};
pub use rng::RngKey;
pub use seeding::{GridSeeder, QuasiRandomSeeder, RandomSeeder, SeedStrategy};
pub use shared::SharedDesigner;
