//! Batch strategy selection and slot-by-slot acquisition optimization.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bandit_types::{acquisition_error, BanditResult};

use crate::acquisition::{AcquisitionEngine, AcquisitionPolicy};
use crate::config::UcbPeConfig;
use crate::decision::DecisionMetadata;
use crate::ensemble::SurrogateEnsemble;
use crate::optimizer::{AcquisitionOptimizer, FeatureDomain};
use crate::rng::RngKey;

/// How a whole batch is filled. Drawn once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStrategy {
    UcbAll,
    PeAll,
    DefaultInterleave,
}

/// One optimization step of a batch plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotGroup {
    /// A single slot scored by a point policy.
    Single(AcquisitionPolicy),
    /// `n` slots chosen together by the set acquisition.
    Joint(usize),
}

impl SlotGroup {
    pub fn size(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Joint(n) => *n,
        }
    }
}

impl BatchStrategy {
    /// UCB overwrite first, then an independent PE overwrite draw.
    pub fn draw(config: &UcbPeConfig, key: RngKey) -> Self {
        let (ucb_key, pe_key) = key.split();
        if ucb_key.uniform() < config.ucb_overwrite_probability {
            Self::UcbAll
        } else if pe_key.uniform() < config.pe_overwrite_probability {
            Self::PeAll
        } else {
            Self::DefaultInterleave
        }
    }

    /// Lay out `batch_size` slots. Under default interleaving slot 0 is UCB
    /// only when there are completed trials the previous batch did not see.
    pub fn plan(self, batch_size: usize, has_new_completions: bool, joint_exploration: bool) -> Vec<SlotGroup> {
        let explore = |n: usize| -> Vec<SlotGroup> {
            if n == 0 {
                Vec::new()
            } else if joint_exploration {
                vec![SlotGroup::Joint(n)]
            } else {
                vec![SlotGroup::Single(AcquisitionPolicy::Pe); n]
            }
        };
        match self {
            Self::UcbAll => vec![SlotGroup::Single(AcquisitionPolicy::Ucb); batch_size],
            Self::PeAll => explore(batch_size),
            Self::DefaultInterleave if has_new_completions && batch_size > 0 => {
                let mut plan = vec![SlotGroup::Single(AcquisitionPolicy::Ucb)];
                plan.extend(explore(batch_size - 1));
                plan
            }
            Self::DefaultInterleave => explore(batch_size),
        }
    }
}

/// A chosen feature vector and the record of why it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDecision {
    pub features: Vec<f64>,
    pub decision: DecisionMetadata,
}

/// Fills a batch plan one group at a time, conditioning the ensemble on each
/// chosen point before the next group is optimized.
pub struct BatchSuggestionController<'a> {
    config: &'a UcbPeConfig,
    optimizer: &'a dyn AcquisitionOptimizer,
    domain: &'a dyn FeatureDomain,
}

impl<'a> BatchSuggestionController<'a> {
    pub fn new(
        config: &'a UcbPeConfig,
        optimizer: &'a dyn AcquisitionOptimizer,
        domain: &'a dyn FeatureDomain,
    ) -> Self {
        Self {
            config,
            optimizer,
            domain,
        }
    }

    pub fn run(
        &self,
        ensemble: &mut SurrogateEnsemble,
        plan: &[SlotGroup],
        key: RngKey,
    ) -> BanditResult<Vec<SlotDecision>> {
        let mut decisions = Vec::with_capacity(plan.iter().map(SlotGroup::size).sum());
        for (group, group_key) in plan.iter().zip(key.split_n(plan.len())) {
            let chosen = match *group {
                SlotGroup::Single(policy) => vec![self.single(ensemble, policy, group_key)?],
                SlotGroup::Joint(n) => self.joint(ensemble, n, group_key)?,
            };
            for slot in &chosen {
                ensemble.add_pending(slot.features.clone())?;
            }
            decisions.extend(chosen);
        }
        Ok(decisions)
    }

    /// Keep in-domain optimizer output; replace anything else with a random
    /// in-domain sample.
    fn in_domain(&self, candidate: Option<Vec<f64>>, key: RngKey) -> Vec<f64> {
        match candidate {
            Some(point) if self.domain.contains(&point) => point,
            Some(point) => {
                warn!("acquisition optimizer returned out-of-domain point {:?}; using a random sample", point);
                self.domain.sample(&mut key.to_rng())
            }
            None => {
                warn!("acquisition optimizer returned too few points; using a random sample");
                self.domain.sample(&mut key.to_rng())
            }
        }
    }

    fn single(
        &self,
        ensemble: &SurrogateEnsemble,
        policy: AcquisitionPolicy,
        key: RngKey,
    ) -> BanditResult<SlotDecision> {
        let (optimize_key, fallback_key) = key.split();
        let engine = AcquisitionEngine::new(ensemble, self.config);
        let scorer = |xs: &[Vec<f64>]| engine.score(policy, xs);
        let result = self.optimizer.maximize(&scorer, self.domain, 1, optimize_key);
        debug!(
            "{} optimized {:?} slot in {} evaluations: {:.6}",
            self.optimizer.name(),
            policy,
            result.evaluations,
            result.score
        );

        let features = self.in_domain(result.points.into_iter().next(), fallback_key);
        let estimate = engine.estimate(&features);
        let (acquisition, use_ucb) = match policy {
            AcquisitionPolicy::Ucb => (engine.ucb_from(&estimate), true),
            AcquisitionPolicy::Pe => (engine.pe_from(&estimate), false),
            AcquisitionPolicy::SetPe => (engine.set_pe(std::slice::from_ref(&features)), false),
        };
        if acquisition.is_nan() {
            return Err(acquisition_error!("{:?} acquisition is NaN at the chosen point", policy));
        }
        Ok(SlotDecision {
            features,
            decision: DecisionMetadata {
                mean: estimate.mean,
                stddev: estimate.stddev,
                stddev_from_all: estimate.stddev_from_all,
                acquisition,
                use_ucb,
            },
        })
    }

    fn joint(&self, ensemble: &SurrogateEnsemble, size: usize, key: RngKey) -> BanditResult<Vec<SlotDecision>> {
        let (optimize_key, fallback_key) = key.split();
        let engine = AcquisitionEngine::new(ensemble, self.config);
        let scorer = |xs: &[Vec<f64>]| engine.set_pe(xs);
        let result = self.optimizer.maximize(&scorer, self.domain, size, optimize_key);
        debug!(
            "{} optimized a joint set of {} in {} evaluations: {:.6}",
            self.optimizer.name(),
            size,
            result.evaluations,
            result.score
        );

        let mut candidates = result.points.into_iter();
        let points: Vec<Vec<f64>> = fallback_key
            .split_n(size)
            .into_iter()
            .map(|k| self.in_domain(candidates.next(), k))
            .collect();
        let acquisition = engine.set_pe(&points);
        if acquisition.is_nan() {
            return Err(acquisition_error!("set acquisition is NaN at the chosen set"));
        }

        Ok(points
            .into_iter()
            .map(|features| {
                let estimate = engine.estimate(&features);
                SlotDecision {
                    features,
                    decision: DecisionMetadata {
                        mean: estimate.mean,
                        stddev: estimate.stddev,
                        stddev_from_all: estimate.stddev_from_all,
                        acquisition,
                        use_ucb: false,
                    },
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ard::RandomRestartArd;
    use crate::converter::FeatureConverter;
    use crate::optimizer::{EvolutionaryOptimizer, OptimizedSet, SetScorer};
    use crate::padding::{PaddingPolicy, PaddingSchedule, TrainingData};
    use bandit_types::SearchSpace;
    use std::sync::Arc;

    fn config() -> UcbPeConfig {
        UcbPeConfig::default()
            .with_ucb_coefficient(10.0)
            .with_ucb_overwrite_probability(0.0)
            .with_pe_overwrite_probability(0.0)
    }

    fn domain() -> FeatureConverter {
        FeatureConverter::new(&SearchSpace::new().add_float("a", 0.0, 1.0).add_float("b", 0.0, 1.0))
            .unwrap()
    }

    fn ensemble() -> SurrogateEnsemble {
        let features = vec![vec![0.1, 0.2], vec![0.3, 0.9], vec![0.7, 0.4], vec![0.9, 0.8]];
        let labels = vec![-1.0, 0.2, 1.1, -0.3];
        let padding: Arc<dyn PaddingPolicy> = Arc::new(PaddingSchedule::default());
        SurrogateEnsemble::fit(
            TrainingData::new(features, labels, 2),
            vec![],
            2,
            &RandomRestartArd::new(2),
            padding,
            RngKey::new(5),
        )
        .unwrap()
    }

    #[test]
    fn strategy_draw_honors_extreme_probabilities() {
        let always_ucb = config().with_ucb_overwrite_probability(1.0);
        let always_pe = config().with_pe_overwrite_probability(1.0);
        for seed in 0..50 {
            let key = RngKey::new(seed);
            assert_eq!(BatchStrategy::draw(&always_ucb, key), BatchStrategy::UcbAll);
            assert_eq!(BatchStrategy::draw(&always_pe, key), BatchStrategy::PeAll);
            assert_eq!(BatchStrategy::draw(&config(), key), BatchStrategy::DefaultInterleave);
        }
    }

    #[test]
    fn strategy_draw_frequencies_follow_probabilities() {
        let config = config().with_ucb_overwrite_probability(0.5).with_pe_overwrite_probability(0.5);
        let draws: Vec<BatchStrategy> = RngKey::new(1)
            .split_n(2000)
            .into_iter()
            .map(|k| BatchStrategy::draw(&config, k))
            .collect();
        let ucb = draws.iter().filter(|s| **s == BatchStrategy::UcbAll).count() as f64 / 2000.0;
        let pe = draws.iter().filter(|s| **s == BatchStrategy::PeAll).count() as f64 / 2000.0;
        assert!((ucb - 0.5).abs() < 0.05, "ucb {ucb}");
        assert!((pe - 0.25).abs() < 0.05, "pe {pe}");
    }

    #[test]
    fn plans_cover_every_slot() {
        use AcquisitionPolicy::*;
        assert_eq!(
            BatchStrategy::DefaultInterleave.plan(3, true, false),
            vec![SlotGroup::Single(Ucb), SlotGroup::Single(Pe), SlotGroup::Single(Pe)]
        );
        assert_eq!(
            BatchStrategy::DefaultInterleave.plan(3, true, true),
            vec![SlotGroup::Single(Ucb), SlotGroup::Joint(2)]
        );
        assert_eq!(BatchStrategy::DefaultInterleave.plan(3, false, true), vec![SlotGroup::Joint(3)]);
        assert_eq!(BatchStrategy::DefaultInterleave.plan(1, true, true), vec![SlotGroup::Single(Ucb)]);
        assert_eq!(BatchStrategy::UcbAll.plan(2, false, true), vec![SlotGroup::Single(Ucb); 2]);
        assert_eq!(BatchStrategy::PeAll.plan(2, true, false), vec![SlotGroup::Single(Pe); 2]);
        for strategy in [BatchStrategy::UcbAll, BatchStrategy::PeAll, BatchStrategy::DefaultInterleave] {
            for joint in [false, true] {
                let plan = strategy.plan(5, true, joint);
                assert_eq!(plan.iter().map(SlotGroup::size).sum::<usize>(), 5);
            }
        }
    }

    #[test]
    fn interleaved_batch_records_policies_and_pending() {
        let config = config();
        let domain = domain();
        let optimizer = EvolutionaryOptimizer::default().with_max_evaluations(200);
        let controller = BatchSuggestionController::new(&config, &optimizer, &domain);
        let mut ensemble = ensemble();

        let plan = BatchStrategy::DefaultInterleave.plan(3, true, false);
        let slots = controller.run(&mut ensemble, &plan, RngKey::new(2)).unwrap();

        assert_eq!(slots.len(), 3);
        assert_eq!(ensemble.pending().len(), 3);
        let first = &slots[0].decision;
        assert!(first.use_ucb);
        assert!((first.acquisition - (first.mean + 10.0 * first.stddev_from_all)).abs() < 1e-9);
        for slot in &slots[1..] {
            assert!(!slot.decision.use_ucb);
            assert!(slot.decision.acquisition <= slot.decision.stddev_from_all + 1e-12);
            assert!(slot.decision.acquisition <= 2.0 * slot.decision.stddev);
        }
        assert!(slots.iter().all(|s| domain.contains(&s.features)));
    }

    #[test]
    fn joint_slots_share_the_set_value() {
        let config = config().with_set_acquisition(true);
        let domain = domain();
        let optimizer = EvolutionaryOptimizer::default().with_max_evaluations(300);
        let controller = BatchSuggestionController::new(&config, &optimizer, &domain);
        let mut ensemble = ensemble();

        let plan = BatchStrategy::DefaultInterleave.plan(4, true, true);
        let slots = controller.run(&mut ensemble, &plan, RngKey::new(6)).unwrap();
        assert_eq!(slots.len(), 4);

        let set = &slots[1..];
        let value = set[0].decision.acquisition;
        assert!(set.iter().all(|s| s.decision.acquisition == value && !s.decision.use_ucb));
        let mean_var =
            set.iter().map(|s| s.decision.stddev_from_all.powi(2)).sum::<f64>() / set.len() as f64;
        assert!((value / set.len() as f64).exp() <= mean_var + 1e-12);
    }

    #[derive(Debug)]
    struct OutOfBounds;

    impl AcquisitionOptimizer for OutOfBounds {
        fn maximize(
            &self,
            _scorer: &SetScorer<'_>,
            domain: &dyn FeatureDomain,
            set_size: usize,
            _key: RngKey,
        ) -> OptimizedSet {
            OptimizedSet {
                points: vec![vec![2.0; domain.dimension()]; set_size],
                score: 0.0,
                evaluations: 1,
            }
        }

        fn name(&self) -> &str {
            "out_of_bounds"
        }
    }

    #[test]
    fn out_of_domain_output_falls_back_to_random_sample() {
        let config = config();
        let domain = domain();
        let controller = BatchSuggestionController::new(&config, &OutOfBounds, &domain);
        let mut ensemble = ensemble();

        for joint in [false, true] {
            let plan = BatchStrategy::PeAll.plan(2, false, joint);
            let slots = controller.run(&mut ensemble, &plan, RngKey::new(1)).unwrap();
            assert_eq!(slots.len(), 2);
            for slot in &slots {
                assert!(domain.contains(&slot.features));
                assert!(!slot.decision.acquisition.is_nan());
            }
        }
    }

    #[test]
    fn same_key_same_batch() {
        let config = config();
        let domain = domain();
        let optimizer = EvolutionaryOptimizer::default().with_max_evaluations(150);
        let controller = BatchSuggestionController::new(&config, &optimizer, &domain);
        let plan = BatchStrategy::DefaultInterleave.plan(3, true, false);

        let a = controller.run(&mut ensemble(), &plan, RngKey::new(12)).unwrap();
        let b = controller.run(&mut ensemble(), &plan, RngKey::new(12)).unwrap();
        assert_eq!(a, b);
    }
}
