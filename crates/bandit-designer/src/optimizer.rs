//! Acquisition optimizer collaborator: a best-effort black-box maximizer over
//! the feature domain with a fixed evaluation budget.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rng::RngKey;

/// The space an acquisition optimizer searches.
pub trait FeatureDomain: Sync {
    fn dimension(&self) -> usize;

    /// A uniformly drawn in-domain point.
    fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<f64>;

    /// Map an arbitrary vector onto the nearest in-domain point.
    fn project(&self, features: &mut [f64]);

    fn contains(&self, features: &[f64]) -> bool;
}

/// Scores a candidate set of points. Higher is better.
pub type SetScorer<'a> = dyn Fn(&[Vec<f64>]) -> f64 + Sync + 'a;

/// Best candidate set found by an optimizer run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedSet {
    pub points: Vec<Vec<f64>>,
    pub score: f64,
    pub evaluations: usize,
}

pub trait AcquisitionOptimizer: Send + Sync + std::fmt::Debug {
    /// Maximize `scorer` over sets of `set_size` points from `domain`.
    fn maximize(
        &self,
        scorer: &SetScorer<'_>,
        domain: &dyn FeatureDomain,
        set_size: usize,
        key: RngKey,
    ) -> OptimizedSet;

    /// Human-readable optimizer name.
    fn name(&self) -> &str;
}

/// Population-based evolutionary maximizer.
///
/// Each generation every member spawns one child pulled toward the current
/// best member and perturbed with Gaussian noise; the child replaces its
/// parent when it scores higher. The mutation scale decays geometrically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionaryOptimizer {
    pub max_evaluations: usize,
    pub population_size: usize,
    pub initial_step: f64,
    pub step_decay: f64,
    pub min_step: f64,
    /// Upper bound of the random pull toward the best member.
    pub attraction: f64,
}

impl Default for EvolutionaryOptimizer {
    fn default() -> Self {
        Self {
            max_evaluations: 2000,
            population_size: 40,
            initial_step: 0.2,
            step_decay: 0.9,
            min_step: 1e-3,
            attraction: 0.5,
        }
    }
}

impl EvolutionaryOptimizer {
    pub fn with_max_evaluations(mut self, n: usize) -> Self {
        self.max_evaluations = n.max(1);
        self
    }

    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n.max(1);
        self
    }

    fn score_all(scorer: &SetScorer<'_>, population: &[Vec<Vec<f64>>]) -> Vec<f64> {
        population
            .par_iter()
            .map(|candidate| {
                let score = scorer(candidate);
                if score.is_nan() {
                    f64::NEG_INFINITY
                } else {
                    score
                }
            })
            .collect()
    }

    fn best_index(scores: &[f64]) -> usize {
        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        best
    }
}

impl AcquisitionOptimizer for EvolutionaryOptimizer {
    fn maximize(
        &self,
        scorer: &SetScorer<'_>,
        domain: &dyn FeatureDomain,
        set_size: usize,
        key: RngKey,
    ) -> OptimizedSet {
        if set_size == 0 {
            return OptimizedSet {
                points: Vec::new(),
                score: f64::NEG_INFINITY,
                evaluations: 0,
            };
        }

        let mut rng = key.to_rng();
        let budget = self.max_evaluations.max(1);
        let pop_size = self.population_size.max(1).min(budget);

        let mut population: Vec<Vec<Vec<f64>>> = (0..pop_size)
            .map(|_| (0..set_size).map(|_| domain.sample(&mut rng)).collect())
            .collect();
        let mut scores = Self::score_all(scorer, &population);
        let mut evaluations = pop_size;
        let mut step = self.initial_step;

        while evaluations < budget {
            let leader = population[Self::best_index(&scores)].clone();
            let n = pop_size.min(budget - evaluations);

            let children: Vec<Vec<Vec<f64>>> = population[..n]
                .iter()
                .map(|parent| {
                    let pull = self.attraction * rng.random::<f64>();
                    parent
                        .iter()
                        .zip(&leader)
                        .map(|(x, best)| {
                            let mut child: Vec<f64> = x
                                .iter()
                                .zip(best)
                                .map(|(xi, bi)| {
                                    let noise: f64 = rng.sample(StandardNormal);
                                    xi + pull * (bi - xi) + step * noise
                                })
                                .collect();
                            domain.project(&mut child);
                            child
                        })
                        .collect()
                })
                .collect();

            let child_scores = Self::score_all(scorer, &children);
            evaluations += n;
            for (i, (child, score)) in children.into_iter().zip(child_scores).enumerate() {
                if score > scores[i] {
                    population[i] = child;
                    scores[i] = score;
                }
            }
            step = (step * self.step_decay).max(self.min_step);
        }

        let best = Self::best_index(&scores);
        OptimizedSet {
            points: population.swap_remove(best),
            score: scores[best],
            evaluations,
        }
    }

    fn name(&self) -> &str {
        "evolutionary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::FeatureConverter;
    use bandit_types::SearchSpace;

    fn unit_square() -> FeatureConverter {
        FeatureConverter::new(&SearchSpace::new().add_float("a", 0.0, 1.0).add_float("b", 0.0, 1.0))
            .unwrap()
    }

    #[test]
    fn finds_interior_maximum() {
        let domain = unit_square();
        let scorer = |set: &[Vec<f64>]| -((set[0][0] - 0.3).powi(2) + (set[0][1] - 0.8).powi(2));
        let result = EvolutionaryOptimizer::default()
            .with_max_evaluations(800)
            .maximize(&scorer, &domain, 1, RngKey::new(1));

        assert_eq!(result.points.len(), 1);
        assert_eq!(result.evaluations, 800);
        assert!((result.points[0][0] - 0.3).abs() < 0.1, "{:?}", result.points);
        assert!((result.points[0][1] - 0.8).abs() < 0.1, "{:?}", result.points);
        assert!(domain.contains(&result.points[0]));
    }

    #[test]
    fn optimizes_sets_jointly() {
        let domain = unit_square();
        // reward spreading two points apart
        let scorer = |set: &[Vec<f64>]| {
            let dx = set[0][0] - set[1][0];
            let dy = set[0][1] - set[1][1];
            dx * dx + dy * dy
        };
        let result = EvolutionaryOptimizer::default()
            .with_max_evaluations(600)
            .maximize(&scorer, &domain, 2, RngKey::new(3));
        assert_eq!(result.points.len(), 2);
        assert!(result.score > 1.0, "score {}", result.score);
        assert!(result.points.iter().all(|p| domain.contains(p)));
    }

    #[test]
    fn never_worse_than_best_initial_sample() {
        let domain = unit_square();
        let scorer = |set: &[Vec<f64>]| set[0][0] + set[0][1];
        let tiny = EvolutionaryOptimizer::default()
            .with_population_size(10)
            .with_max_evaluations(10);
        let longer = tiny.clone().with_max_evaluations(200);

        let initial = tiny.maximize(&scorer, &domain, 1, RngKey::new(9));
        let improved = longer.maximize(&scorer, &domain, 1, RngKey::new(9));
        assert_eq!(initial.evaluations, 10);
        assert!(improved.score >= initial.score);
    }

    #[test]
    fn same_key_same_result() {
        let domain = unit_square();
        let scorer = |set: &[Vec<f64>]| (set[0][0] * 7.0).sin() * (set[0][1] * 3.0).cos();
        let optimizer = EvolutionaryOptimizer::default().with_max_evaluations(300);
        let a = optimizer.maximize(&scorer, &domain, 1, RngKey::new(21));
        let b = optimizer.maximize(&scorer, &domain, 1, RngKey::new(21));
        assert_eq!(a, b);
    }

    #[test]
    fn non_finite_scores_are_never_selected_over_finite_ones() {
        let domain = unit_square();
        let scorer = |set: &[Vec<f64>]| if set[0][0] < 0.5 { f64::NAN } else { set[0][0] };
        let result = EvolutionaryOptimizer::default()
            .with_max_evaluations(200)
            .maximize(&scorer, &domain, 1, RngKey::new(4));
        assert!(result.points[0][0] >= 0.5);
        assert!(result.score.is_finite());
    }
}
