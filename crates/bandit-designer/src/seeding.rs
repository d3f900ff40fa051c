//! Seed generators used before the surrogate model takes over.

use rand::Rng;
use serde_json::Value;

use bandit_types::{ParameterKind, ParameterMap, ParameterValue, SearchSpace};

use crate::rng::RngKey;

/// Common trait for all seed strategies.
pub trait SeedStrategy: Send + Sync {
    /// Generate the next `count` parameter assignments.
    fn suggest(&mut self, count: usize, key: RngKey) -> Vec<ParameterMap>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Value of `kind` at unit coordinate `t`.
fn value_at(kind: &ParameterKind, t: f64) -> ParameterValue {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    match kind {
        ParameterKind::FloatRange { low, high } => {
            ParameterValue::Float((low + t * (high - low)).clamp(*low, *high))
        }
        ParameterKind::IntRange { low, high } => {
            let span = (*high as i128 - *low as i128 + 1) as f64;
            let offset = ((t * span).floor() as i128).min(*high as i128 - *low as i128);
            ParameterValue::Int((*low as i128 + offset) as i64)
        }
        ParameterKind::LogUniform { low, high } => {
            let (log_low, log_high) = (low.ln(), high.ln());
            ParameterValue::Float((log_low + t * (log_high - log_low)).exp().clamp(*low, *high))
        }
        ParameterKind::Choice { values } => {
            let idx = ((t * values.len() as f64).floor() as usize).min(values.len().saturating_sub(1));
            ParameterValue::Json(values.get(idx).cloned().unwrap_or(Value::Null))
        }
    }
}

fn point_at(space: &SearchSpace, coordinates: impl IntoIterator<Item = f64>) -> ParameterMap {
    space
        .parameters
        .iter()
        .zip(coordinates)
        .map(|(param, t)| (param.name.clone(), value_at(&param.kind, t)))
        .collect()
}

// ---- Quasi-random ----

const PRIMES: [u64; 32] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131,
];

fn nth_prime(n: usize) -> u64 {
    if let Some(p) = PRIMES.get(n) {
        return *p;
    }
    let mut count = PRIMES.len();
    let mut candidate = PRIMES[PRIMES.len() - 1] + 2;
    loop {
        if (2..).take_while(|d| d * d <= candidate).all(|d| candidate % d != 0) {
            if count == n {
                return candidate;
            }
            count += 1;
        }
        candidate += 2;
    }
}

/// Van der Corput radical inverse of `index` in `base`.
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv_base = 1.0 / base as f64;
    let mut factor = inv_base;
    let mut result = 0.0;
    while index > 0 {
        result += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    result
}

/// Center of the space first, then a randomly shifted Halton sequence.
#[derive(Debug, Clone)]
pub struct QuasiRandomSeeder {
    space: SearchSpace,
    bases: Vec<u64>,
    shift: Vec<f64>,
    cursor: u64,
}

impl QuasiRandomSeeder {
    pub fn new(space: SearchSpace, key: RngKey) -> Self {
        let mut rng = key.to_rng();
        let dims = space.parameters.len();
        Self {
            bases: (0..dims).map(nth_prime).collect(),
            shift: (0..dims).map(|_| rng.random::<f64>()).collect(),
            space,
            cursor: 0,
        }
    }

    fn next_point(&mut self) -> ParameterMap {
        let index = self.cursor;
        self.cursor += 1;
        if index == 0 {
            return point_at(&self.space, std::iter::repeat(0.5));
        }
        let coordinates: Vec<f64> = self
            .bases
            .iter()
            .zip(&self.shift)
            .map(|(base, shift)| (radical_inverse(index, *base) + shift).fract())
            .collect();
        point_at(&self.space, coordinates)
    }
}

impl SeedStrategy for QuasiRandomSeeder {
    fn suggest(&mut self, count: usize, _key: RngKey) -> Vec<ParameterMap> {
        (0..count).map(|_| self.next_point()).collect()
    }

    fn name(&self) -> &str {
        "quasi_random"
    }
}

// ---- Random ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSeeder {
    space: SearchSpace,
}

impl RandomSeeder {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }
}

impl SeedStrategy for RandomSeeder {
    fn suggest(&mut self, count: usize, key: RngKey) -> Vec<ParameterMap> {
        let mut rng = key.to_rng();
        let dims = self.space.parameters.len();
        (0..count)
            .map(|_| {
                let coordinates: Vec<f64> = (0..dims).map(|_| rng.random::<f64>()).collect();
                point_at(&self.space, coordinates)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Grid ----

/// Cartesian grid over the search space, restarting from the first point
/// once exhausted.
#[derive(Debug, Clone)]
pub struct GridSeeder {
    cursor: usize,
    combos: Vec<ParameterMap>,
}

impl GridSeeder {
    /// `float_steps` is the number of points per continuous dimension.
    pub fn new(space: &SearchSpace, float_steps: usize) -> Self {
        Self {
            cursor: 0,
            combos: Self::build_grid(space, float_steps),
        }
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<ParameterMap> {
        let steps = float_steps.max(2);
        let spaced = |i: usize| i as f64 / (steps - 1) as f64;

        let mut result: Vec<ParameterMap> = vec![ParameterMap::new()];
        for param in &space.parameters {
            let axis: Vec<ParameterValue> = match &param.kind {
                ParameterKind::IntRange { low, high } if (high - low) < steps as i64 => {
                    (*low..=*high).map(ParameterValue::Int).collect()
                }
                ParameterKind::Choice { values } => {
                    values.iter().cloned().map(ParameterValue::Json).collect()
                }
                kind => {
                    let mut axis: Vec<ParameterValue> =
                        (0..steps).map(|i| value_at(kind, spaced(i))).collect();
                    axis.dedup();
                    axis
                }
            };

            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for value in &axis {
                    let mut combo = existing.clone();
                    combo.insert(param.name.clone(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }
}

impl SeedStrategy for GridSeeder {
    fn suggest(&mut self, count: usize, _key: RngKey) -> Vec<ParameterMap> {
        if self.combos.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| {
                let combo = self.combos[self.cursor % self.combos.len()].clone();
                self.cursor += 1;
                combo
            })
            .collect()
    }

    fn name(&self) -> &str {
        "grid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("layers", 1, 8)
            .add_float("dropout", 0.0, 0.5)
            .add_log_uniform("lr", 1e-5, 1e-1)
            .add_choice(
                "optimizer",
                vec![serde_json::json!("adam"), serde_json::json!("sgd"), serde_json::json!("rmsprop")],
            )
    }

    #[test]
    fn quasi_random_starts_at_center() {
        let space = SearchSpace::new().add_float("x", -1.0, 3.0).add_int("n", 0, 10);
        let mut seeder = QuasiRandomSeeder::new(space, RngKey::new(0));
        let first = seeder.suggest(1, RngKey::new(0)).remove(0);
        assert_eq!(first["x"], ParameterValue::Float(1.0));
        assert_eq!(first["n"], ParameterValue::Int(5));
    }

    #[test]
    fn quasi_random_continues_across_calls() {
        let space = sample_space();
        let mut split = QuasiRandomSeeder::new(space.clone(), RngKey::new(4));
        let mut whole = QuasiRandomSeeder::new(space, RngKey::new(4));
        let mut a = split.suggest(3, RngKey::new(0));
        a.extend(split.suggest(4, RngKey::new(1)));
        assert_eq!(a, whole.suggest(7, RngKey::new(2)));
        assert_ne!(a[1], a[2]);
    }

    #[test]
    fn every_seeder_respects_bounds() {
        let space = sample_space();
        let mut seeders: Vec<Box<dyn SeedStrategy>> = vec![
            Box::new(QuasiRandomSeeder::new(space.clone(), RngKey::new(1))),
            Box::new(RandomSeeder::new(space.clone())),
            Box::new(GridSeeder::new(&space, 3)),
        ];
        for seeder in seeders.iter_mut() {
            let points = seeder.suggest(64, RngKey::new(9));
            assert_eq!(points.len(), 64, "{}", seeder.name());
            for point in &points {
                space.assert_contains(point).unwrap();
            }
        }
    }

    #[test]
    fn random_seeder_is_keyed() {
        let mut seeder = RandomSeeder::new(sample_space());
        let a = seeder.suggest(5, RngKey::new(3));
        let b = seeder.suggest(5, RngKey::new(3));
        let c = seeder.suggest(5, RngKey::new(4));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn grid_has_expected_size_and_cycles() {
        let space = SearchSpace::new().add_int("a", 1, 3).add_float("b", 0.0, 1.0);
        let mut grid = GridSeeder::new(&space, 4);
        assert_eq!(grid.len(), 12);

        let first = grid.suggest(12, RngKey::new(0));
        let again = grid.suggest(2, RngKey::new(0));
        assert_eq!(again, first[..2].to_vec());
    }

    #[test]
    fn halton_coordinates_are_low_discrepancy() {
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(nth_prime(0), 2);
        assert_eq!(nth_prime(32), 137);
    }
}
