use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rng::{standard_normal, truncated_normal};

/// Rejected trait definitions and trait vectors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraitSpecError {
    #[error("trait name must not be empty")]
    EmptyName,
    #[error("trait `{name}` is defined more than once")]
    DuplicateName { name: String },
    #[error("trait `{name}` bounds must be finite")]
    NonFiniteBounds { name: String },
    #[error("trait `{name}` lower bound ({min}) exceeds upper bound ({max})")]
    InvertedBounds { name: String, min: f64, max: f64 },
    #[error("trait `{name}` mutation_std must be finite and non-negative, got {value}")]
    InvalidMutationStd { name: String, value: f64 },
    #[error("trait `{name}` cost_coefficient must be finite and non-negative, got {value}")]
    InvalidCostCoefficient { name: String, value: f64 },
    #[error("trait vector has {actual} values but the trait set defines {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("trait `{name}` value must be finite")]
    NonFiniteValue { name: String },
}

/// Definition of one bounded gene: its legal range, mutation volatility and food cost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitSpec {
    name: String,
    min: f64,
    max: f64,
    mutation_std: f64,
    cost_coefficient: f64,
}

impl TraitSpec {
    pub fn new(
        name: impl Into<String>,
        min: f64,
        max: f64,
        mutation_std: f64,
        cost_coefficient: f64,
    ) -> Result<Self, TraitSpecError> {
        let spec = Self {
            name: name.into(),
            min,
            max,
            mutation_std,
            cost_coefficient,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Re-check the invariants; deserialized specs bypass `new`.
    pub fn validate(&self) -> Result<(), TraitSpecError> {
        if self.name.trim().is_empty() {
            return Err(TraitSpecError::EmptyName);
        }
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(TraitSpecError::NonFiniteBounds {
                name: self.name.clone(),
            });
        }
        if self.min > self.max {
            return Err(TraitSpecError::InvertedBounds {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        if !(self.mutation_std.is_finite() && self.mutation_std >= 0.0) {
            return Err(TraitSpecError::InvalidMutationStd {
                name: self.name.clone(),
                value: self.mutation_std,
            });
        }
        if !(self.cost_coefficient.is_finite() && self.cost_coefficient >= 0.0) {
            return Err(TraitSpecError::InvalidCostCoefficient {
                name: self.name.clone(),
                value: self.cost_coefficient,
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mutation_std(&self) -> f64 {
        self.mutation_std
    }

    pub fn cost_coefficient(&self) -> f64 {
        self.cost_coefficient
    }

    /// Halves are taken before combining so `[-f64::MAX, f64::MAX]` stays finite.
    pub fn midpoint(&self) -> f64 {
        self.min * 0.5 + self.max * 0.5
    }

    pub fn half_range(&self) -> f64 {
        self.max * 0.5 - self.min * 0.5
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Shape of the generation-0 trait distribution.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialDistribution {
    #[default]
    Uniform,
    Normal,
}

/// Draw a generation-0 value for `spec`.
///
/// Values are centred on the trait midpoint. `variability` in `[0, 1]` scales
/// the spread: the half-width of the uniform window, or the standard deviation
/// of the (truncated) normal, as a fraction of the trait's half-range.
pub fn sample_initial<R: Rng + ?Sized>(
    spec: &TraitSpec,
    distribution: InitialDistribution,
    variability: f64,
    rng: &mut R,
) -> f64 {
    let center = spec.midpoint();
    let spread = spec.half_range() * variability.clamp(0.0, 1.0);
    if spread <= 0.0 {
        return center;
    }
    match distribution {
        InitialDistribution::Uniform => {
            let offset = 2.0 * rng.random::<f64>() - 1.0;
            spec.clamp(center + spread * offset)
        }
        InitialDistribution::Normal => truncated_normal(rng, center, spread, spec.min, spec.max),
    }
}

/// Add Gaussian noise with standard deviation `spec.mutation_std * scale`, then clamp.
///
/// Clamping is the boundary policy: a mutated value never leaves the trait's
/// range, which piles density up at the bounds.
pub fn mutate<R: Rng + ?Sized>(value: f64, spec: &TraitSpec, scale: f64, rng: &mut R) -> f64 {
    let std = spec.mutation_std * scale;
    if std <= 0.0 {
        return spec.clamp(value);
    }
    spec.clamp(value + std * standard_normal(rng))
}

/// Ordered, immutable set of trait definitions shared by every organism of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitSet {
    specs: Vec<TraitSpec>,
}

impl TraitSet {
    pub fn new(specs: Vec<TraitSpec>) -> Result<Self, TraitSpecError> {
        let set = Self { specs };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), TraitSpecError> {
        for (i, spec) in self.specs.iter().enumerate() {
            spec.validate()?;
            if self.specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(TraitSpecError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn specs(&self) -> &[TraitSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraitSpec> {
        self.specs.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }
}

/// Trait values in `TraitSet` order. Every value lies within its spec's bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitVector {
    values: Vec<f64>,
}

impl TraitVector {
    /// Build a vector from raw values, clamping each into its trait's range.
    pub fn new(set: &TraitSet, values: Vec<f64>) -> Result<Self, TraitSpecError> {
        if values.len() != set.len() {
            return Err(TraitSpecError::LengthMismatch {
                expected: set.len(),
                actual: values.len(),
            });
        }
        let mut values = values;
        for (v, spec) in values.iter_mut().zip(set.specs()) {
            if !v.is_finite() {
                return Err(TraitSpecError::NonFiniteValue {
                    name: spec.name.clone(),
                });
            }
            *v = spec.clamp(*v);
        }
        Ok(Self { values })
    }

    pub fn random<R: Rng + ?Sized>(
        set: &TraitSet,
        distribution: InitialDistribution,
        variability: f64,
        rng: &mut R,
    ) -> Self {
        let values = set
            .specs()
            .iter()
            .map(|spec| sample_initial(spec, distribution, variability, rng))
            .collect();
        Self { values }
    }

    /// Child copy of `self` where each trait mutates independently with probability `chance`.
    pub fn mutated<R: Rng + ?Sized>(
        &self,
        set: &TraitSet,
        chance: f64,
        scale: f64,
        rng: &mut R,
    ) -> Self {
        let values = self
            .values
            .iter()
            .zip(set.specs())
            .map(|(&v, spec)| {
                if rng.random::<f64>() < chance {
                    mutate(v, spec, scale, rng)
                } else {
                    v
                }
            })
            .collect();
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn value_of(&self, set: &TraitSet, name: &str) -> Option<f64> {
        set.index_of(name).and_then(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn unit_spec() -> TraitSpec {
        TraitSpec::new("size", 0.0, 10.0, 1.0, 1.0).expect("valid spec")
    }

    #[test]
    fn new_rejects_inverted_bounds() {
        assert!(matches!(
            TraitSpec::new("size", 5.0, 1.0, 1.0, 1.0),
            Err(TraitSpecError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn new_rejects_negative_coefficients() {
        assert!(matches!(
            TraitSpec::new("size", 0.0, 1.0, -0.1, 1.0),
            Err(TraitSpecError::InvalidMutationStd { .. })
        ));
        assert!(matches!(
            TraitSpec::new("size", 0.0, 1.0, 0.1, -1.0),
            Err(TraitSpecError::InvalidCostCoefficient { .. })
        ));
    }

    #[test]
    fn new_accepts_degenerate_range() {
        let spec = TraitSpec::new("fixed", 3.0, 3.0, 0.0, 0.0).expect("min == max is legal");
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        assert_eq!(mutate(3.0, &spec, 1.0, &mut rng), 3.0);
    }

    #[test]
    fn trait_set_rejects_duplicate_names() {
        let result = TraitSet::new(vec![unit_spec(), unit_spec()]);
        assert!(matches!(result, Err(TraitSpecError::DuplicateName { .. })));
    }

    #[test]
    fn trait_set_validate_catches_deserialized_garbage() {
        let json = r#"[{"name":"size","min":4.0,"max":1.0,"mutation_std":1.0,"cost_coefficient":1.0}]"#;
        let set: TraitSet = serde_json::from_str(json).expect("shape parses");
        assert!(matches!(
            set.validate(),
            Err(TraitSpecError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn trait_vector_clamps_on_creation() {
        let set = TraitSet::new(vec![unit_spec()]).unwrap();
        let v = TraitVector::new(&set, vec![42.0]).unwrap();
        assert_eq!(v.values(), &[10.0]);
        assert!(matches!(
            TraitVector::new(&set, vec![1.0, 2.0]),
            Err(TraitSpecError::LengthMismatch {
                expected: 1,
                actual: 2
            })
        ));
        assert!(matches!(
            TraitVector::new(&set, vec![f64::NAN]),
            Err(TraitSpecError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn zero_variability_seeds_at_midpoint() {
        let spec = unit_spec();
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        for dist in [InitialDistribution::Uniform, InitialDistribution::Normal] {
            assert_eq!(sample_initial(&spec, dist, 0.0, &mut rng), 5.0);
        }
    }

    #[test]
    fn widest_finite_range_samples_finite_values() {
        let spec = TraitSpec::new("wide", -f64::MAX, f64::MAX, 1.0, 1.0).unwrap();
        assert_eq!(spec.midpoint(), 0.0);
        assert_eq!(spec.half_range(), f64::MAX);
        let mut rng = ChaCha12Rng::seed_from_u64(13);
        for dist in [InitialDistribution::Uniform, InitialDistribution::Normal] {
            for _ in 0..200 {
                let v = sample_initial(&spec, dist, 1.0, &mut rng);
                assert!(v.is_finite(), "{dist:?} produced {v}");
                assert!(mutate(v, &spec, 1.0, &mut rng).is_finite());
            }
        }
    }

    #[test]
    fn zero_chance_copies_parent_exactly() {
        let set = TraitSet::new(vec![unit_spec()]).unwrap();
        let parent = TraitVector::new(&set, vec![3.5]).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(parent.mutated(&set, 0.0, 1.0, &mut rng), parent);
        }
    }

    #[test]
    fn certain_chance_perturbs_values() {
        let set = TraitSet::new(vec![unit_spec()]).unwrap();
        let parent = TraitVector::new(&set, vec![5.0]).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let changed = (0..20)
            .map(|_| parent.mutated(&set, 1.0, 1.0, &mut rng))
            .filter(|child| child != &parent)
            .count();
        assert!(changed > 0);
    }

    proptest! {
        #[test]
        fn proptest_mutation_respects_bounds(
            min in -100.0f64..100.0,
            width in 0.0f64..50.0,
            std in 0.0f64..100.0,
            start in 0.0f64..1.0,
            seed in any::<u64>(),
        ) {
            let spec = TraitSpec::new("t", min, min + width, std, 1.0).unwrap();
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let mut value = min + width * start;
            for _ in 0..50 {
                value = mutate(value, &spec, 1.0, &mut rng);
                prop_assert!(value >= spec.min() && value <= spec.max());
            }
        }

        #[test]
        fn proptest_initial_samples_respect_bounds(
            min in -100.0f64..100.0,
            width in 0.0f64..50.0,
            variability in 0.0f64..=1.0,
            normal in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let spec = TraitSpec::new("t", min, min + width, 1.0, 1.0).unwrap();
            let dist = if normal { InitialDistribution::Normal } else { InitialDistribution::Uniform };
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let v = sample_initial(&spec, dist, variability, &mut rng);
            prop_assert!(v >= spec.min() && v <= spec.max());
        }
    }
}
