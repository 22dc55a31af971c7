use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ecosystem::Environment;
use crate::genome::{TraitSet, TraitVector};

/// Pluggable fitness evaluation. Lower scores are better.
///
/// Implementations must be pure and total over in-bounds trait vectors: the
/// engine may call them from several threads and in any order.
pub trait FitnessFunction: Send + Sync {
    fn evaluate(&self, traits: &TraitVector, env: &Environment) -> f64;
}

impl<T: FitnessFunction + ?Sized> FitnessFunction for Box<T> {
    fn evaluate(&self, traits: &TraitVector, env: &Environment) -> f64 {
        (**self).evaluate(traits, env)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitnessError {
    #[error("fitness function references unknown trait `{0}`")]
    UnknownTrait(String),
    #[error("target weight for trait `{name}` must be finite and non-negative")]
    InvalidWeight { name: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("organism {index} evaluated to non-finite fitness {value}")]
    NonFinite { index: usize, value: f64 },
}

/// Reject NaN and infinite scores so they never reach ranking.
pub fn check_score(index: usize, value: f64) -> Result<f64, EvaluationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::NonFinite { index, value })
    }
}

fn resolve(set: &TraitSet, name: &str) -> Result<usize, FitnessError> {
    set.index_of(name)
        .ok_or_else(|| FitnessError::UnknownTrait(name.to_string()))
}

/// Fitness equals one trait's value.
#[derive(Clone, Debug)]
pub struct TraitValue {
    index: usize,
}

impl TraitValue {
    pub fn new(set: &TraitSet, name: &str) -> Result<Self, FitnessError> {
        Ok(Self {
            index: resolve(set, name)?,
        })
    }
}

impl FitnessFunction for TraitValue {
    fn evaluate(&self, traits: &TraitVector, _env: &Environment) -> f64 {
        traits.get(self.index).unwrap_or(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraitTarget {
    pub trait_name: String,
    pub target: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Weighted squared distance from per-trait target values.
#[derive(Clone, Debug)]
pub struct TargetDistance {
    targets: Vec<(usize, f64, f64)>,
}

impl TargetDistance {
    pub fn new(set: &TraitSet, targets: &[TraitTarget]) -> Result<Self, FitnessError> {
        let targets = targets
            .iter()
            .map(|t| {
                if !(t.weight.is_finite() && t.weight >= 0.0) {
                    return Err(FitnessError::InvalidWeight {
                        name: t.trait_name.clone(),
                    });
                }
                Ok((resolve(set, &t.trait_name)?, t.target, t.weight))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { targets })
    }
}

impl FitnessFunction for TargetDistance {
    fn evaluate(&self, traits: &TraitVector, _env: &Environment) -> f64 {
        self.targets
            .iter()
            .map(|&(idx, target, weight)| {
                let v = traits.get(idx).unwrap_or(target);
                weight * (v - target).powi(2)
            })
            .sum()
    }
}

/// Temperature-band and hazard-resilience loss.
///
/// An organism whose tolerated band `[ideal - range, ideal + range]` contains
/// the current temperature gets a base score of 0.75, otherwise 0.25. Resilience
/// above the hazard rate adds up to 0.25. The loss is one minus that score, so
/// it lies in `[0, 0.75]`.
#[derive(Clone, Debug)]
pub struct ThermalTolerance {
    ideal: usize,
    range: usize,
    resilience: usize,
}

impl ThermalTolerance {
    pub const IDEAL_TRAIT: &'static str = "temperature_ideal";
    pub const RANGE_TRAIT: &'static str = "temperature_range";
    pub const RESILIENCE_TRAIT: &'static str = "resilience";

    pub fn new(set: &TraitSet) -> Result<Self, FitnessError> {
        Ok(Self {
            ideal: resolve(set, Self::IDEAL_TRAIT)?,
            range: resolve(set, Self::RANGE_TRAIT)?,
            resilience: resolve(set, Self::RESILIENCE_TRAIT)?,
        })
    }
}

impl FitnessFunction for ThermalTolerance {
    fn evaluate(&self, traits: &TraitVector, env: &Environment) -> f64 {
        let ideal = traits.get(self.ideal).unwrap_or(0.0);
        let range = traits.get(self.range).unwrap_or(0.0);
        let resilience = traits.get(self.resilience).unwrap_or(0.0);
        let tolerated = (ideal - range..=ideal + range).contains(&env.temperature);
        let base = if tolerated { 0.75 } else { 0.25 };
        let bonus = (resilience - env.hazard_rate).clamp(0.0, 0.25);
        1.0 - (base + bonus)
    }
}

/// Adapter turning a closure into a [`FitnessFunction`].
pub struct FnFitness<F>(pub F);

impl<F> FitnessFunction for FnFitness<F>
where
    F: Fn(&TraitVector, &Environment) -> f64 + Send + Sync,
{
    fn evaluate(&self, traits: &TraitVector, env: &Environment) -> f64 {
        (self.0)(traits, env)
    }
}

/// Serializable selection of a built-in fitness function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitnessSpec {
    TraitValue { trait_name: String },
    TargetDistance { targets: Vec<TraitTarget> },
    ThermalTolerance,
}

impl FitnessSpec {
    pub fn build(&self, set: &TraitSet) -> Result<Box<dyn FitnessFunction>, FitnessError> {
        Ok(match self {
            FitnessSpec::TraitValue { trait_name } => Box::new(TraitValue::new(set, trait_name)?),
            FitnessSpec::TargetDistance { targets } => {
                Box::new(TargetDistance::new(set, targets)?)
            }
            FitnessSpec::ThermalTolerance => Box::new(ThermalTolerance::new(set)?),
        })
    }
}
