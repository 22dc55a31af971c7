use rand::Rng;

use crate::config::SimConfig;
use crate::genome::{TraitSet, TraitVector};

/// Food an organism with `traits` consumes per generation: Σ value × cost coefficient.
///
/// Cost coefficients are non-negative, so the result never decreases when any
/// single trait value increases.
pub fn food_requirement(traits: &TraitVector, set: &TraitSet) -> f64 {
    traits
        .values()
        .iter()
        .zip(set.specs())
        .map(|(v, spec)| v * spec.cost_coefficient())
        .sum()
}

/// Produce `config.fertility` asexual offspring trait vectors from `parent`.
pub fn reproduce<R: Rng + ?Sized>(
    parent: &Organism,
    set: &TraitSet,
    config: &SimConfig,
    rng: &mut R,
) -> Vec<TraitVector> {
    offspring(parent, set, config, config.fertility, rng)
}

/// Produce `count` mutated copies of `parent`, drawing from `rng` only for those.
pub fn offspring<R: Rng + ?Sized>(
    parent: &Organism,
    set: &TraitSet,
    config: &SimConfig,
    count: usize,
    rng: &mut R,
) -> Vec<TraitVector> {
    (0..count)
        .map(|_| child(parent, set, config, rng))
        .collect()
}

/// One mutated copy of `parent`.
pub(crate) fn child<R: Rng + ?Sized>(
    parent: &Organism,
    set: &TraitSet,
    config: &SimConfig,
    rng: &mut R,
) -> TraitVector {
    parent
        .traits
        .mutated(set, config.mutation_chance, config.mutation_scale, rng)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Organism {
    // Fields are private; food_requirement is derived from traits and must stay in sync.
    traits: TraitVector,
    food_requirement: f64,
    fitness: Option<f64>,
}

impl Organism {
    pub fn new(traits: TraitVector, set: &TraitSet) -> Self {
        let food_requirement = food_requirement(&traits, set);
        Self {
            traits,
            food_requirement,
            fitness: None,
        }
    }

    pub fn traits(&self) -> &TraitVector {
        &self.traits
    }

    pub fn food_requirement(&self) -> f64 {
        self.food_requirement
    }

    /// Fitness for the current generation; `None` until evaluated.
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    pub(crate) fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }
}
