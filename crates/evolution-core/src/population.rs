use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ExcessOffspringPolicy, SimConfig, SimConfigError};
use crate::ecosystem::{admit, Admission, Environment};
use crate::fitness::{check_score, EvaluationError, FitnessFunction};
use crate::genome::{TraitSet, TraitSpecError, TraitVector};
use crate::metrics::{OrganismSnapshot, SnapshotFrame};
use crate::organism::{child, offspring, Organism};

/// Lifecycle position of the population held by a [`PopulationManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Empty,
    Seeded,
    Evaluated,
    Culled,
    Reproduced,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Empty => "empty",
            Stage::Seeded => "seeded",
            Stage::Evaluated => "evaluated",
            Stage::Culled => "culled",
            Stage::Reproduced => "reproduced",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PopulationError {
    #[error("cannot seed a population without trait definitions")]
    EmptyTraitSpec,
    #[error(transparent)]
    Trait(#[from] TraitSpecError),
    #[error(transparent)]
    Config(#[from] SimConfigError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("`{operation}` is not allowed while the population is {stage}")]
    UnexpectedStage {
        operation: &'static str,
        stage: Stage,
    },
}

/// One generation of organisms. Replaced wholesale by each step, never edited in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Population {
    generation: usize,
    traits: Arc<TraitSet>,
    organisms: Vec<Organism>,
}

impl Population {
    /// Build a population from explicit trait vectors (clamped into range).
    pub fn from_trait_values(
        traits: Arc<TraitSet>,
        generation: usize,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, PopulationError> {
        if traits.is_empty() {
            return Err(PopulationError::EmptyTraitSpec);
        }
        traits.validate()?;
        let organisms = values
            .into_iter()
            .map(|v| TraitVector::new(&traits, v).map(|tv| Organism::new(tv, &traits)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            generation,
            traits,
            organisms,
        })
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn trait_set(&self) -> &Arc<TraitSet> {
        &self.traits
    }

    pub fn organisms(&self) -> &[Organism] {
        &self.organisms
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    pub fn trait_values(&self, index: usize) -> Option<&[f64]> {
        self.organisms.get(index).map(|o| o.traits().values())
    }

    pub fn fitness(&self, index: usize) -> Option<f64> {
        self.organisms.get(index).and_then(Organism::fitness)
    }

    /// Every organism's value for trait `name`, in population order.
    pub fn trait_column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.traits.index_of(name)?;
        Some(
            self.organisms
                .iter()
                .filter_map(|o| o.traits().get(idx))
                .collect(),
        )
    }

    pub fn total_food_requirement(&self) -> f64 {
        self.organisms.iter().map(Organism::food_requirement).sum()
    }

    pub fn snapshot(&self) -> SnapshotFrame {
        SnapshotFrame {
            generation: self.generation,
            trait_names: self.traits.names().map(str::to_string).collect(),
            organisms: self
                .organisms
                .iter()
                .map(|o| OrganismSnapshot {
                    traits: o.traits().values().to_vec(),
                    food_requirement: o.food_requirement(),
                    fitness: o.fitness(),
                })
                .collect(),
        }
    }
}

/// Stable ascending sort by fitness; ties keep insertion order, unevaluated organisms go last.
pub fn rank_by_fitness(organisms: &mut [Organism]) {
    organisms.sort_by(|a, b| {
        let fa = a.fitness().unwrap_or(f64::INFINITY);
        let fb = b.fitness().unwrap_or(f64::INFINITY);
        fa.total_cmp(&fb)
    });
}

/// Drives one population through seed → evaluate → cull → reproduce.
#[derive(Clone, Debug)]
pub struct PopulationManager {
    stage: Stage,
    population: Option<Population>,
    admission: Option<Admission>,
}

impl Default for PopulationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationManager {
    pub fn new() -> Self {
        Self {
            stage: Stage::Empty,
            population: None,
            admission: None,
        }
    }

    /// Resume from an existing generation. Generation 0 counts as freshly seeded.
    pub fn from_population(population: Population) -> Self {
        let stage = if population.generation == 0 {
            Stage::Seeded
        } else {
            Stage::Reproduced
        };
        Self {
            stage,
            population: Some(population),
            admission: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn into_population(self) -> Option<Population> {
        self.population
    }

    pub(crate) fn into_current(self, operation: &'static str) -> Result<Population, PopulationError> {
        let stage = self.stage;
        self.population
            .ok_or(PopulationError::UnexpectedStage { operation, stage })
    }

    /// Admission outcome of the most recent cull.
    pub fn admission(&self) -> Option<&Admission> {
        self.admission.as_ref()
    }

    fn expect_stage(&self, operation: &'static str, allowed: &[Stage]) -> Result<(), PopulationError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(PopulationError::UnexpectedStage {
                operation,
                stage: self.stage,
            })
        }
    }

    fn current_mut(&mut self, operation: &'static str) -> Result<&mut Population, PopulationError> {
        let stage = self.stage;
        self.population
            .as_mut()
            .ok_or(PopulationError::UnexpectedStage { operation, stage })
    }

    pub fn seed<R: Rng + ?Sized>(
        &mut self,
        traits: Arc<TraitSet>,
        config: &SimConfig,
        rng: &mut R,
    ) -> Result<(), PopulationError> {
        self.expect_stage("seed", &[Stage::Empty])?;
        if traits.is_empty() {
            return Err(PopulationError::EmptyTraitSpec);
        }
        traits.validate()?;
        config.validate()?;

        let organisms = (0..config.initial_population_size)
            .map(|_| {
                let v = TraitVector::random(
                    &traits,
                    config.initial_distribution,
                    config.initial_variability,
                    rng,
                );
                Organism::new(v, &traits)
            })
            .collect();
        self.population = Some(Population {
            generation: 0,
            traits,
            organisms,
        });
        self.admission = None;
        self.stage = Stage::Seeded;
        Ok(())
    }

    /// Score every organism. Large populations are scored on the rayon pool;
    /// scores are written back in population order either way.
    pub fn evaluate_all(
        &mut self,
        fitness: &dyn FitnessFunction,
        env: &Environment,
        config: &SimConfig,
    ) -> Result<(), PopulationError> {
        self.expect_stage("evaluate_all", &[Stage::Seeded, Stage::Reproduced])?;
        let population = self.current_mut("evaluate_all")?;

        let scores: Vec<f64> = if population.organisms.len() >= config.parallel_threshold {
            population
                .organisms
                .par_iter()
                .map(|o| fitness.evaluate(o.traits(), env))
                .collect()
        } else {
            population
                .organisms
                .iter()
                .map(|o| fitness.evaluate(o.traits(), env))
                .collect()
        };
        for (index, (organism, score)) in population.organisms.iter_mut().zip(scores).enumerate() {
            organism.set_fitness(check_score(index, score)?);
        }

        self.stage = Stage::Evaluated;
        Ok(())
    }

    /// Rank by fitness and keep the admitted prefix; everyone else is dropped.
    pub fn cull(&mut self, available_food: f64) -> Result<Admission, PopulationError> {
        self.expect_stage("cull", &[Stage::Evaluated])?;
        let population = self.current_mut("cull")?;

        rank_by_fitness(&mut population.organisms);
        let admission = admit(&population.organisms, available_food);
        population.organisms.truncate(admission.admitted_count);

        tracing::debug!(
            generation = population.generation,
            admitted = admission.admitted_count,
            total_food = admission.total_food,
            available_food,
            "culled population to food budget"
        );

        self.admission = Some(admission);
        self.stage = Stage::Culled;
        Ok(admission)
    }

    /// Replace the admitted parents with their offspring, capped at `max_population_size`.
    pub fn reproduce<R: Rng + ?Sized>(
        &mut self,
        config: &SimConfig,
        rng: &mut R,
    ) -> Result<(), PopulationError> {
        self.expect_stage("reproduce", &[Stage::Culled])?;
        let population = self.current_mut("reproduce")?;

        let parents = std::mem::take(&mut population.organisms);
        let traits = Arc::clone(&population.traits);
        let cap = config.max_population_size;
        let produced = parents.len().saturating_mul(config.fertility);

        let children = match config.excess_offspring {
            ExcessOffspringPolicy::ParentRank => {
                // Parents arrive best-first; stop drawing once the cap is reached.
                let mut children = Vec::with_capacity(produced.min(cap));
                for parent in &parents {
                    let room = cap.saturating_sub(children.len());
                    if room == 0 {
                        break;
                    }
                    let count = room.min(config.fertility);
                    children.extend(offspring(parent, &traits, config, count, rng));
                }
                children
            }
            ExcessOffspringPolicy::RandomSubsample if produced > cap => {
                // Offspring slot `i` belongs to parent `i / fertility`; only chosen slots are bred.
                let mut slots = rand::seq::index::sample(&mut *rng, produced, cap).into_vec();
                slots.sort_unstable();
                let mut children = Vec::with_capacity(cap);
                for slot in slots {
                    let parent = &parents[slot / config.fertility];
                    children.push(child(parent, &traits, config, rng));
                }
                children
            }
            ExcessOffspringPolicy::RandomSubsample => {
                let mut children = Vec::with_capacity(produced);
                for parent in &parents {
                    children.extend(offspring(parent, &traits, config, config.fertility, rng));
                }
                children
            }
        };

        if produced > cap {
            tracing::warn!(
                generation = population.generation,
                produced,
                cap,
                "discarding offspring beyond max_population_size"
            );
        }

        population.organisms = children
            .into_iter()
            .map(|v| Organism::new(v, &traits))
            .collect();
        population.generation += 1;

        tracing::debug!(
            generation = population.generation,
            parents = parents.len(),
            size = population.organisms.len(),
            "produced next generation"
        );

        self.stage = Stage::Reproduced;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecosystem::Ecosystem;
    use crate::fitness::{FnFitness, TraitValue};
    use crate::genome::TraitSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn size_set() -> Arc<TraitSet> {
        Arc::new(TraitSet::new(vec![TraitSpec::new("size", 0.0, 10.0, 1.0, 1.0).unwrap()]).unwrap())
    }

    fn env() -> Environment {
        Ecosystem::with_constant_food(0.0).environment(0)
    }

    #[test]
    fn seed_requires_traits() {
        let mut manager = PopulationManager::new();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let result = manager.seed(Arc::new(TraitSet::default()), &SimConfig::default(), &mut rng);
        assert_eq!(result, Err(PopulationError::EmptyTraitSpec));
        assert_eq!(manager.stage(), Stage::Empty);
    }

    #[test]
    fn seed_creates_configured_population() {
        let mut manager = PopulationManager::new();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let config = SimConfig {
            initial_population_size: 25,
            ..SimConfig::default()
        };
        manager.seed(size_set(), &config, &mut rng).unwrap();
        assert_eq!(manager.stage(), Stage::Seeded);
        let population = manager.population().unwrap();
        assert_eq!(population.len(), 25);
        assert_eq!(population.generation(), 0);
        assert!(population
            .trait_column("size")
            .unwrap()
            .iter()
            .all(|v| (0.0..=10.0).contains(v)));
    }

    #[test]
    fn operations_enforce_stage_order() {
        let mut manager = PopulationManager::new();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        assert!(matches!(
            manager.cull(10.0),
            Err(PopulationError::UnexpectedStage {
                operation: "cull",
                stage: Stage::Empty
            })
        ));
        manager.seed(size_set(), &SimConfig::default(), &mut rng).unwrap();
        assert!(matches!(
            manager.reproduce(&SimConfig::default(), &mut rng),
            Err(PopulationError::UnexpectedStage { .. })
        ));
        assert!(matches!(
            manager.seed(size_set(), &SimConfig::default(), &mut rng),
            Err(PopulationError::UnexpectedStage { .. })
        ));
    }

    #[test]
    fn cull_keeps_ranked_prefix() {
        let set = size_set();
        let population = Population::from_trait_values(
            Arc::clone(&set),
            0,
            vec![vec![4.0], vec![1.0], vec![3.0], vec![5.0], vec![2.0]],
        )
        .unwrap();
        let mut manager = PopulationManager::from_population(population);
        let fitness = TraitValue::new(&set, "size").unwrap();
        manager
            .evaluate_all(&fitness, &env(), &SimConfig::default())
            .unwrap();
        let admission = manager.cull(9.0).unwrap();
        assert_eq!(admission.admitted_count, 3);
        assert_eq!(
            manager.population().unwrap().trait_column("size").unwrap(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn ties_keep_insertion_order() {
        let set = size_set();
        let population = Population::from_trait_values(
            Arc::clone(&set),
            0,
            vec![vec![3.0], vec![1.0], vec![2.0]],
        )
        .unwrap();
        let mut manager = PopulationManager::from_population(population);
        let flat = FnFitness(|_: &TraitVector, _: &Environment| 0.0);
        manager
            .evaluate_all(&flat, &env(), &SimConfig::default())
            .unwrap();
        manager.cull(100.0).unwrap();
        assert_eq!(
            manager.population().unwrap().trait_column("size").unwrap(),
            vec![3.0, 1.0, 2.0]
        );
    }

    #[test]
    fn non_finite_fitness_is_an_error() {
        let set = size_set();
        let population =
            Population::from_trait_values(Arc::clone(&set), 0, vec![vec![1.0], vec![2.0]]).unwrap();
        let mut manager = PopulationManager::from_population(population);
        let broken = FnFitness(|t: &TraitVector, _: &Environment| {
            if t.values()[0] > 1.5 {
                f64::NAN
            } else {
                1.0
            }
        });
        let result = manager.evaluate_all(&broken, &env(), &SimConfig::default());
        assert!(matches!(
            result,
            Err(PopulationError::Evaluation(EvaluationError::NonFinite { index: 1, .. }))
        ));
    }

    #[test]
    fn parallel_and_serial_evaluation_agree() {
        let set = size_set();
        let values: Vec<Vec<f64>> = (0..200).map(|i| vec![(i % 10) as f64]).collect();
        let population = Population::from_trait_values(Arc::clone(&set), 0, values).unwrap();
        let fitness = TraitValue::new(&set, "size").unwrap();

        let mut serial = PopulationManager::from_population(population.clone());
        let serial_config = SimConfig {
            parallel_threshold: usize::MAX,
            ..SimConfig::default()
        };
        serial.evaluate_all(&fitness, &env(), &serial_config).unwrap();

        let mut parallel = PopulationManager::from_population(population);
        let parallel_config = SimConfig {
            parallel_threshold: 0,
            ..SimConfig::default()
        };
        parallel
            .evaluate_all(&fitness, &env(), &parallel_config)
            .unwrap();

        assert_eq!(serial.population(), parallel.population());
    }

    #[test]
    fn parent_rank_policy_keeps_best_parents_offspring() {
        let set = size_set();
        let population = Population::from_trait_values(
            Arc::clone(&set),
            0,
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        let config = SimConfig {
            fertility: 2,
            mutation_chance: 0.0,
            initial_population_size: 1,
            max_population_size: 3,
            ..SimConfig::default()
        };
        let mut manager = PopulationManager::from_population(population);
        let fitness = TraitValue::new(&set, "size").unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        manager.evaluate_all(&fitness, &env(), &config).unwrap();
        manager.cull(100.0).unwrap();
        manager.reproduce(&config, &mut rng).unwrap();
        let next = manager.population().unwrap();
        assert_eq!(next.generation(), 1);
        assert_eq!(next.trait_column("size").unwrap(), vec![1.0, 1.0, 2.0]);
        assert!(next.organisms().iter().all(|o| o.fitness().is_none()));
    }

    #[test]
    fn random_subsample_policy_respects_cap() {
        let set = size_set();
        let values: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let population = Population::from_trait_values(Arc::clone(&set), 0, values).unwrap();
        let config = SimConfig {
            fertility: 3,
            mutation_chance: 0.0,
            initial_population_size: 1,
            max_population_size: 7,
            excess_offspring: ExcessOffspringPolicy::RandomSubsample,
            ..SimConfig::default()
        };
        let mut manager = PopulationManager::from_population(population);
        let fitness = TraitValue::new(&set, "size").unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        manager.evaluate_all(&fitness, &env(), &config).unwrap();
        manager.cull(1000.0).unwrap();
        manager.reproduce(&config, &mut rng).unwrap();
        let column = manager.population().unwrap().trait_column("size").unwrap();
        assert_eq!(column.len(), 7);
        assert!(column.windows(2).all(|w| w[0] <= w[1]), "parent order preserved");
    }

    fn manager_with_culled_parents(config: &SimConfig) -> PopulationManager {
        let set = size_set();
        let population = Population::from_trait_values(
            Arc::clone(&set),
            0,
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        let mut manager = PopulationManager::from_population(population);
        let fitness = TraitValue::new(&set, "size").unwrap();
        manager.evaluate_all(&fitness, &env(), config).unwrap();
        manager.cull(100.0).unwrap();
        manager
    }

    #[test]
    fn largest_fertility_breeds_only_up_to_cap() {
        for policy in [
            ExcessOffspringPolicy::ParentRank,
            ExcessOffspringPolicy::RandomSubsample,
        ] {
            let config = SimConfig {
                fertility: SimConfig::MAX_POPULATION_SIZE,
                mutation_chance: 0.0,
                initial_population_size: 1,
                max_population_size: 7,
                excess_offspring: policy,
                ..SimConfig::default()
            };
            assert_eq!(config.validate(), Ok(()));
            let mut manager = manager_with_culled_parents(&config);
            let mut rng = ChaCha12Rng::seed_from_u64(21);
            manager.reproduce(&config, &mut rng).unwrap();
            let column = manager.population().unwrap().trait_column("size").unwrap();
            assert_eq!(column.len(), 7, "{policy:?}");
            assert!(column.windows(2).all(|w| w[0] <= w[1]));
            if policy == ExcessOffspringPolicy::ParentRank {
                assert_eq!(column, vec![1.0; 7]);
            }
        }
    }

    #[test]
    fn parent_rank_draws_nothing_for_dropped_offspring() {
        let config = SimConfig {
            fertility: 5,
            mutation_chance: 0.5,
            initial_population_size: 1,
            max_population_size: 5,
            ..SimConfig::default()
        };
        let mut manager = manager_with_culled_parents(&config);
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        manager.reproduce(&config, &mut rng).unwrap();

        // Only the best parent's five children consumed the generator.
        let best = manager_with_culled_parents(&config)
            .population()
            .unwrap()
            .organisms()[0]
            .clone();
        let mut expected_rng = ChaCha12Rng::seed_from_u64(4);
        let _ = offspring(&best, &size_set(), &config, 5, &mut expected_rng);
        assert_eq!(rng.random::<u64>(), expected_rng.random::<u64>());
    }

    #[test]
    fn reproduce_after_total_cull_is_empty() {
        let set = size_set();
        let population =
            Population::from_trait_values(Arc::clone(&set), 0, vec![vec![1.0], vec![2.0]]).unwrap();
        let mut manager = PopulationManager::from_population(population);
        let fitness = TraitValue::new(&set, "size").unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        manager
            .evaluate_all(&fitness, &env(), &SimConfig::default())
            .unwrap();
        assert_eq!(manager.cull(0.0).unwrap().admitted_count, 0);
        manager.reproduce(&SimConfig::default(), &mut rng).unwrap();
        assert!(manager.population().unwrap().is_empty());
        assert_eq!(manager.stage(), Stage::Reproduced);
    }

    #[test]
    fn snapshot_copies_trait_values() {
        let set = size_set();
        let population =
            Population::from_trait_values(Arc::clone(&set), 2, vec![vec![1.5]]).unwrap();
        let frame = population.snapshot();
        assert_eq!(frame.generation, 2);
        assert_eq!(frame.trait_names, vec!["size".to_string()]);
        assert_eq!(frame.organisms[0].traits, vec![1.5]);
        assert_eq!(frame.organisms[0].food_requirement, 1.5);
    }
}
