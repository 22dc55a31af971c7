use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha12Rng;

use crate::config::SimConfig;
use crate::constants::ECOSYSTEM_RNG_STREAM;
use crate::ecosystem::Ecosystem;
use crate::fitness::FitnessFunction;
use crate::genome::TraitSet;
use crate::metrics::{collect_step_summary, RunSummary, StepSummary};
use crate::population::{Population, PopulationError, PopulationManager};
use crate::rng::{create_rng, derive_stream_rng};

/// Seed generation 0 from a fresh generator built from `seed`.
pub fn seed_population(
    traits: impl Into<Arc<TraitSet>>,
    config: &SimConfig,
    seed: u64,
) -> Result<Population, PopulationError> {
    let mut rng = create_rng(seed);
    seed_population_with(traits.into(), config, &mut rng)
}

fn seed_population_with<R: Rng + ?Sized>(
    traits: Arc<TraitSet>,
    config: &SimConfig,
    rng: &mut R,
) -> Result<Population, PopulationError> {
    let mut manager = PopulationManager::new();
    manager.seed(traits, config, rng)?;
    manager.into_current("seed")
}

/// Score a copy of `population` without advancing it.
///
/// Fitness is pure, so the scores match the ones the next step computes.
pub fn evaluate_population(
    population: &Population,
    ecosystem: &Ecosystem,
    fitness: &dyn FitnessFunction,
    config: &SimConfig,
) -> Result<Population, PopulationError> {
    let env = ecosystem.environment(population.generation());
    let mut manager = PopulationManager::from_population(population.clone());
    manager.evaluate_all(fitness, &env, config)?;
    manager.into_current("evaluate_population")
}

/// Advance one generation: evaluate, cull to the food budget, reproduce.
///
/// `population` is left untouched so callers can keep it as history.
pub fn step_generation<R: Rng + ?Sized>(
    population: &Population,
    ecosystem: &Ecosystem,
    fitness: &dyn FitnessFunction,
    config: &SimConfig,
    rng: &mut R,
) -> Result<(Population, StepSummary), PopulationError> {
    config.validate()?;
    let env = ecosystem.environment(population.generation());
    let mut manager = PopulationManager::from_population(population.clone());

    manager.evaluate_all(fitness, &env, config)?;
    let summary = match manager.population() {
        Some(evaluated) => collect_step_summary(&env, evaluated.trait_set(), evaluated.organisms()),
        None => {
            return Err(PopulationError::UnexpectedStage {
                operation: "step_generation",
                stage: manager.stage(),
            })
        }
    };

    let admission = manager.cull(env.available_food)?;
    manager.reproduce(config, rng)?;
    let next = manager.into_current("step_generation")?;
    let summary = summary.with_outcome(&admission, next.len());
    Ok((next, summary))
}

/// A complete run: trait set, config, fitness, ecosystem and the injected generator.
pub struct Simulation {
    config: SimConfig,
    fitness: Box<dyn FitnessFunction>,
    ecosystem: Ecosystem,
    population: Population,
    rng: ChaCha12Rng,
}

impl Simulation {
    /// Seed generation 0 and the ecosystem from `config.seed`.
    ///
    /// The ecosystem draws from a derived stream so changing the environment
    /// parameters never shifts the population's random sequence.
    pub fn new(
        traits: impl Into<Arc<TraitSet>>,
        config: SimConfig,
        fitness: Box<dyn FitnessFunction>,
    ) -> Result<Self, PopulationError> {
        config.validate()?;
        let mut ecosystem_rng = derive_stream_rng(config.seed, ECOSYSTEM_RNG_STREAM);
        let ecosystem = Ecosystem::from_config(&config, &mut ecosystem_rng)?;
        let mut rng = create_rng(config.seed);
        let population = seed_population_with(traits.into(), &config, &mut rng)?;
        Ok(Self {
            config,
            fitness,
            ecosystem,
            population,
            rng,
        })
    }

    /// Replace the config-derived ecosystem.
    pub fn with_ecosystem(mut self, ecosystem: Ecosystem) -> Self {
        self.ecosystem = ecosystem;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn ecosystem(&self) -> &Ecosystem {
        &self.ecosystem
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn trait_set(&self) -> &Arc<TraitSet> {
        self.population.trait_set()
    }

    pub fn step(&mut self) -> Result<StepSummary, PopulationError> {
        let (next, summary) = step_generation(
            &self.population,
            &self.ecosystem,
            self.fitness.as_ref(),
            &self.config,
            &mut self.rng,
        )?;
        self.population = next;
        Ok(summary)
    }

    /// Step up to `generations` times, stopping early on extinction.
    ///
    /// With `snapshot_every > 0`, every generation whose index is a multiple of
    /// it is captured (with fitness) before it is stepped.
    pub fn run(
        &mut self,
        generations: usize,
        snapshot_every: usize,
    ) -> Result<RunSummary, PopulationError> {
        let mut samples = Vec::with_capacity(generations);
        let mut snapshots = Vec::new();
        let mut extinct_at = None;

        for _ in 0..generations {
            if snapshot_every > 0 && self.population.generation() % snapshot_every == 0 {
                let evaluated = evaluate_population(
                    &self.population,
                    &self.ecosystem,
                    self.fitness.as_ref(),
                    &self.config,
                )?;
                snapshots.push(evaluated.snapshot());
            }

            let summary = self.step()?;
            let extinct = summary.is_extinct();
            if extinct {
                extinct_at = Some(summary.generation_index);
            }
            samples.push(summary);
            if extinct {
                tracing::info!(
                    generation = self.population.generation(),
                    "population went extinct"
                );
                break;
            }
        }

        tracing::info!(
            generations_completed = samples.len(),
            final_population = self.population.len(),
            "run complete"
        );

        Ok(RunSummary {
            schema_version: 1,
            generations_requested: generations,
            generations_completed: samples.len(),
            extinct_at,
            final_population_size: self.population.len(),
            samples,
            snapshots,
        })
    }
}
