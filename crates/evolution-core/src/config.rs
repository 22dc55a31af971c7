use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ENVIRONMENT_HORIZON, DEFAULT_PARALLEL_THRESHOLD, MAX_POPULATION_SIZE,
};
use crate::ecosystem::{AttributeParams, FoodPolicy};
use crate::genome::InitialDistribution;

/// Which offspring survive when a generation overshoots `max_population_size`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExcessOffspringPolicy {
    /// Keep offspring of the best-ranked parents; later parents' offspring are dropped.
    #[default]
    ParentRank,
    /// Keep a uniform random subset drawn with the run's generator, preserving parent order.
    RandomSubsample,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for reproducible simulation runs.
    pub seed: u64,
    /// Number of organisms created for generation 0.
    pub initial_population_size: usize,
    /// Hard cap on the size of any generation.
    pub max_population_size: usize,
    /// Offspring produced per admitted parent.
    pub fertility: usize,
    /// Per-trait probability of mutating when an offspring is produced.
    pub mutation_chance: f64,
    /// Multiplier applied to every trait's mutation standard deviation.
    pub mutation_scale: f64,
    /// Shape of the generation-0 trait distribution.
    pub initial_distribution: InitialDistribution,
    /// Fraction of each trait's half-range used as generation-0 spread.
    pub initial_variability: f64,
    /// Rule for trimming offspring beyond `max_population_size`.
    pub excess_offspring: ExcessOffspringPolicy,
    /// Per-generation food supply.
    pub food: FoodPolicy,
    /// Ambient temperature track handed to fitness functions.
    pub temperature: AttributeParams,
    /// Hazard-rate track handed to fitness functions.
    pub hazard_rate: AttributeParams,
    /// Generations of environment values generated up front.
    pub environment_horizon: usize,
    /// Population size at which fitness evaluation runs in parallel.
    pub parallel_threshold: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            initial_population_size: 100,
            max_population_size: 1000,
            fertility: 2,
            mutation_chance: 0.1,
            mutation_scale: 1.0,
            initial_distribution: InitialDistribution::Uniform,
            initial_variability: 1.0,
            excess_offspring: ExcessOffspringPolicy::ParentRank,
            food: FoodPolicy::default(),
            temperature: AttributeParams {
                mean: 20.0,
                std: 5.0,
                min_value: Some(-10.0),
                max_value: Some(40.0),
                volatility: Some(2.0),
            },
            hazard_rate: AttributeParams {
                mean: 0.3,
                std: 0.1,
                min_value: Some(0.0),
                max_value: Some(1.0),
                volatility: Some(0.05),
            },
            environment_horizon: DEFAULT_ENVIRONMENT_HORIZON,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimConfigError {
    #[error("initial_population_size must be greater than 0")]
    InvalidInitialPopulationSize,
    #[error("max_population_size must be greater than 0")]
    InvalidMaxPopulationSize,
    #[error("max_population_size ({actual}) exceeds supported maximum ({max})")]
    PopulationTooLarge { max: usize, actual: usize },
    #[error("initial_population_size ({initial}) exceeds max_population_size ({max})")]
    InitialExceedsMax { initial: usize, max: usize },
    #[error("fertility must be greater than 0")]
    InvalidFertility,
    #[error("fertility ({actual}) exceeds supported maximum ({max})")]
    FertilityTooLarge { max: usize, actual: usize },
    #[error("mutation_chance must be finite and within [0,1]")]
    InvalidMutationChance,
    #[error("mutation_scale must be finite and non-negative")]
    InvalidMutationScale,
    #[error("initial_variability must be finite and within [0,1]")]
    InvalidInitialVariability,
    #[error("food amounts must be finite and non-negative")]
    InvalidFoodAmount,
    #[error("food schedule must contain at least one amount")]
    EmptyFoodSchedule,
    #[error("{attribute} parameters must be finite with std >= 0, min <= max and volatility >= 0")]
    InvalidAttribute { attribute: &'static str },
    #[error("environment_horizon must be greater than 0")]
    InvalidEnvironmentHorizon,
}

impl SimConfig {
    pub const MAX_POPULATION_SIZE: usize = MAX_POPULATION_SIZE;

    pub fn validate(&self) -> Result<(), SimConfigError> {
        self.validate_population()?;
        self.validate_reproduction()?;
        self.validate_environment()?;
        Ok(())
    }

    fn validate_population(&self) -> Result<(), SimConfigError> {
        if self.initial_population_size == 0 {
            return Err(SimConfigError::InvalidInitialPopulationSize);
        }
        if self.max_population_size == 0 {
            return Err(SimConfigError::InvalidMaxPopulationSize);
        }
        if self.max_population_size > Self::MAX_POPULATION_SIZE {
            return Err(SimConfigError::PopulationTooLarge {
                max: Self::MAX_POPULATION_SIZE,
                actual: self.max_population_size,
            });
        }
        if self.initial_population_size > self.max_population_size {
            return Err(SimConfigError::InitialExceedsMax {
                initial: self.initial_population_size,
                max: self.max_population_size,
            });
        }
        if !(self.initial_variability.is_finite()
            && (0.0..=1.0).contains(&self.initial_variability))
        {
            return Err(SimConfigError::InvalidInitialVariability);
        }
        Ok(())
    }

    fn validate_reproduction(&self) -> Result<(), SimConfigError> {
        if self.fertility == 0 {
            return Err(SimConfigError::InvalidFertility);
        }
        if self.fertility > Self::MAX_POPULATION_SIZE {
            return Err(SimConfigError::FertilityTooLarge {
                max: Self::MAX_POPULATION_SIZE,
                actual: self.fertility,
            });
        }
        if !(self.mutation_chance.is_finite() && (0.0..=1.0).contains(&self.mutation_chance)) {
            return Err(SimConfigError::InvalidMutationChance);
        }
        if !(self.mutation_scale.is_finite() && self.mutation_scale >= 0.0) {
            return Err(SimConfigError::InvalidMutationScale);
        }
        Ok(())
    }

    fn validate_environment(&self) -> Result<(), SimConfigError> {
        self.food.validate()?;
        self.temperature.validate("temperature")?;
        self.hazard_rate.validate("hazard_rate")?;
        if self.environment_horizon == 0 {
            return Err(SimConfigError::InvalidEnvironmentHorizon);
        }
        Ok(())
    }
}
