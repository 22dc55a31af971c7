//! Food-constrained evolution engine.
//!
//! Each generation is evaluated by a pluggable [`FitnessFunction`], ranked
//! best-first, culled greedily to the ecosystem's food budget, and replaced by
//! the mutated offspring of the admitted organisms.

pub mod config;
pub mod constants;
pub mod ecosystem;
pub mod fitness;
pub mod genome;
pub mod metrics;
pub mod organism;
pub mod population;
pub mod rng;
pub mod simulation;

pub use config::{ExcessOffspringPolicy, SimConfig, SimConfigError};
pub use ecosystem::{admit, Admission, AttributeParams, Ecosystem, Environment, FoodBudget, FoodPolicy};
pub use fitness::{EvaluationError, FitnessError, FitnessFunction, FitnessSpec};
pub use genome::{InitialDistribution, TraitSet, TraitSpec, TraitSpecError, TraitVector};
pub use metrics::{RunSummary, SnapshotFrame, StepSummary, TraitStats};
pub use organism::Organism;
pub use population::{Population, PopulationError, PopulationManager, Stage};
pub use simulation::{evaluate_population, seed_population, step_generation, Simulation};
