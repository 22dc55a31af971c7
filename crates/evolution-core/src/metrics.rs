use serde::{Deserialize, Serialize};

use crate::ecosystem::{Admission, Environment};
use crate::genome::TraitSet;
use crate::organism::Organism;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraitStats {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

/// Observable outcome of one generation step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub generation_index: usize,
    pub evaluated_count: usize,
    pub admitted_count: usize,
    pub available_food: f64,
    pub total_food_consumed: f64,
    pub best_fitness: Option<f64>,
    pub mean_fitness: Option<f64>,
    pub fitness_std: f64,
    pub food_requirement_mean: f64,
    /// Size of the generation produced by this step.
    pub population_size: usize,
    pub temperature: f64,
    pub hazard_rate: f64,
    pub trait_stats: Vec<TraitStats>,
}

impl StepSummary {
    pub fn is_extinct(&self) -> bool {
        self.population_size == 0
    }

    pub(crate) fn with_outcome(mut self, admission: &Admission, population_size: usize) -> Self {
        self.admitted_count = admission.admitted_count;
        self.available_food = admission.available_food;
        self.total_food_consumed = admission.total_food;
        self.population_size = population_size;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrganismSnapshot {
    pub traits: Vec<f64>,
    pub food_requirement: f64,
    pub fitness: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFrame {
    pub generation: usize,
    pub trait_names: Vec<String>,
    pub organisms: Vec<OrganismSnapshot>,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub generations_requested: usize,
    pub generations_completed: usize,
    /// Generation whose step produced an empty population, if any.
    #[serde(default)]
    pub extinct_at: Option<usize>,
    pub final_population_size: usize,
    pub samples: Vec<StepSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<SnapshotFrame>,
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    (mean, var.sqrt())
}

/// Statistics of an evaluated generation. Admission and offspring fields stay
/// zeroed until [`StepSummary::with_outcome`] fills them in.
pub(crate) fn collect_step_summary(
    env: &Environment,
    set: &TraitSet,
    evaluated: &[Organism],
) -> StepSummary {
    let fitnesses: Vec<f64> = evaluated.iter().filter_map(|o| o.fitness()).collect();
    let (fitness_mean, fitness_std) = mean_and_std(&fitnesses);
    let best_fitness = fitnesses.iter().copied().reduce(f64::min);
    let mean_fitness = (!fitnesses.is_empty()).then_some(fitness_mean);

    let food: Vec<f64> = evaluated.iter().map(|o| o.food_requirement()).collect();
    let (food_requirement_mean, _) = mean_and_std(&food);

    let trait_stats = set
        .specs()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let column: Vec<f64> = evaluated
                .iter()
                .filter_map(|o| o.traits().get(i))
                .collect();
            let (mean, std) = mean_and_std(&column);
            TraitStats {
                name: spec.name().to_string(),
                mean,
                std,
            }
        })
        .collect();

    StepSummary {
        generation_index: env.generation,
        evaluated_count: evaluated.len(),
        admitted_count: 0,
        available_food: env.available_food,
        total_food_consumed: 0.0,
        best_fitness,
        mean_fitness,
        fitness_std,
        food_requirement_mean,
        population_size: 0,
        temperature: env.temperature,
        hazard_rate: env.hazard_rate,
        trait_stats,
    }
}
