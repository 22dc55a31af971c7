use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{SimConfig, SimConfigError};
use crate::organism::Organism;
use crate::rng::truncated_normal;

/// Distribution parameters for a fluctuating ecosystem attribute.
///
/// Missing bounds default to three standard deviations around the mean;
/// missing volatility defaults to the standard deviation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeParams {
    pub mean: f64,
    pub std: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility: Option<f64>,
}

impl AttributeParams {
    pub fn constant(value: f64) -> Self {
        Self {
            mean: value,
            std: 0.0,
            min_value: None,
            max_value: None,
            volatility: None,
        }
    }

    pub fn min(&self) -> f64 {
        self.min_value.unwrap_or(self.mean - 3.0 * self.std)
    }

    pub fn max(&self) -> f64 {
        self.max_value.unwrap_or(self.mean + 3.0 * self.std)
    }

    pub fn volatility(&self) -> f64 {
        self.volatility.unwrap_or(self.std)
    }

    pub(crate) fn validate(&self, attribute: &'static str) -> Result<(), SimConfigError> {
        let invalid = || SimConfigError::InvalidAttribute { attribute };
        if !(self.mean.is_finite() && self.std.is_finite() && self.std >= 0.0) {
            return Err(invalid());
        }
        let (min, max) = (self.min(), self.max());
        if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(invalid());
        }
        let volatility = self.volatility();
        if !(volatility.is_finite() && volatility >= 0.0) {
            return Err(invalid());
        }
        Ok(())
    }
}

/// Pre-generated per-generation values of one ecosystem attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeTrack {
    values: Vec<f64>,
}

impl AttributeTrack {
    /// Draw `horizon` truncated-normal values, then limit each generation-to-generation
    /// step to the attribute's volatility.
    pub fn generate<R: Rng + ?Sized>(params: &AttributeParams, horizon: usize, rng: &mut R) -> Self {
        let (min, max) = (params.min(), params.max());
        let volatility = params.volatility();
        let mut values: Vec<f64> = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let raw = truncated_normal(rng, params.mean, params.std, min, max);
            let next = match values.last() {
                Some(&prev) if (raw - prev).abs() > volatility => {
                    if raw > prev {
                        prev + volatility
                    } else {
                        prev - volatility
                    }
                }
                _ => raw,
            };
            values.push(next);
        }
        Self { values }
    }

    /// Value at `generation`; generations past the horizon hold the final value.
    pub fn value(&self, generation: usize) -> f64 {
        self.values
            .get(generation)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// How the per-generation food supply is determined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FoodPolicy {
    Constant {
        amount: f64,
    },
    /// Indexed by generation; the last entry holds afterwards.
    Schedule {
        amounts: Vec<f64>,
    },
    Fluctuating(AttributeParams),
}

impl Default for FoodPolicy {
    fn default() -> Self {
        FoodPolicy::Constant { amount: 100.0 }
    }
}

impl FoodPolicy {
    pub(crate) fn validate(&self) -> Result<(), SimConfigError> {
        match self {
            FoodPolicy::Constant { amount } => {
                if !(amount.is_finite() && *amount >= 0.0) {
                    return Err(SimConfigError::InvalidFoodAmount);
                }
            }
            FoodPolicy::Schedule { amounts } => {
                if amounts.is_empty() {
                    return Err(SimConfigError::EmptyFoodSchedule);
                }
                if !amounts.iter().all(|a| a.is_finite() && *a >= 0.0) {
                    return Err(SimConfigError::InvalidFoodAmount);
                }
            }
            FoodPolicy::Fluctuating(params) => {
                params.validate("food")?;
                if params.min() < 0.0 {
                    return Err(SimConfigError::InvalidFoodAmount);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum FoodSupply {
    Constant(f64),
    Schedule(Vec<f64>),
    Track(AttributeTrack),
}

/// Ecosystem-wide food ceiling, one value per generation.
#[derive(Clone, Debug, PartialEq)]
pub struct FoodBudget {
    supply: FoodSupply,
}

impl FoodBudget {
    pub fn constant(amount: f64) -> Self {
        Self {
            supply: FoodSupply::Constant(amount.max(0.0)),
        }
    }

    pub fn from_policy<R: Rng + ?Sized>(policy: &FoodPolicy, horizon: usize, rng: &mut R) -> Self {
        let supply = match policy {
            FoodPolicy::Constant { amount } => FoodSupply::Constant(*amount),
            FoodPolicy::Schedule { amounts } => FoodSupply::Schedule(amounts.clone()),
            FoodPolicy::Fluctuating(params) => {
                FoodSupply::Track(AttributeTrack::generate(params, horizon, rng))
            }
        };
        Self { supply }
    }

    pub fn available_food(&self, generation: usize) -> f64 {
        let amount = match &self.supply {
            FoodSupply::Constant(amount) => *amount,
            FoodSupply::Schedule(amounts) => amounts
                .get(generation)
                .or_else(|| amounts.last())
                .copied()
                .unwrap_or(0.0),
            FoodSupply::Track(track) => track.value(generation),
        };
        amount.max(0.0)
    }
}

/// Result of walking a fitness-ranked population against the food budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Admission {
    /// Length of the admitted prefix of the ranked order.
    pub admitted_count: usize,
    pub total_food: f64,
    pub available_food: f64,
}

impl Admission {
    pub fn admitted<'a>(&self, ranked: &'a [Organism]) -> &'a [Organism] {
        &ranked[..self.admitted_count.min(ranked.len())]
    }
}

/// Greedy best-first admission.
///
/// Organisms are admitted in rank order while food remains, that is while the
/// running total is below `available_food`, and only if the running total stays
/// within `available_food` after admitting them. The first organism that fails
/// and everyone ranked after it are excluded, even if a later, cheaper
/// organism would still fit. An exhausted budget admits nobody, including
/// organisms that need no food.
pub fn admit(ranked: &[Organism], available_food: f64) -> Admission {
    let mut total_food = 0.0;
    let mut admitted_count = 0;
    for organism in ranked {
        if total_food >= available_food {
            break;
        }
        let next = total_food + organism.food_requirement();
        if next > available_food {
            break;
        }
        total_food = next;
        admitted_count += 1;
    }
    Admission {
        admitted_count,
        total_food,
        available_food,
    }
}

/// Environment state handed to fitness functions for one generation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub generation: usize,
    pub temperature: f64,
    pub hazard_rate: f64,
    pub available_food: f64,
}

/// Food budget plus the temperature and hazard tracks of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Ecosystem {
    food: FoodBudget,
    temperature: AttributeTrack,
    hazard_rate: AttributeTrack,
}

impl Ecosystem {
    pub fn new(food: FoodBudget, temperature: AttributeTrack, hazard_rate: AttributeTrack) -> Self {
        Self {
            food,
            temperature,
            hazard_rate,
        }
    }

    /// Ecosystem with a fixed food supply and a static environment.
    pub fn with_constant_food(amount: f64) -> Self {
        Self {
            food: FoodBudget::constant(amount),
            temperature: AttributeTrack { values: vec![0.0] },
            hazard_rate: AttributeTrack { values: vec![0.0] },
        }
    }

    pub fn from_config<R: Rng + ?Sized>(
        config: &SimConfig,
        rng: &mut R,
    ) -> Result<Self, SimConfigError> {
        config.validate()?;
        let horizon = config.environment_horizon;
        let food = FoodBudget::from_policy(&config.food, horizon, rng);
        let temperature = AttributeTrack::generate(&config.temperature, horizon, rng);
        let hazard_rate = AttributeTrack::generate(&config.hazard_rate, horizon, rng);
        Ok(Self::new(food, temperature, hazard_rate))
    }

    pub fn food(&self) -> &FoodBudget {
        &self.food
    }

    pub fn available_food(&self, generation: usize) -> f64 {
        self.food.available_food(generation)
    }

    pub fn environment(&self, generation: usize) -> Environment {
        Environment {
            generation,
            temperature: self.temperature.value(generation),
            hazard_rate: self.hazard_rate.value(generation),
            available_food: self.available_food(generation),
        }
    }
}
