/// Largest population a single generation may hold.
pub const MAX_POPULATION_SIZE: usize = 1_000_000;

/// Prime multiplier used to derive independent RNG streams from a base seed.
pub const RNG_DERIVATION_PRIME: u64 = 7919;

/// Stream ID used for the ecosystem's environment tracks.
pub const ECOSYSTEM_RNG_STREAM: usize = 1;

/// Rejection-sampling attempts before a truncated normal draw falls back to clamping.
pub const TRUNCATED_NORMAL_MAX_ATTEMPTS: usize = 64;

/// Population size at which fitness evaluation moves onto the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 2048;

/// Number of generations of environment values generated up front.
pub const DEFAULT_ENVIRONMENT_HORIZON: usize = 1000;
