use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::constants::{RNG_DERIVATION_PRIME, TRUNCATED_NORMAL_MAX_ATTEMPTS};

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// Derive a sub-RNG for a specific stream, ensuring independent sequences.
pub fn derive_stream_rng(base_seed: u64, stream_id: usize) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(
        base_seed.wrapping_add((stream_id as u64).wrapping_mul(RNG_DERIVATION_PRIME)),
    )
}

/// Standard normal draw via the Box-Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Normal draw restricted to `[min, max]`.
///
/// Out-of-range samples are rejected; after a bounded number of attempts the
/// last sample is clamped so the call always terminates.
pub fn truncated_normal<R: Rng + ?Sized>(
    rng: &mut R,
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
) -> f64 {
    debug_assert!(min <= max, "truncation bounds must be ordered");
    if std <= 0.0 {
        return mean.clamp(min, max);
    }
    let mut sample = mean;
    for _ in 0..TRUNCATED_NORMAL_MAX_ATTEMPTS {
        sample = mean + std * standard_normal(rng);
        if (min..=max).contains(&sample) {
            return sample;
        }
    }
    sample.clamp(min, max)
}
