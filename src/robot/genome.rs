//! Random number generation for genome construction and mutation.

use rand::prelude::*;
use rand::seq::index;
use uuid::Builder;

use super::ModuleId;

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform random in bounds.
    pub fn uniform(&mut self, bounds: (f32, f32)) -> f32 {
        self.rng.gen_range(bounds.0..=bounds.1)
    }

    /// Gaussian sample around `mean`.
    pub fn gaussian(&mut self, mean: f32, sigma: f32) -> f32 {
        let noise: f32 = self.rng.sample(rand_distr::StandardNormal);
        mean + noise * sigma
    }

    /// Gaussian mutation: add noise scaled by the range width, then clamp.
    pub fn gaussian_mutate(&mut self, value: f32, strength: f32, bounds: (f32, f32)) -> f32 {
        let mutated = self.gaussian(value, strength * (bounds.1 - bounds.0));
        mutated.clamp(bounds.0, bounds.1)
    }

    /// Bernoulli trial; probabilities outside [0, 1] saturate.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.r#gen::<f64>() < probability
    }

    /// Uniform index below `len` (`len` must be non-zero).
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Pick one element uniformly.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    /// `amount` distinct indices below `len`, in random order.
    pub fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        index::sample(&mut self.rng, len, amount.min(len)).into_vec()
    }

    /// Fresh module identifier. Derived from the generator so seeded runs
    /// reproduce their module names.
    pub fn module_id(&mut self) -> ModuleId {
        let bytes: [u8; 16] = self.rng.r#gen();
        ModuleId::from(Builder::from_random_bytes(bytes).into_uuid().to_string())
    }
}
