//! Deterministic RNG wrapper (C1, §4.1).
//!
//! Every stochastic operation in the core — candidate pool generation,
//! packing moves, orientation sampling, crystallography matching — draws
//! from one `DeterministicRng` built from the run seed. Sub-streams (one per
//! pipeline stage) are derived by hashing the base seed rather than by
//! reseeding the live stream in place, so a fixed top-level seed produces a
//! fixed trace independent of how many draws an earlier stage happened to
//! make.

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// Wrapper around PCG64 for deterministic, reproducible sampling.
#[derive(Clone)]
pub struct DeterministicRng {
    inner: Pcg64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        DeterministicRng {
            inner: Pcg64::seed_from_u64(seed),
        }
    }

    /// Derive a seed for a named pipeline stage from the base seed.
    ///
    /// Uses a simple splitmix-style finalizer rather than a full hash crate:
    /// the core only needs a handful of well-distributed sub-seeds, not a
    /// cryptographic mix.
    pub fn derive_stage_seed(base_seed: u64, stage_tag: &str) -> u64 {
        let mut h: u64 = base_seed ^ 0x9E3779B97F4A7C15;
        for byte in stage_tag.bytes() {
            h ^= byte as u64;
            h = h.wrapping_mul(0x100000001B3);
        }
        h ^= h >> 33;
        h = h.wrapping_mul(0xFF51AFD7ED558CCD);
        h ^= h >> 33;
        h
    }

    /// Uniform sample in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform integer sample in `[0, n)`. Panics if `n == 0`.
    #[inline]
    pub fn uniform_index(&mut self, n: usize) -> usize {
        Uniform::from(0..n).sample(&mut self.inner)
    }

    /// Normal sample via Box-Muller, using the polar form to avoid a
    /// trigonometric call.
    pub fn normal(&mut self, mean: f64, stdev: f64) -> f64 {
        loop {
            let u1 = 2.0 * self.uniform() - 1.0;
            let u2 = 2.0 * self.uniform() - 1.0;
            let s = u1 * u1 + u2 * u2;
            if s > 0.0 && s < 1.0 {
                let mul = (-2.0 * s.ln() / s).sqrt();
                return mean + stdev * u1 * mul;
            }
        }
    }

    /// Gamma-distributed sample via Marsaglia-Tsang for `shape >= 1`, with
    /// the Ahrens-Dieter boost-by-one trick for `0 < shape < 1`.
    pub fn gamma(&mut self, shape: f64) -> f64 {
        if shape < 1.0 {
            let u = self.uniform();
            return self.gamma(shape + 1.0) * u.powf(1.0 / shape);
        }
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let mut x;
            let mut v;
            loop {
                x = self.normal(0.0, 1.0);
                v = 1.0 + c * x;
                if v > 0.0 {
                    break;
                }
            }
            v = v * v * v;
            let u = self.uniform();
            if u < 1.0 - 0.0331 * x.powi(4) {
                return d * v;
            }
            if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }

    /// Beta(α, β) sample via the ratio-of-two-gammas construction (§4.1).
    /// Correct for any `α, β ∈ (0, ∞)`.
    pub fn beta(&mut self, alpha: f64, beta: f64) -> f64 {
        let x = self.gamma(alpha);
        let y = self.gamma(beta);
        if x + y <= 0.0 {
            return 0.5;
        }
        x / (x + y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = DeterministicRng::new(42);
        let mut b = DeterministicRng::new(42);
        for _ in 0..200 {
            assert_eq!(a.uniform(), b.uniform());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = DeterministicRng::new(1);
        let mut b = DeterministicRng::new(2);
        assert!((0..20).any(|_| a.uniform() != b.uniform()));
    }

    #[test]
    fn derived_stage_seeds_differ_by_tag() {
        let a = DeterministicRng::derive_stage_seed(7, "packing");
        let b = DeterministicRng::derive_stage_seed(7, "matcher");
        assert_ne!(a, b);
        assert_eq!(a, DeterministicRng::derive_stage_seed(7, "packing"));
    }

    #[test]
    fn beta_samples_land_in_unit_interval() {
        let mut rng = DeterministicRng::new(99);
        for _ in 0..500 {
            let v = rng.beta(2.0, 5.0);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn beta_mean_is_approximately_alpha_over_alpha_plus_beta() {
        let mut rng = DeterministicRng::new(123);
        let (alpha, beta) = (2.0, 3.0);
        let n = 20_000;
        let sum: f64 = (0..n).map(|_| rng.beta(alpha, beta)).sum();
        let mean = sum / n as f64;
        assert!((mean - alpha / (alpha + beta)).abs() < 0.02);
    }

    #[test]
    fn gamma_samples_are_nonnegative() {
        let mut rng = DeterministicRng::new(5);
        for _ in 0..500 {
            assert!(rng.gamma(0.3) >= 0.0);
            assert!(rng.gamma(3.0) >= 0.0);
        }
    }
}
