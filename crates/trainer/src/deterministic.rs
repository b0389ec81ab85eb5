//! Deterministic utilities for reproducible training
//!
//! Row subsampling is driven by an LCG so that a given seed yields the same
//! rows, and therefore the same model, on every platform.

use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.wrapping_abs() % Self::MODULUS),
        }
    }

    /// Next value in `[0, 2^31)`
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Next value in `[0, 1_000_000)`, a unit interval draw in micro units
    pub fn next_unit_micro(&mut self) -> i64 {
        (self.next_i64() * 1_000_000) / Self::MODULUS
    }

    /// Rows of `0..n` kept by a Bernoulli draw with probability `fraction`.
    ///
    /// A fraction of 1.0 or more keeps every row without consuming draws.
    /// An empty draw falls back to all rows so a tree always has data.
    pub fn sample_rows(&mut self, n: usize, fraction: f64) -> Vec<usize> {
        if fraction >= 1.0 {
            return (0..n).collect();
        }

        let cutoff = (fraction * 1_000_000.0).round() as i64;
        let rows: Vec<usize> = (0..n)
            .filter(|_| self.next_unit_micro() < cutoff)
            .collect();

        if rows.is_empty() {
            (0..n).collect()
        } else {
            rows
        }
    }
}

/// Deterministic tie-breaker for split selection
/// Orders candidates by (feature_idx, threshold, node_id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: i64,
    pub node_id: u64,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: i64, node_id: u64) -> Self {
        Self {
            feature_idx,
            threshold,
            node_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_unit_micro_range() {
        let mut rng = LcgRng::new(7);
        for _ in 0..1000 {
            let val = rng.next_unit_micro();
            assert!((0..1_000_000).contains(&val));
        }
    }

    #[test]
    fn test_sample_rows() {
        let mut rng = LcgRng::new(42);
        assert_eq!(rng.sample_rows(5, 1.0), vec![0, 1, 2, 3, 4]);

        let half = LcgRng::new(42).sample_rows(1000, 0.5);
        assert!(half.len() > 350 && half.len() < 650, "kept {}", half.len());
        assert!(half.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(half, LcgRng::new(42).sample_rows(1000, 0.5));
    }

    #[test]
    fn test_tie_breaker_ordering() {
        let t1 = SplitTieBreaker::new(0, 100, 0);
        let t2 = SplitTieBreaker::new(0, 100, 1);
        let t3 = SplitTieBreaker::new(1, 50, 0);

        assert!(t1 < t2);
        assert!(t1 < t3);
    }
}
