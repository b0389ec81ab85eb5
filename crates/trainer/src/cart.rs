//! CART (Classification and Regression Tree) builder
//!
//! Grows one regression tree from per-row gradient statistics over sparse
//! fixed-point rows. Split candidates come from quantized value buckets of
//! each column; rows that do not store a column (implicit zeros) are
//! accounted for as part of the zero bucket.

use std::collections::BTreeMap;
use taxi_duration_core::{to_fixed, Node, Tree, SCALE};

use crate::deterministic::SplitTieBreaker;

/// Minimum loss reduction for a split to be kept
pub const MIN_SPLIT_GAIN: f64 = 1e-6;

/// Training parameters for a single tree
#[derive(Clone, Debug, PartialEq)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Shrinkage applied to leaf weights
    pub learning_rate: f64,
    /// Bucket width for split candidates, fixed-point
    pub quant_step: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_child_weight: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            learning_rate: 0.3,
            quant_step: 10_000,
        }
    }
}

/// L1 soft-threshold of a gradient sum
pub fn soft_threshold(gradient: f64, alpha: f64) -> f64 {
    if gradient > alpha {
        gradient - alpha
    } else if gradient < -alpha {
        gradient + alpha
    } else {
        0.0
    }
}

/// Gradient, hessian and row count of a set of rows
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct GradStats {
    gradient: f64,
    hessian: f64,
    count: usize,
}

impl GradStats {
    fn add(&mut self, gradient: f64, hessian: f64) {
        self.gradient += gradient;
        self.hessian += hessian;
        self.count += 1;
    }

    fn merge(self, other: GradStats) -> Self {
        Self {
            gradient: self.gradient + other.gradient,
            hessian: self.hessian + other.hessian,
            count: self.count + other.count,
        }
    }

    fn minus(self, other: GradStats) -> Self {
        Self {
            gradient: self.gradient - other.gradient,
            hessian: self.hessian - other.hessian,
            count: self.count.saturating_sub(other.count),
        }
    }
}

/// Rows of one column falling in one quantization bucket
#[derive(Clone, Copy, Debug)]
struct Bucket {
    stats: GradStats,
    /// Largest raw value seen, used as the split threshold
    max_value: i64,
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: i64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: i64, gain: f64, node_id: u64) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold, node_id),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

/// Build a regression tree using exact-greedy search over quantized buckets
pub struct CartBuilder<'a> {
    config: TreeConfig,
    rows: &'a [Vec<(usize, i64)>],
    gradients: &'a [f64],
    hessians: &'a [f64],
}

impl<'a> CartBuilder<'a> {
    /// `rows` are sparse fixed-point rows sorted by column
    pub fn new(
        rows: &'a [Vec<(usize, i64)>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(rows.len(), gradients.len());
        debug_assert_eq!(rows.len(), hessians.len());

        Self {
            config,
            rows,
            gradients,
            hessians,
        }
    }

    /// Grow a tree over the rows in `sample`
    pub fn build(&self, sample: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(sample.to_vec(), 0, 0, &mut nodes);
        Tree::new(nodes, SCALE)
    }

    /// Recursively build tree nodes, returning the index of the created node
    fn build_node(
        &self,
        indices: Vec<usize>,
        depth: usize,
        node_id: u64,
        nodes: &mut Vec<Node>,
    ) -> i32 {
        let current = nodes.len() as i32;
        let total = self.sum_stats(&indices);
        let leaf_value = self.leaf_value(total);

        if depth >= self.config.max_depth
            || indices.len() < 2
            || total.hessian < 2.0 * self.config.min_child_weight
        {
            nodes.push(Node::leaf(current, leaf_value));
            return current;
        }

        let Some(split) = self.find_best_split(&indices, total, node_id) else {
            nodes.push(Node::leaf(current, leaf_value));
            return current;
        };

        let (left_indices, right_indices) =
            self.partition(&indices, split.feature_idx, split.threshold);
        drop(indices);

        // Children are filled in once their subtrees exist
        nodes.push(Node::internal(
            current,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_id = node_id.saturating_mul(2).saturating_add(1);
        let right_id = node_id.saturating_mul(2).saturating_add(2);
        let left = self.build_node(left_indices, depth + 1, left_id, nodes);
        let right = self.build_node(right_indices, depth + 1, right_id, nodes);

        nodes[current as usize].left = left;
        nodes[current as usize].right = right;

        current
    }

    /// Best split over every column stored by a row of the node
    fn find_best_split(
        &self,
        indices: &[usize],
        total: GradStats,
        node_id: u64,
    ) -> Option<SplitCandidate> {
        let step = self.config.quant_step.max(1);
        let mut columns: BTreeMap<usize, BTreeMap<i64, Bucket>> = BTreeMap::new();

        for &row in indices {
            let (gradient, hessian) = (self.gradients[row], self.hessians[row]);
            for &(feature_idx, value) in &self.rows[row] {
                let bucket = columns
                    .entry(feature_idx)
                    .or_default()
                    .entry(value.div_euclid(step))
                    .or_insert(Bucket {
                        stats: GradStats::default(),
                        max_value: value,
                    });
                bucket.stats.add(gradient, hessian);
                bucket.max_value = bucket.max_value.max(value);
            }
        }

        let mut best: Option<SplitCandidate> = None;

        for (feature_idx, mut buckets) in columns {
            let stored = buckets
                .values()
                .fold(GradStats::default(), |acc, bucket| acc.merge(bucket.stats));
            let zeros = total.minus(stored);
            if zeros.count > 0 {
                let bucket = buckets.entry(0).or_insert(Bucket {
                    stats: GradStats::default(),
                    max_value: 0,
                });
                bucket.stats = bucket.stats.merge(zeros);
                bucket.max_value = bucket.max_value.max(0);
            }

            // The last bucket would leave the right child empty
            let candidates = buckets.len().saturating_sub(1);
            let mut left = GradStats::default();

            for bucket in buckets.values().take(candidates) {
                left = left.merge(bucket.stats);
                let right = total.minus(left);

                if left.hessian < self.config.min_child_weight
                    || right.hessian < self.config.min_child_weight
                {
                    continue;
                }

                let gain = self.split_gain(left, right, total);
                if gain <= MIN_SPLIT_GAIN {
                    continue;
                }

                let candidate = SplitCandidate::new(feature_idx, bucket.max_value, gain, node_id);
                best = match best {
                    Some(current) if !candidate.beats(&current) => Some(current),
                    _ => Some(candidate),
                };
            }
        }

        best
    }

    /// Split rows on `value <= threshold`, reading absent columns as zero
    fn partition(
        &self,
        indices: &[usize],
        feature_idx: usize,
        threshold: i64,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .copied()
            .partition(|&row| feature_value(&self.rows[row], feature_idx) <= threshold)
    }

    /// Loss reduction: `½ [S(L) + S(R) − S(parent)]`
    fn split_gain(&self, left: GradStats, right: GradStats, parent: GradStats) -> f64 {
        0.5 * (self.structure_score(left) + self.structure_score(right)
            - self.structure_score(parent))
    }

    /// `T_α(G)² / (H + λ)`
    fn structure_score(&self, stats: GradStats) -> f64 {
        let denom = stats.hessian + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let g = soft_threshold(stats.gradient, self.config.reg_alpha);
        g * g / denom
    }

    fn sum_stats(&self, indices: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &row in indices {
            stats.add(self.gradients[row], self.hessians[row]);
        }
        stats
    }

    /// Shrunk optimal leaf weight `−η · T_α(G) / (H + λ)`, fixed-point
    fn leaf_value(&self, stats: GradStats) -> i64 {
        let denom = stats.hessian + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0;
        }
        let weight = -soft_threshold(stats.gradient, self.config.reg_alpha) / denom;
        to_fixed(self.config.learning_rate * weight)
    }
}

fn feature_value(row: &[(usize, i64)], feature_idx: usize) -> i64 {
    match row.binary_search_by_key(&feature_idx, |&(col, _)| col) {
        Ok(pos) => row[pos].1,
        Err(_) => 0,
    }
}
