//! Regression trees over vectorized trip features
//!
//! Thresholds and leaves are integers at `SCALE`. A sparse row stores only
//! non-zero columns, so traversal treats any column it cannot find as zero.

use serde::{Deserialize, Serialize};

/// One node of a [`Tree`], stored flat in `Tree::nodes`.
///
/// Split nodes carry a column and threshold and point at two later nodes.
/// Leaves have `feature_idx == -1`, no children and a `leaf` value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    /// Index of this node in `Tree::nodes`
    pub id: i32,
    pub left: i32,
    pub right: i32,
    /// Vectorizer column tested at this node
    pub feature_idx: i32,
    /// Values `<= threshold` go left
    pub threshold: i64,
    pub leaf: Option<i64>,
}

impl Node {
    pub fn internal(id: i32, feature_idx: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    pub fn leaf(id: i32, value: i64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A boosted tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    pub nodes: Vec<Node>,
    /// Multiplier applied to leaf values, `SCALE` meaning 1.0
    pub weight: i64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: i64) -> Self {
        Self { nodes, weight }
    }

    /// Evaluate on a dense feature vector. Columns past the end read as zero.
    pub fn evaluate(&self, features: &[i64]) -> i64 {
        self.evaluate_with(|idx| features.get(idx).copied().unwrap_or(0))
    }

    /// Evaluate on a sparse row of `(column, value)` pairs sorted by column
    pub fn evaluate_sparse(&self, row: &[(usize, i64)]) -> i64 {
        self.evaluate_with(|idx| match row.binary_search_by_key(&idx, |&(col, _)| col) {
            Ok(pos) => row[pos].1,
            Err(_) => 0,
        })
    }

    /// Walk the tree reading feature values through `feature`
    pub fn evaluate_with<F>(&self, feature: F) -> i64
    where
        F: Fn(usize) -> i64,
    {
        let mut idx = 0usize;

        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0;
            };

            if node.is_leaf() {
                return node.leaf.unwrap_or(0);
            }

            let next = if feature(node.feature_idx as usize) <= node.threshold {
                node.left
            } else {
                node.right
            };

            if next < 0 {
                return 0;
            }
            idx = next as usize;
        }
    }

    /// Number of leaves
    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Children must exist and come after their parent; leaves need a value
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_leaf() {
                if node.left < 0 || node.left as usize >= self.nodes.len() {
                    return Err(format!("node {i} has left child {} out of range", node.left));
                }

                if node.right < 0 || node.right as usize >= self.nodes.len() {
                    return Err(format!("node {i} has right child {} out of range", node.right));
                }

                if node.left as usize <= i || node.right as usize <= i {
                    return Err(format!("node {i} points backwards"));
                }
            } else if node.leaf.is_none() {
                return Err(format!("leaf {i} has no value"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        // if feature[0] <= 50 -> 100 else 200
        Tree::new(
            vec![
                Node::internal(0, 0, 50, 1, 2),
                Node::leaf(1, 100),
                Node::leaf(2, 200),
            ],
            1_000_000,
        )
    }

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 3, 12345, 1, 2);
        assert!(!internal.is_leaf());

        let leaf = Node::leaf(1, -234);
        assert_eq!(leaf.feature_idx, -1);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.leaf, Some(-234));
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();

        assert_eq!(tree.evaluate(&[30]), 100);
        assert_eq!(tree.evaluate(&[50]), 100); // Equal goes left
        assert_eq!(tree.evaluate(&[60]), 200);
        assert_eq!(tree.evaluate(&[]), 100); // Missing column reads as zero
    }

    #[test]
    fn test_sparse_matches_dense() {
        let tree = Tree::new(
            vec![
                Node::internal(0, 2, 0, 1, 2),
                Node::leaf(1, -5),
                Node::leaf(2, 5),
            ],
            1_000_000,
        );

        assert_eq!(tree.evaluate_sparse(&[(2, 1)]), tree.evaluate(&[0, 0, 1]));
        assert_eq!(tree.evaluate_sparse(&[(0, 7)]), tree.evaluate(&[7, 0, 0]));
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate().is_ok());

        let invalid_tree = Tree::new(
            vec![
                Node::internal(0, 0, 50, 5, 2),
                Node::leaf(1, 100),
                Node::leaf(2, 200),
            ],
            1_000_000,
        );
        assert!(invalid_tree.validate().is_err());
        assert!(Tree::new(vec![], 1).validate().is_err());
    }
}
