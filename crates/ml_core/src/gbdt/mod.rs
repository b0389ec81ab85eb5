//! Fixed-point Gradient Boosted Decision Tree model format
//!
//! - Trees store integer thresholds and leaf values at `SCALE` (1e6)
//! - Traversal sends `value <= threshold` left; absent sparse columns read as zero
//! - Models serialize to canonical JSON and are identified by a blake3 hash
//!
//! ```rust
//! use taxi_duration_core::gbdt::{Model, Node, Tree, SCALE};
//!
//! let tree = Tree::new(
//!     vec![
//!         Node::internal(0, 0, 5 * SCALE, 1, 2),
//!         Node::leaf(1, 10 * SCALE),
//!         Node::leaf(2, 20 * SCALE),
//!     ],
//!     SCALE,
//! );
//! let model = Model::new(vec![tree], 0, 1);
//! assert_eq!(model.score(&[3 * SCALE]), 10 * SCALE);
//! ```

pub mod model;
pub mod tree;

pub use model::{fixed_row, from_fixed, to_fixed, Model, SCALE};
pub use tree::{Node, Tree};
