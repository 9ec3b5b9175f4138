//! # Stoat
//!
//! A define-by-run automatic differentiation engine in Rust.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use stoat::prelude::*;
//!
//! let g: Graph<f64> = Graph::new();
//! let x = g.new_variable(Matrix::vec_from_slice(&[0.1, -0.2, 0.3]), true);
//! let loss = g.reduce_sum(&g.relu(&x));
//! g.backward(&loss).unwrap();
//! assert_eq!(x.grad().unwrap().to_f64_vec(), vec![1.0, 0.0, 1.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `stoat-core` | Matrix, element traits, buffer pool, errors |
//! | `stoat-ag` | Graph, nodes, operator catalog, gradient engine |
//! | `stoat-nn` | Layer helpers consuming the graph API |

/// Re-export core types.
pub use stoat_core::{Element, Error, Matrix, Pool, Result};

/// Re-export the computation graph.
pub use stoat_ag::{
    release_operators, wait_for_all, BackwardOptions, Function, Graph, GraphConfig, Mode, Node,
    OpName,
};

/// Re-export layer helpers.
pub mod nn {
    pub use stoat_nn::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{affine, Lstm, LstmState};
    pub use crate::{
        release_operators, BackwardOptions, Element, Graph, GraphConfig, Matrix, Mode, Node,
        OpName, Result,
    };
}
