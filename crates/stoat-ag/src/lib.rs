//! # stoat-ag
//!
//! The define-by-run computation graph at the heart of Stoat.
//!
//! Tensor operations are recorded as they are invoked: every call to a
//! [`Graph`] factory creates an operator node and immediately starts
//! computing its forward value on a fresh task. Consumers that read a value
//! block until it is published. Reverse-mode gradients are computed on
//! demand by [`Graph::backward`], which schedules operator backwards as
//! soon as all of their downstream contributions have accumulated.
//!
//! ```ignore
//! use stoat_ag::Graph;
//! use stoat_core::Matrix;
//!
//! let g: Graph<f64> = Graph::new();
//! let x = g.new_variable(Matrix::vec_from_slice(&[0.1, -0.2, 0.3]), true);
//! let y = g.relu(&x);
//! g.backward(&y)?; // seeds with ones when the root is scalar
//! let gx = x.grad();
//! ```

pub mod backward;
pub mod fns;
pub mod graph;
pub mod node;
pub mod operator;
pub mod opname;
pub mod ops;
pub mod track;

pub use backward::BackwardOptions;
pub use fns::Function;
pub use graph::{release_operators, Graph, GraphConfig, Mode};
pub use node::Node;
pub use opname::OpName;
pub use track::wait_for_all;
