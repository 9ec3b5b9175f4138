//! # stoat-nn
//!
//! Layer helpers on top of the Stoat computation graph. These are thin:
//! every layer is a composition of graph operators, so forward scheduling
//! and backpropagation come entirely from the engine.

pub mod affine;
pub mod lstm;

pub use affine::affine;
pub use lstm::{Lstm, LstmState};
