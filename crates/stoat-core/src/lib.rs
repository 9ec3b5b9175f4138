//! # stoat-core
//!
//! Matrix primitives and shared types for Stoat.
//!
//! This crate provides:
//! - [`Matrix`] — a dense 2-D matrix with cheap (`Arc`-backed) clones
//! - [`Element`] — the trait bridging Rust float types to the engine
//! - [`Pool`] — a thread-safe buffer pool backing `zeros_like`/`release`
//! - [`Error`] / [`Result`] — the error type shared by all Stoat crates

pub mod element;
pub mod error;
pub mod matrix;
pub mod pool;

pub use element::Element;
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use pool::Pool;
