use std::fmt;
use std::sync::OnceLock;

use crate::pool::Pool;

// Element — Trait that connects Rust float types to the engine
//
// The graph, the matrix type, and every operator kernel are generic over
// the element type. The engine only ever needs IEEE float semantics plus a
// handle to the per-type buffer pool, so the trait is small.

/// Trait implemented by Rust types that can be stored in a [`Matrix`].
///
/// Provides float arithmetic (via `num_traits::Float`), conversions to and
/// from `f64` for generic numeric code, and the per-type global buffer pool.
///
/// [`Matrix`]: crate::Matrix
pub trait Element:
    num_traits::Float
    + num_traits::NumCast
    + std::iter::Sum
    + Copy
    + Default
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + 'static
{
    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// The global buffer pool for this element type.
    fn pool() -> &'static Pool<Self>;
}

impl Element for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn pool() -> &'static Pool<f32> {
        static POOL: OnceLock<Pool<f32>> = OnceLock::new();
        POOL.get_or_init(Pool::new)
    }
}

impl Element for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn pool() -> &'static Pool<f64> {
        static POOL: OnceLock<Pool<f64>> = OnceLock::new();
        POOL.get_or_init(Pool::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_roundtrip() {
        assert_eq!(f32::from_f64(3.14).to_f64(), 3.140000104904175); // f32 precision
        assert_eq!(f64::from_f64(3.14).to_f64(), 3.14);
    }

    #[test]
    fn test_pool_is_shared() {
        let a = f32::pool() as *const _;
        let b = f32::pool() as *const _;
        assert_eq!(a, b);
    }
}
