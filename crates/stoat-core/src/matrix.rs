use std::sync::Arc;

use crate::element::Element;

// Matrix — The dense 2-D value type the engine computes with
//
// Every node value and every gradient in the graph is a Matrix. The engine
// composes a small surface: shape-preserving arithmetic, matmul, transpose,
// reshape, reductions, and elementwise maps. Column vectors are n×1
// matrices; scalars are 1×1.
//
// MEMORY MODEL:
//
//   The inner data is wrapped in Arc, so cloning a Matrix is cheap (one
//   refcount increment) and a published operator value can be handed to
//   many concurrent readers without copying. In-place accumulation
//   (gradients) goes through Arc::make_mut: it mutates directly while the
//   handle is unique and copies first when it is shared.
//
//   Buffers come from the per-element-type Pool and go back to it through
//   release(), which recycles the allocation when this handle is the last.
//
// SHAPE FAULTS:
//
//   Mismatched shapes panic. A shape fault inside a kernel is a bug in the
//   calling code, not a condition to recover from.

struct Inner<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Element> Clone for Inner<T> {
    fn clone(&self) -> Self {
        let mut data = T::pool().get_raw(self.data.len());
        data.copy_from_slice(&self.data);
        Inner {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }
}

/// A dense, row-major 2-D matrix. Clones are cheap handles sharing the
/// same storage.
pub struct Matrix<T: Element> {
    inner: Arc<Inner<T>>,
}

impl<T: Element> Clone for Matrix<T> {
    fn clone(&self) -> Self {
        Matrix {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> std::fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Matrix({}x{}, {:?})",
            self.inner.rows, self.inner.cols, self.inner.data
        )
    }
}

impl<T: Element> PartialEq for Matrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.rows == other.inner.rows
            && self.inner.cols == other.inner.cols
            && self.inner.data == other.inner.data
    }
}

impl<T: Element> Matrix<T> {
    // Constructors

    /// Create a matrix from a row-major data buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            rows * cols,
            data.len(),
            "matrix: {}x{} needs {} elements, got {}",
            rows,
            cols,
            rows * cols,
            data.len()
        );
        Matrix {
            inner: Arc::new(Inner { rows, cols, data }),
        }
    }

    /// Create a matrix copying a row-major slice; the buffer is drawn from
    /// the pool.
    pub fn from_slice(rows: usize, cols: usize, data: &[T]) -> Self {
        assert_eq!(
            rows * cols,
            data.len(),
            "matrix: {}x{} needs {} elements, got {}",
            rows,
            cols,
            rows * cols,
            data.len()
        );
        let mut buf = T::pool().get_raw(data.len());
        buf.copy_from_slice(data);
        Matrix::new(rows, cols, buf)
    }

    /// Create a column vector (n×1).
    pub fn vec(data: Vec<T>) -> Self {
        let rows = data.len();
        Matrix::new(rows, 1, data)
    }

    /// Create a column vector copying a slice.
    pub fn vec_from_slice(data: &[T]) -> Self {
        let mut buf = T::pool().get_raw(data.len());
        buf.copy_from_slice(data);
        Matrix::vec(buf)
    }

    /// Create a 1×1 matrix holding a single value.
    pub fn scalar(v: T) -> Self {
        Matrix::new(1, 1, vec![v])
    }

    /// Create a zero-filled matrix; the buffer is drawn from the pool.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix::new(rows, cols, T::pool().get_zeroed(rows * cols))
    }

    /// Create a zero-filled matrix with the same shape as this one.
    pub fn zeros_like(&self) -> Self {
        Matrix::zeros(self.inner.rows, self.inner.cols)
    }

    /// Create a matrix filled with a constant value.
    pub fn full(rows: usize, cols: usize, v: T) -> Self {
        let mut data = T::pool().get_raw(rows * cols);
        data.fill(v);
        Matrix::new(rows, cols, data)
    }

    // Shape

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.inner.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.inner.cols
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.inner.data.len()
    }

    /// Whether this is a 1×1 matrix.
    pub fn is_scalar(&self) -> bool {
        self.size() == 1
    }

    /// Whether this is a row or column vector.
    pub fn is_vector(&self) -> bool {
        self.inner.rows == 1 || self.inner.cols == 1
    }

    /// Whether `self` and `other` have identical dimensions.
    pub fn same_dims(&self, other: &Self) -> bool {
        self.inner.rows == other.inner.rows && self.inner.cols == other.inner.cols
    }

    /// Whether `self` and `other` are both vectors of the same length
    /// (orientation may differ).
    pub fn vectors_of_same_size(&self, other: &Self) -> bool {
        self.is_vector() && other.is_vector() && self.size() == other.size()
    }

    // Access

    /// The raw row-major data.
    pub fn data(&self) -> &[T] {
        &self.inner.data
    }

    /// Element at (i, j).
    pub fn at(&self, i: usize, j: usize) -> T {
        assert!(
            i < self.inner.rows && j < self.inner.cols,
            "matrix: index ({}, {}) out of bounds for {}x{}",
            i,
            j,
            self.inner.rows,
            self.inner.cols
        );
        self.inner.data[i * self.inner.cols + j]
    }

    /// The single value of a 1×1 matrix.
    pub fn scalar_value(&self) -> T {
        assert!(
            self.is_scalar(),
            "matrix: scalar_value on a {}x{} matrix",
            self.inner.rows,
            self.inner.cols
        );
        self.inner.data[0]
    }

    /// Copy the data out as f64 (for inspection and tests).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.inner.data.iter().map(|v| Element::to_f64(*v)).collect()
    }

    // Elementwise maps

    /// Apply `f` to every element, producing a new matrix.
    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        let mut data = T::pool().get_raw(self.size());
        for (out, &v) in data.iter_mut().zip(self.inner.data.iter()) {
            *out = f(v);
        }
        Matrix::new(self.inner.rows, self.inner.cols, data)
    }

    /// Combine two shape-compatible matrices elementwise. The operands must
    /// have the same dims or be vectors of the same length; the output takes
    /// `self`'s shape.
    pub fn zip_map(&self, other: &Self, f: impl Fn(T, T) -> T) -> Self {
        assert!(
            self.same_dims(other) || self.vectors_of_same_size(other),
            "matrix: incompatible shapes {}x{} and {}x{}",
            self.inner.rows,
            self.inner.cols,
            other.inner.rows,
            other.inner.cols
        );
        let mut data = T::pool().get_raw(self.size());
        for ((out, &a), &b) in data
            .iter_mut()
            .zip(self.inner.data.iter())
            .zip(other.inner.data.iter())
        {
            *out = f(a, b);
        }
        Matrix::new(self.inner.rows, self.inner.cols, data)
    }

    // Arithmetic

    /// Elementwise sum.
    pub fn add(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn prod(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    /// Elementwise quotient.
    pub fn div(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a / b)
    }

    /// Add a scalar to every element.
    pub fn add_scalar(&self, s: T) -> Self {
        self.map(|v| v + s)
    }

    /// Subtract a scalar from every element.
    pub fn sub_scalar(&self, s: T) -> Self {
        self.map(|v| v - s)
    }

    /// Multiply every element by a scalar.
    pub fn prod_scalar(&self, s: T) -> Self {
        self.map(|v| v * s)
    }

    /// Divide every element by a scalar.
    pub fn div_scalar(&self, s: T) -> Self {
        self.map(|v| v / s)
    }

    /// Subtract every element from a scalar: `s - x`.
    pub fn scalar_sub(&self, s: T) -> Self {
        self.map(|v| s - v)
    }

    /// Accumulate `other` into this matrix in place. Copies first when the
    /// storage is shared with another handle.
    pub fn add_assign(&mut self, other: &Self) {
        assert!(
            self.same_dims(other) || self.vectors_of_same_size(other),
            "matrix: incompatible shapes {}x{} and {}x{}",
            self.inner.rows,
            self.inner.cols,
            other.inner.rows,
            other.inner.cols
        );
        let inner = Arc::make_mut(&mut self.inner);
        for (a, &b) in inner.data.iter_mut().zip(other.inner.data.iter()) {
            *a = *a + b;
        }
    }

    // Linear algebra

    /// Matrix product `self @ other`. Inner dimensions must agree.
    pub fn matmul(&self, other: &Self) -> Self {
        let (m, k) = (self.inner.rows, self.inner.cols);
        let (k2, n) = (other.inner.rows, other.inner.cols);
        assert_eq!(
            k, k2,
            "matrix: matmul shape mismatch [{m}x{k}] @ [{k2}x{n}]"
        );
        let a = &self.inner.data;
        let b = &other.inner.data;
        let mut out = T::pool().get_zeroed(m * n);
        for i in 0..m {
            for p in 0..k {
                let av = a[i * k + p];
                if av == T::zero() {
                    continue;
                }
                let brow = &b[p * n..(p + 1) * n];
                let orow = &mut out[i * n..(i + 1) * n];
                for (o, &bv) in orow.iter_mut().zip(brow.iter()) {
                    *o = *o + av * bv;
                }
            }
        }
        Matrix::new(m, n, out)
    }

    /// Transpose.
    pub fn transpose(&self) -> Self {
        let (r, c) = (self.inner.rows, self.inner.cols);
        let mut out = T::pool().get_raw(r * c);
        for i in 0..r {
            for j in 0..c {
                out[j * r + i] = self.inner.data[i * c + j];
            }
        }
        Matrix::new(c, r, out)
    }

    /// Same data, different shape. The element count must match.
    pub fn reshape(&self, rows: usize, cols: usize) -> Self {
        assert_eq!(
            rows * cols,
            self.size(),
            "matrix: cannot reshape {}x{} into {}x{}",
            self.inner.rows,
            self.inner.cols,
            rows,
            cols
        );
        Matrix::from_slice(rows, cols, &self.inner.data)
    }

    // Reductions

    /// Sum of all elements.
    pub fn sum(&self) -> T {
        self.inner.data.iter().copied().sum()
    }

    /// Largest element.
    pub fn max_value(&self) -> T {
        self.inner
            .data
            .iter()
            .copied()
            .fold(T::neg_infinity(), T::max)
    }

    /// Smallest element.
    pub fn min_value(&self) -> T {
        self.inner.data.iter().copied().fold(T::infinity(), T::min)
    }

    // Lifecycle

    /// Drop this handle, returning the buffer to the pool when it is the
    /// last one. Shared storage is left to the remaining handles.
    pub fn release(self) {
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            T::pool().put(inner.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_access() {
        let m = Matrix::<f64>::from_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.at(1, 2), 6.0);
        assert!(!m.is_scalar());
        assert!(!m.is_vector());

        let v = Matrix::<f64>::vec_from_slice(&[1.0, 2.0]);
        assert!(v.is_vector());
        assert_eq!(v.rows(), 2);
        assert_eq!(v.cols(), 1);

        let s = Matrix::<f64>::scalar(7.0);
        assert!(s.is_scalar());
        assert_eq!(s.scalar_value(), 7.0);
    }

    #[test]
    #[should_panic(expected = "needs 6 elements")]
    fn test_bad_construction_panics() {
        let _ = Matrix::<f64>::new(2, 3, vec![1.0; 5]);
    }

    #[test]
    fn test_elementwise() {
        let a = Matrix::<f64>::vec_from_slice(&[1.0, 2.0, 3.0]);
        let b = Matrix::<f64>::vec_from_slice(&[4.0, 5.0, 6.0]);
        assert_eq!(a.add(&b).to_f64_vec(), vec![5.0, 7.0, 9.0]);
        assert_eq!(a.sub(&b).to_f64_vec(), vec![-3.0, -3.0, -3.0]);
        assert_eq!(a.prod(&b).to_f64_vec(), vec![4.0, 10.0, 18.0]);
        assert_eq!(b.div(&a).to_f64_vec(), vec![4.0, 2.5, 2.0]);
        assert_eq!(a.prod_scalar(2.0).to_f64_vec(), vec![2.0, 4.0, 6.0]);
        assert_eq!(a.scalar_sub(10.0).to_f64_vec(), vec![9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_row_and_column_vectors_are_compatible() {
        let a = Matrix::<f64>::new(1, 3, vec![1.0, 2.0, 3.0]);
        let b = Matrix::<f64>::new(3, 1, vec![1.0, 1.0, 1.0]);
        // Output takes the left operand's orientation.
        let y = a.add(&b);
        assert_eq!(y.rows(), 1);
        assert_eq!(y.to_f64_vec(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    #[should_panic(expected = "incompatible shapes")]
    fn test_shape_mismatch_panics() {
        let a = Matrix::<f64>::zeros(2, 3);
        let b = Matrix::<f64>::zeros(3, 2);
        let _ = a.add(&b);
    }

    #[test]
    fn test_matmul() {
        let a = Matrix::<f64>::from_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Matrix::<f64>::from_slice(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b);
        assert_eq!(c.rows(), 2);
        assert_eq!(c.cols(), 2);
        assert_eq!(c.to_f64_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_transpose_and_reshape() {
        let m = Matrix::<f64>::from_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = m.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.to_f64_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let r = m.reshape(3, 2);
        assert_eq!(r.to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_reductions() {
        let m = Matrix::<f64>::vec_from_slice(&[3.0, -1.0, 2.0]);
        assert_eq!(m.sum(), 4.0);
        assert_eq!(m.max_value(), 3.0);
        assert_eq!(m.min_value(), -1.0);
    }

    #[test]
    fn test_add_assign_copy_on_write() {
        let mut a = Matrix::<f64>::vec_from_slice(&[1.0, 2.0]);
        let shared = a.clone();
        let b = Matrix::<f64>::vec_from_slice(&[10.0, 20.0]);
        a.add_assign(&b);
        assert_eq!(a.to_f64_vec(), vec![11.0, 22.0]);
        // The shared handle still sees the original values.
        assert_eq!(shared.to_f64_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_release_recycles_unique_buffers() {
        // 17 is an odd size no other test allocates.
        let before = f64::pool().bucket_len(17);
        let m = Matrix::<f64>::zeros(17, 1);
        m.release();
        assert_eq!(f64::pool().bucket_len(17), before + 1);

        // A shared handle keeps the buffer alive: no recycling.
        let m = Matrix::<f64>::zeros(17, 1);
        let keep = m.clone();
        m.release();
        assert_eq!(f64::pool().bucket_len(17), before);
        drop(keep);
    }
}
