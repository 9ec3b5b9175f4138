use std::sync::OnceLock;

use stoat_core::{Element, Matrix};

use crate::node::Node;

// Reductions to scalars and window pooling.

/// y = Σ x, a 1×1 matrix
pub struct ReduceSum<T: Element> {
    x: Node<T>,
}

impl<T: Element> ReduceSum<T> {
    pub fn new(x: Node<T>) -> Self {
        ReduceSum { x }
    }

    pub fn forward(&self) -> Matrix<T> {
        Matrix::scalar(self.x.value().sum())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(
            gy.is_scalar(),
            "reduce_sum: the incoming gradient must be scalar"
        );
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        self.x
            .propagate_grad(Matrix::full(xv.rows(), xv.cols(), gy.scalar_value()));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = (Σ x) / n, a 1×1 matrix. The gradient is 1/n broadcast.
pub struct ReduceMean<T: Element> {
    x: Node<T>,
}

impl<T: Element> ReduceMean<T> {
    pub fn new(x: Node<T>) -> Self {
        ReduceMean { x }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let n = T::from_f64(xv.size() as f64);
        Matrix::scalar(xv.sum() / n)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(
            gy.is_scalar(),
            "reduce_mean: the incoming gradient must be scalar"
        );
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let n = T::from_f64(xv.size() as f64);
        self.x
            .propagate_grad(Matrix::full(xv.rows(), xv.cols(), gy.scalar_value() / n));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y[r, c] = max over the pool_rows×pool_cols window of x.
/// The operand dimensions must be divisible by the window dimensions.
pub struct MaxPooling<T: Element> {
    x: Node<T>,
    pool_rows: usize,
    pool_cols: usize,
    /// Flat operand index of the winner per output cell, cached by forward.
    argmax: OnceLock<Vec<usize>>,
}

impl<T: Element> MaxPooling<T> {
    pub fn new(x: Node<T>, pool_rows: usize, pool_cols: usize) -> Self {
        assert!(pool_rows > 0 && pool_cols > 0, "max_pooling: empty window");
        MaxPooling {
            x,
            pool_rows,
            pool_cols,
            argmax: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        assert!(
            xv.rows() % self.pool_rows == 0 && xv.cols() % self.pool_cols == 0,
            "max_pooling: {}x{} input not divisible by {}x{} window",
            xv.rows(),
            xv.cols(),
            self.pool_rows,
            self.pool_cols
        );
        let out_rows = xv.rows() / self.pool_rows;
        let out_cols = xv.cols() / self.pool_cols;
        let mut buf = T::pool().get_raw(out_rows * out_cols);
        let mut argmax = vec![0usize; out_rows * out_cols];
        for r in 0..out_rows {
            for c in 0..out_cols {
                let mut best = T::neg_infinity();
                let mut best_idx = 0;
                for pr in 0..self.pool_rows {
                    for pc in 0..self.pool_cols {
                        let i = r * self.pool_rows + pr;
                        let j = c * self.pool_cols + pc;
                        let v = xv.at(i, j);
                        if v > best {
                            best = v;
                            best_idx = i * xv.cols() + j;
                        }
                    }
                }
                buf[r * out_cols + c] = best;
                argmax[r * out_cols + c] = best_idx;
            }
        }
        self.argmax.set(argmax).ok();
        Matrix::new(out_rows, out_cols, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let argmax = self
            .argmax
            .get()
            .expect("max_pooling: backward before forward");
        assert_eq!(gy.size(), argmax.len(), "max_pooling: gradient shape mismatch");
        let xv = self.x.value();
        let mut buf = T::pool().get_zeroed(xv.size());
        for (&idx, &gv) in argmax.iter().zip(gy.data().iter()) {
            buf[idx] = buf[idx] + gv;
        }
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_reduce_sum() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0]), true);
        let f = ReduceSum::new(x.clone());
        assert_eq!(f.forward().to_f64_vec(), vec![6.0]);

        f.backward(&Matrix::scalar(0.5));
        assert_eq!(x.grad().unwrap().to_f64_vec(), vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_reduce_mean_grad_is_one_over_n() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0, 4.0]), true);
        let f = ReduceMean::new(x.clone());
        assert_eq!(f.forward().to_f64_vec(), vec![2.5]);

        f.backward(&Matrix::scalar(1.0));
        assert_eq!(x.grad().unwrap().to_f64_vec(), vec![0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_max_pooling() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(
            Matrix::from_slice(
                2,
                4,
                &[
                    1.0, 5.0, 2.0, 0.0, //
                    3.0, 4.0, 1.0, 6.0,
                ],
            ),
            true,
        );
        let f = MaxPooling::new(x.clone(), 2, 2);
        let y = f.forward();
        assert_eq!(y.rows(), 1);
        assert_eq!(y.cols(), 2);
        assert_eq!(y.to_f64_vec(), vec![5.0, 6.0]);

        f.backward(&Matrix::new(1, 2, vec![0.1, 0.2]));
        assert_eq!(
            x.grad().unwrap().to_f64_vec(),
            vec![0.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.2]
        );
    }

    #[test]
    #[should_panic(expected = "not divisible")]
    fn test_max_pooling_shape_guard() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::zeros(3, 3), false);
        let f = MaxPooling::new(x, 2, 2);
        let _ = f.forward();
    }
}
