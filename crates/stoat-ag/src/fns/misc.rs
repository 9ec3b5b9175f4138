use std::sync::{Arc, Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::Rng;

use stoat_core::{Element, Matrix};

use super::shaped_like;
use crate::node::Node;

// Stochastic and variadic primitives: dropout, vector concatenation,
// stacking, and elementwise list aggregation.

/// y = x ∘ mask, inverted dropout. In inference mode (or with p = 0) the
/// mask is conceptually all-ones and no scaling occurs. The sampled mask
/// is retained in the record so backward applies the same one.
pub struct Dropout<T: Element> {
    x: Node<T>,
    p: T,
    active: bool,
    rng: Arc<Mutex<StdRng>>,
    mask: OnceLock<Option<Matrix<T>>>,
}

impl<T: Element> Dropout<T> {
    pub fn new(x: Node<T>, p: T, active: bool, rng: Arc<Mutex<StdRng>>) -> Self {
        let pf = p.to_f64();
        assert!(
            (0.0..=1.0).contains(&pf),
            "dropout: probability {} outside [0, 1]",
            pf
        );
        Dropout {
            x,
            p,
            active,
            rng,
            mask: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        if !self.active || self.p == T::zero() {
            self.mask.set(None).ok();
            return xv;
        }
        let p = self.p.to_f64();
        let keep = T::one() - self.p;
        let coeff = if keep > T::zero() {
            T::one() / keep
        } else {
            T::zero()
        };
        let mut buf = T::pool().get_raw(xv.size());
        {
            let mut rng = self.rng.lock().unwrap();
            for out in buf.iter_mut() {
                *out = if rng.gen::<f64>() < p { T::zero() } else { coeff };
            }
        }
        let mask = Matrix::new(xv.rows(), xv.cols(), buf);
        let y = xv.prod(&mask);
        self.mask.set(Some(mask)).ok();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let mask = self.mask.get().expect("dropout: backward before forward");
        let gx = match mask {
            Some(mask) => gy.prod(mask),
            None => gy.clone(),
        };
        self.x.propagate_grad(shaped_like(gx, &self.x.value()));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = the operands' elements laid end to end in a single column vector
pub struct Concat<T: Element> {
    xs: Vec<Node<T>>,
}

impl<T: Element> Concat<T> {
    pub fn new(xs: Vec<Node<T>>) -> Self {
        assert!(!xs.is_empty(), "concat: no operands");
        Concat { xs }
    }

    pub fn forward(&self) -> Matrix<T> {
        let values: Vec<Matrix<T>> = self.xs.iter().map(|x| x.value()).collect();
        let total: usize = values.iter().map(|v| v.size()).sum();
        let mut buf = T::pool().get_raw(total);
        let mut offset = 0;
        for v in &values {
            assert!(v.is_vector(), "concat: every operand must be a vector");
            buf[offset..offset + v.size()].copy_from_slice(v.data());
            offset += v.size();
        }
        Matrix::new(total, 1, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let total: usize = self.xs.iter().map(|x| x.value().size()).sum();
        assert_eq!(gy.size(), total, "concat: gradient length mismatch");
        let mut offset = 0;
        for x in &self.xs {
            let xv = x.value();
            let size = xv.size();
            if x.requires_grad() {
                let mut buf = T::pool().get_raw(size);
                buf.copy_from_slice(&gy.data()[offset..offset + size]);
                x.propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
            }
            offset += size;
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        self.xs.clone()
    }
}

/// y = the operand vectors stacked as the rows of a matrix
pub struct Stack<T: Element> {
    xs: Vec<Node<T>>,
}

impl<T: Element> Stack<T> {
    pub fn new(xs: Vec<Node<T>>) -> Self {
        assert!(!xs.is_empty(), "stack: no operands");
        Stack { xs }
    }

    pub fn forward(&self) -> Matrix<T> {
        let values: Vec<Matrix<T>> = self.xs.iter().map(|x| x.value()).collect();
        let cols = values[0].size();
        let mut buf = T::pool().get_raw(values.len() * cols);
        for (r, v) in values.iter().enumerate() {
            assert!(
                v.is_vector() && v.size() == cols,
                "stack: operands must be vectors of the same length"
            );
            buf[r * cols..(r + 1) * cols].copy_from_slice(v.data());
        }
        Matrix::new(values.len(), cols, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(
            gy.rows() == self.xs.len(),
            "stack: gradient has {} rows for {} operands",
            gy.rows(),
            self.xs.len()
        );
        let cols = gy.cols();
        for (r, x) in self.xs.iter().enumerate() {
            if !x.requires_grad() {
                continue;
            }
            let xv = x.value();
            let mut buf = T::pool().get_raw(cols);
            buf.copy_from_slice(&gy.data()[r * cols..(r + 1) * cols]);
            x.propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        self.xs.clone()
    }
}

/// y = Σᵢ xsᵢ, elementwise over same-shaped operands
pub struct SumList<T: Element> {
    xs: Vec<Node<T>>,
}

impl<T: Element> SumList<T> {
    pub fn new(xs: Vec<Node<T>>) -> Self {
        assert!(!xs.is_empty(), "sum: no operands");
        SumList { xs }
    }

    pub fn forward(&self) -> Matrix<T> {
        let mut acc = self.xs[0].value();
        for x in &self.xs[1..] {
            let next = acc.add(&x.value());
            acc.release();
            acc = next;
        }
        acc
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        for x in &self.xs {
            if x.requires_grad() {
                x.propagate_grad(shaped_like(gy.clone(), &x.value()));
            }
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        self.xs.clone()
    }
}

/// y = (Σᵢ xsᵢ) / k, elementwise over same-shaped operands
pub struct MeanList<T: Element> {
    xs: Vec<Node<T>>,
}

impl<T: Element> MeanList<T> {
    pub fn new(xs: Vec<Node<T>>) -> Self {
        assert!(!xs.is_empty(), "mean: no operands");
        MeanList { xs }
    }

    pub fn forward(&self) -> Matrix<T> {
        let k = T::from_f64(self.xs.len() as f64);
        let mut acc = self.xs[0].value();
        for x in &self.xs[1..] {
            let next = acc.add(&x.value());
            acc.release();
            acc = next;
        }
        let y = acc.div_scalar(k);
        acc.release();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let k = T::from_f64(self.xs.len() as f64);
        for x in &self.xs {
            if x.requires_grad() {
                let gx = gy.div_scalar(k);
                x.propagate_grad(shaped_like(gx, &x.value()));
            }
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        self.xs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_dropout_inference_is_identity() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0]), true);
        let f = Dropout::new(x.clone(), 0.5, false, g.inner().rng.clone());
        assert_eq!(f.forward().to_f64_vec(), vec![1.0, 2.0, 3.0]);

        f.backward(&Matrix::vec_from_slice(&[0.1, 0.2, 0.3]));
        assert_eq!(x.grad().unwrap().to_f64_vec(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_dropout_mask_is_reused_in_backward() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0; 64]), true);
        let f = Dropout::new(x.clone(), 0.5, true, g.inner().rng.clone());
        let y = f.forward().to_f64_vec();

        f.backward(&Matrix::vec_from_slice(&[1.0; 64]));
        let gx = x.grad().unwrap().to_f64_vec();
        // Survivors are scaled by 1/(1-p) = 2 in both directions; dropped
        // positions are zero in both.
        assert_eq!(y, gx);
        assert!(y.iter().all(|&v| v == 0.0 || v == 2.0));
    }

    #[test]
    fn test_dropout_full_probability_zeroes_everything() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[5.0, 6.0]), true);
        let f = Dropout::new(x.clone(), 1.0, true, g.inner().rng.clone());
        assert_eq!(f.forward().to_f64_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_concat_splits_gradient() {
        let g: Graph<f64> = Graph::new();
        let a = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
        let b = g.new_variable(Matrix::vec_from_slice(&[3.0]), true);
        let f = Concat::new(vec![a.clone(), b.clone()]);
        assert_eq!(f.forward().to_f64_vec(), vec![1.0, 2.0, 3.0]);

        f.backward(&Matrix::vec_from_slice(&[0.1, 0.2, 0.3]));
        assert_eq!(a.grad().unwrap().to_f64_vec(), vec![0.1, 0.2]);
        assert_eq!(b.grad().unwrap().to_f64_vec(), vec![0.3]);
    }

    #[test]
    fn test_stack_rows() {
        let g: Graph<f64> = Graph::new();
        let a = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
        let b = g.new_variable(Matrix::vec_from_slice(&[3.0, 4.0]), true);
        let f = Stack::new(vec![a.clone(), b.clone()]);
        let y = f.forward();
        assert_eq!(y.rows(), 2);
        assert_eq!(y.cols(), 2);
        assert_eq!(y.to_f64_vec(), vec![1.0, 2.0, 3.0, 4.0]);

        f.backward(&Matrix::from_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]));
        assert_eq!(a.grad().unwrap().to_f64_vec(), vec![0.1, 0.2]);
        assert_eq!(b.grad().unwrap().to_f64_vec(), vec![0.3, 0.4]);
    }

    #[test]
    fn test_sum_and_mean_lists() {
        let g: Graph<f64> = Graph::new();
        let a = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
        let b = g.new_variable(Matrix::vec_from_slice(&[3.0, 4.0]), true);
        let c = g.new_variable(Matrix::vec_from_slice(&[5.0, 6.0]), true);

        let f = SumList::new(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(f.forward().to_f64_vec(), vec![9.0, 12.0]);
        f.backward(&Matrix::vec_from_slice(&[1.0, 1.0]));
        assert_eq!(a.grad().unwrap().to_f64_vec(), vec![1.0, 1.0]);

        g.zero_grad();
        let f = MeanList::new(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(f.forward().to_f64_vec(), vec![3.0, 4.0]);
        f.backward(&Matrix::vec_from_slice(&[3.0, 3.0]));
        assert_eq!(b.grad().unwrap().to_f64_vec(), vec![1.0, 1.0]);
    }
}
