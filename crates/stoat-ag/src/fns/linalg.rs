use stoat_core::{Element, Matrix};

use crate::node::Node;

// Matrix product and vector dot product.

/// y = x1 @ x2
pub struct Mul<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Mul<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Mul { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().matmul(&self.x2.value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        // grad-x1 = gy @ x2ᵀ ; grad-x2 = x1ᵀ @ gy
        if self.x1.requires_grad() {
            let x2t = self.x2.value().transpose();
            let gx1 = gy.matmul(&x2t);
            x2t.release();
            self.x1.propagate_grad(gx1);
        }
        if self.x2.requires_grad() {
            let x1t = self.x1.value().transpose();
            let gx2 = x1t.matmul(gy);
            x1t.release();
            self.x2.propagate_grad(gx2);
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = Σᵢ x1ᵢ · x2ᵢ, a 1×1 matrix. Operands are vectors of equal length.
pub struct Dot<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Dot<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Dot { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        let x1v = self.x1.value();
        let x2v = self.x2.value();
        assert!(
            x1v.same_dims(&x2v) || x1v.vectors_of_same_size(&x2v),
            "dot: operands must be vectors of the same length"
        );
        let p = x1v.prod(&x2v);
        let y = Matrix::scalar(p.sum());
        p.release();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(gy.is_scalar(), "dot: the incoming gradient must be scalar");
        let g = gy.scalar_value();
        if self.x1.requires_grad() {
            let x1v = self.x1.value();
            let x2v = self.x2.value();
            let mut buf = T::pool().get_raw(x1v.size());
            for (out, &v) in buf.iter_mut().zip(x2v.data().iter()) {
                *out = v * g;
            }
            self.x1
                .propagate_grad(Matrix::new(x1v.rows(), x1v.cols(), buf));
        }
        if self.x2.requires_grad() {
            let x1v = self.x1.value();
            let x2v = self.x2.value();
            let mut buf = T::pool().get_raw(x2v.size());
            for (out, &v) in buf.iter_mut().zip(x1v.data().iter()) {
                *out = v * g;
            }
            self.x2
                .propagate_grad(Matrix::new(x2v.rows(), x2v.cols(), buf));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_matmul_grads() {
        let g: Graph<f64> = Graph::new();
        let a = g.new_variable(Matrix::from_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]), true);
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0, -1.0]), true);
        let f = Mul::new(a.clone(), x.clone());

        let y = f.forward();
        assert_eq!(y.to_f64_vec(), vec![-1.0, -1.0]);

        f.backward(&Matrix::vec_from_slice(&[1.0, 1.0]));
        // gA = gy @ xᵀ ; gx = Aᵀ @ gy
        assert_eq!(a.grad().unwrap().to_f64_vec(), vec![1.0, -1.0, 1.0, -1.0]);
        assert_eq!(x.grad().unwrap().to_f64_vec(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_dot() {
        let g: Graph<f64> = Graph::new();
        let a = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0]), true);
        let b = g.new_variable(Matrix::vec_from_slice(&[4.0, 5.0, 6.0]), true);
        let f = Dot::new(a.clone(), b.clone());
        assert_eq!(f.forward().to_f64_vec(), vec![32.0]);

        f.backward(&Matrix::scalar(2.0));
        assert_eq!(a.grad().unwrap().to_f64_vec(), vec![8.0, 10.0, 12.0]);
        assert_eq!(b.grad().unwrap().to_f64_vec(), vec![2.0, 4.0, 6.0]);
    }
}
