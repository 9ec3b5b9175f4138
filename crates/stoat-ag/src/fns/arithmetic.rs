use stoat_core::{Element, Matrix};

use super::shaped_like;
use crate::node::Node;

// Elementwise binary arithmetic, scalar-operand variants, and pow.
//
// The scalar variants take the scalar as a 1×1 operand node, so a
// trainable scalar (a temperature, a gate bias) can receive gradients like
// any other operand.

/// y = x1 + x2
pub struct Add<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Add<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Add { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().add(&self.x2.value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            self.x1
                .propagate_grad(shaped_like(gy.clone(), &self.x1.value()));
        }
        if self.x2.requires_grad() {
            self.x2
                .propagate_grad(shaped_like(gy.clone(), &self.x2.value()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 - x2
pub struct Sub<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Sub<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Sub { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().sub(&self.x2.value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            self.x1
                .propagate_grad(shaped_like(gy.clone(), &self.x1.value()));
        }
        if self.x2.requires_grad() {
            let gx2 = gy.prod_scalar(-T::one());
            self.x2.propagate_grad(shaped_like(gx2, &self.x2.value()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 + s, where s is a 1×1 operand
pub struct AddScalar<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> AddScalar<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        AddScalar { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().add_scalar(self.x2.value().scalar_value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            self.x1
                .propagate_grad(shaped_like(gy.clone(), &self.x1.value()));
        }
        if self.x2.requires_grad() {
            self.x2.propagate_grad(Matrix::scalar(gy.sum()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 - s, where s is a 1×1 operand
pub struct SubScalar<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> SubScalar<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        SubScalar { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().sub_scalar(self.x2.value().scalar_value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            self.x1
                .propagate_grad(shaped_like(gy.clone(), &self.x1.value()));
        }
        if self.x2.requires_grad() {
            self.x2.propagate_grad(Matrix::scalar(-gy.sum()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = s - x1, where s is a 1×1 operand
pub struct ReverseSub<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> ReverseSub<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        ReverseSub { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().scalar_sub(self.x2.value().scalar_value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            let gx1 = gy.prod_scalar(-T::one());
            self.x1.propagate_grad(shaped_like(gx1, &self.x1.value()));
        }
        if self.x2.requires_grad() {
            self.x2.propagate_grad(Matrix::scalar(gy.sum()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 ∘ x2 (Hadamard product)
pub struct Prod<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Prod<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Prod { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().prod(&self.x2.value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            let gx1 = gy.prod(&self.x2.value());
            self.x1.propagate_grad(shaped_like(gx1, &self.x1.value()));
        }
        if self.x2.requires_grad() {
            let gx2 = gy.prod(&self.x1.value());
            self.x2.propagate_grad(shaped_like(gx2, &self.x2.value()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 / x2, elementwise
pub struct Div<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Div<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Div { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().div(&self.x2.value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            let gx1 = gy.div(&self.x2.value());
            self.x1.propagate_grad(shaped_like(gx1, &self.x1.value()));
        }
        if self.x2.requires_grad() {
            // d(x1/x2)/dx2 = -x1 / x2²
            let x1v = self.x1.value();
            let x2v = self.x2.value();
            let x1d = x1v.data();
            let x2d = x2v.data();
            let gyd = gy.data();
            let mut buf = T::pool().get_raw(x2v.size());
            for i in 0..buf.len() {
                buf[i] = -gyd[i] * x1d[i] / (x2d[i] * x2d[i]);
            }
            self.x2
                .propagate_grad(Matrix::new(x2v.rows(), x2v.cols(), buf));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 · s, where s is a 1×1 operand
pub struct ProdScalar<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> ProdScalar<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        ProdScalar { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().prod_scalar(self.x2.value().scalar_value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if self.x1.requires_grad() {
            let gx1 = gy.prod_scalar(self.x2.value().scalar_value());
            self.x1.propagate_grad(shaped_like(gx1, &self.x1.value()));
        }
        if self.x2.requires_grad() {
            let dot = gy.prod(&self.x1.value());
            self.x2.propagate_grad(Matrix::scalar(dot.sum()));
            dot.release();
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x1 / s, where s is a 1×1 operand
pub struct DivScalar<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> DivScalar<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        DivScalar { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().div_scalar(self.x2.value().scalar_value())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let s = self.x2.value().scalar_value();
        if self.x1.requires_grad() {
            let gx1 = gy.div_scalar(s);
            self.x1.propagate_grad(shaped_like(gx1, &self.x1.value()));
        }
        if self.x2.requires_grad() {
            // d(x1/s)/ds = -x1 / s²
            let dot = gy.prod(&self.x1.value());
            let gs = -dot.sum() / (s * s);
            self.x2.propagate_grad(Matrix::scalar(gs));
            dot.release();
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = x^p for a fixed exponent
pub struct Pow<T: Element> {
    x: Node<T>,
    power: T,
}

impl<T: Element> Pow<T> {
    pub fn new(x: Node<T>, power: T) -> Self {
        Pow { x, power }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x.value().map(|v| v.powf(self.power))
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let p = self.power;
        let gx = self
            .x
            .value()
            .zip_map(gy, |x, g| g * p * x.powf(p - T::one()));
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = max(x1, x2), elementwise. Ties go to the first operand.
pub struct Max<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Max<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Max { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().zip_map(&self.x2.value(), T::max)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let x1v = self.x1.value();
        let x2v = self.x2.value();
        if self.x1.requires_grad() {
            let gx1 = select_grad(&x1v, &x2v, gy, |a, b| a >= b, &x1v);
            self.x1.propagate_grad(gx1);
        }
        if self.x2.requires_grad() {
            let gx2 = select_grad(&x1v, &x2v, gy, |a, b| b > a, &x2v);
            self.x2.propagate_grad(gx2);
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// y = min(x1, x2), elementwise. Ties go to the first operand.
pub struct Min<T: Element> {
    x1: Node<T>,
    x2: Node<T>,
}

impl<T: Element> Min<T> {
    pub fn new(x1: Node<T>, x2: Node<T>) -> Self {
        Min { x1, x2 }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x1.value().zip_map(&self.x2.value(), T::min)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let x1v = self.x1.value();
        let x2v = self.x2.value();
        if self.x1.requires_grad() {
            let gx1 = select_grad(&x1v, &x2v, gy, |a, b| a <= b, &x1v);
            self.x1.propagate_grad(gx1);
        }
        if self.x2.requires_grad() {
            let gx2 = select_grad(&x1v, &x2v, gy, |a, b| b < a, &x2v);
            self.x2.propagate_grad(gx2);
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x1.clone(), self.x2.clone()]
    }
}

/// Route gy to the positions where `wins(x1, x2)` holds, zeros elsewhere.
fn select_grad<T: Element>(
    x1v: &Matrix<T>,
    x2v: &Matrix<T>,
    gy: &Matrix<T>,
    wins: impl Fn(T, T) -> bool,
    like: &Matrix<T>,
) -> Matrix<T> {
    assert!(
        x1v.same_dims(gy) || x1v.vectors_of_same_size(gy),
        "max/min: gradient shape does not match the operands"
    );
    let mut buf = T::pool().get_raw(like.size());
    let x1d = x1v.data();
    let x2d = x2v.data();
    let gyd = gy.data();
    for i in 0..buf.len() {
        buf[i] = if wins(x1d[i], x2d[i]) { gyd[i] } else { T::zero() };
    }
    Matrix::new(like.rows(), like.cols(), buf)
}
