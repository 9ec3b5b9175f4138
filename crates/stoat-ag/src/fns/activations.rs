use stoat_core::{Element, Matrix};

use crate::node::Node;

// Activations parameterized by scalar operand nodes (alpha, beta, lambda,
// thresholds). The parameters are ordinary 1×1 operands: when one requires
// grad it receives its true partial, so a trainable slope or temperature
// works like any other leaf.

fn sigmoid<T: Element>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

/// Elementwise map of x paired with a scalar-parameter partial:
/// gx_i = gy_i · dx(x_i) and gs = Σ gy_i · ds(x_i).
fn backward_with_param<T: Element>(
    x: &Node<T>,
    s: &Node<T>,
    gy: &Matrix<T>,
    dx: impl Fn(T) -> T,
    ds: impl Fn(T) -> T,
) {
    let xv = x.value();
    if x.requires_grad() {
        let gx = xv.zip_map(gy, |v, g| g * dx(v));
        x.propagate_grad(gx);
    }
    if s.requires_grad() {
        let mut total = T::zero();
        for (&v, &g) in xv.data().iter().zip(gy.data().iter()) {
            total = total + g * ds(v);
        }
        s.propagate_grad(Matrix::scalar(total));
    }
}

/// y = max(0, x) + min(0, α(exp(x/α) − 1))
pub struct Celu<T: Element> {
    x: Node<T>,
    alpha: Node<T>,
}

impl<T: Element> Celu<T> {
    pub fn new(x: Node<T>, alpha: Node<T>) -> Self {
        Celu { x, alpha }
    }

    pub fn forward(&self) -> Matrix<T> {
        let a = self.alpha.value().scalar_value();
        self.x.value().map(|v| {
            if v > T::zero() {
                v
            } else {
                a * ((v / a).exp() - T::one())
            }
        })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let a = self.alpha.value().scalar_value();
        backward_with_param(
            &self.x,
            &self.alpha,
            gy,
            |v| {
                if v > T::zero() {
                    T::one()
                } else {
                    (v / a).exp()
                }
            },
            |v| {
                if v > T::zero() {
                    T::zero()
                } else {
                    (v / a).exp() * (T::one() - v / a) - T::one()
                }
            },
        );
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.alpha.clone()]
    }
}

/// y = x when x > 0, α(exp(x) − 1) otherwise
pub struct Elu<T: Element> {
    x: Node<T>,
    alpha: Node<T>,
}

impl<T: Element> Elu<T> {
    pub fn new(x: Node<T>, alpha: Node<T>) -> Self {
        Elu { x, alpha }
    }

    pub fn forward(&self) -> Matrix<T> {
        let a = self.alpha.value().scalar_value();
        self.x.value().map(|v| {
            if v > T::zero() {
                v
            } else {
                a * (v.exp() - T::one())
            }
        })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let a = self.alpha.value().scalar_value();
        backward_with_param(
            &self.x,
            &self.alpha,
            gy,
            |v| if v > T::zero() { T::one() } else { a * v.exp() },
            |v| {
                if v > T::zero() {
                    T::zero()
                } else {
                    v.exp() - T::one()
                }
            },
        );
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.alpha.clone()]
    }
}

/// y = x · sigmoid(βx), with a trainable β
pub struct SwishB<T: Element> {
    x: Node<T>,
    beta: Node<T>,
}

impl<T: Element> SwishB<T> {
    pub fn new(x: Node<T>, beta: Node<T>) -> Self {
        SwishB { x, beta }
    }

    pub fn forward(&self) -> Matrix<T> {
        let b = self.beta.value().scalar_value();
        self.x.value().map(|v| v * sigmoid(b * v))
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let b = self.beta.value().scalar_value();
        backward_with_param(
            &self.x,
            &self.beta,
            gy,
            |v| {
                let s = sigmoid(b * v);
                s + v * b * s * (T::one() - s)
            },
            |v| {
                let s = sigmoid(b * v);
                v * v * s * (T::one() - s)
            },
        );
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.beta.clone()]
    }
}

/// y = x when x > 0, αx otherwise
pub struct LeakyRelu<T: Element> {
    x: Node<T>,
    alpha: Node<T>,
}

impl<T: Element> LeakyRelu<T> {
    pub fn new(x: Node<T>, alpha: Node<T>) -> Self {
        LeakyRelu { x, alpha }
    }

    pub fn forward(&self) -> Matrix<T> {
        let a = self.alpha.value().scalar_value();
        self.x
            .value()
            .map(|v| if v > T::zero() { v } else { a * v })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let a = self.alpha.value().scalar_value();
        backward_with_param(
            &self.x,
            &self.alpha,
            gy,
            |v| if v > T::zero() { T::one() } else { a },
            |v| if v > T::zero() { T::zero() } else { v },
        );
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.alpha.clone()]
    }
}

/// y = scale · (x when x > 0, α(exp(x) − 1) otherwise)
pub struct Selu<T: Element> {
    x: Node<T>,
    alpha: Node<T>,
    scale: Node<T>,
}

impl<T: Element> Selu<T> {
    pub fn new(x: Node<T>, alpha: Node<T>, scale: Node<T>) -> Self {
        Selu { x, alpha, scale }
    }

    fn unscaled(a: T, v: T) -> T {
        if v > T::zero() {
            v
        } else {
            a * (v.exp() - T::one())
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let a = self.alpha.value().scalar_value();
        let sc = self.scale.value().scalar_value();
        self.x.value().map(|v| sc * Self::unscaled(a, v))
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let a = self.alpha.value().scalar_value();
        let sc = self.scale.value().scalar_value();
        let xv = self.x.value();
        if self.x.requires_grad() {
            let gx = xv.zip_map(gy, |v, g| {
                let d = if v > T::zero() { T::one() } else { a * v.exp() };
                g * sc * d
            });
            self.x.propagate_grad(gx);
        }
        if self.alpha.requires_grad() {
            let mut total = T::zero();
            for (&v, &g) in xv.data().iter().zip(gy.data().iter()) {
                if v <= T::zero() {
                    total = total + g * sc * (v.exp() - T::one());
                }
            }
            self.alpha.propagate_grad(Matrix::scalar(total));
        }
        if self.scale.requires_grad() {
            let mut total = T::zero();
            for (&v, &g) in xv.data().iter().zip(gy.data().iter()) {
                total = total + g * Self::unscaled(a, v);
            }
            self.scale.propagate_grad(Matrix::scalar(total));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.alpha.clone(), self.scale.clone()]
    }
}

/// y = ln(1 + exp(βx)) / β, linear above the threshold
pub struct SoftPlus<T: Element> {
    x: Node<T>,
    beta: Node<T>,
    threshold: Node<T>,
}

impl<T: Element> SoftPlus<T> {
    pub fn new(x: Node<T>, beta: Node<T>, threshold: Node<T>) -> Self {
        SoftPlus { x, beta, threshold }
    }

    pub fn forward(&self) -> Matrix<T> {
        let b = self.beta.value().scalar_value();
        let t = self.threshold.value().scalar_value();
        self.x.value().map(|v| {
            if v * b > t {
                v
            } else {
                (v * b).exp().ln_1p() / b
            }
        })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let b = self.beta.value().scalar_value();
        let t = self.threshold.value().scalar_value();
        let xv = self.x.value();
        if self.x.requires_grad() {
            let gx = xv.zip_map(gy, |v, g| {
                let d = if v * b > t { T::one() } else { sigmoid(b * v) };
                g * d
            });
            self.x.propagate_grad(gx);
        }
        if self.beta.requires_grad() {
            let mut total = T::zero();
            for (&v, &g) in xv.data().iter().zip(gy.data().iter()) {
                if v * b <= t {
                    let y = (v * b).exp().ln_1p() / b;
                    total = total + g * (v * sigmoid(b * v) - y) / b;
                }
            }
            self.beta.propagate_grad(Matrix::scalar(total));
        }
        if self.threshold.requires_grad() {
            // The threshold only selects a branch; its partial is zero
            // almost everywhere.
            self.threshold.propagate_grad(Matrix::scalar(T::zero()));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.beta.clone(), self.threshold.clone()]
    }
}

/// y = x ∓ λ outside the [−λ, λ] dead zone, zero inside
pub struct SoftShrink<T: Element> {
    x: Node<T>,
    lambda: Node<T>,
}

impl<T: Element> SoftShrink<T> {
    pub fn new(x: Node<T>, lambda: Node<T>) -> Self {
        SoftShrink { x, lambda }
    }

    pub fn forward(&self) -> Matrix<T> {
        let l = self.lambda.value().scalar_value();
        self.x.value().map(|v| {
            if v > l {
                v - l
            } else if v < -l {
                v + l
            } else {
                T::zero()
            }
        })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let l = self.lambda.value().scalar_value();
        backward_with_param(
            &self.x,
            &self.lambda,
            gy,
            |v| {
                if v > l || v < -l {
                    T::one()
                } else {
                    T::zero()
                }
            },
            |v| {
                if v > l {
                    -T::one()
                } else if v < -l {
                    T::one()
                } else {
                    T::zero()
                }
            },
        );
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.lambda.clone()]
    }
}

/// y = x when x > θ, k otherwise
pub struct Threshold<T: Element> {
    x: Node<T>,
    threshold: Node<T>,
    k: Node<T>,
}

impl<T: Element> Threshold<T> {
    pub fn new(x: Node<T>, threshold: Node<T>, k: Node<T>) -> Self {
        Threshold { x, threshold, k }
    }

    pub fn forward(&self) -> Matrix<T> {
        let t = self.threshold.value().scalar_value();
        let k = self.k.value().scalar_value();
        self.x.value().map(|v| if v > t { v } else { k })
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        let t = self.threshold.value().scalar_value();
        let xv = self.x.value();
        if self.x.requires_grad() {
            let gx = xv.zip_map(gy, |v, g| if v > t { g } else { T::zero() });
            self.x.propagate_grad(gx);
        }
        if self.threshold.requires_grad() {
            self.threshold.propagate_grad(Matrix::scalar(T::zero()));
        }
        if self.k.requires_grad() {
            let mut total = T::zero();
            for (&v, &g) in xv.data().iter().zip(gy.data().iter()) {
                if v <= t {
                    total = total + g;
                }
            }
            self.k.propagate_grad(Matrix::scalar(total));
        }
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone(), self.threshold.clone(), self.k.clone()]
    }
}
