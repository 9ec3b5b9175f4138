use std::sync::OnceLock;

use stoat_core::{Element, Matrix};

use crate::node::Node;

// Softmax-family kernels. All of them cache the forward output (or the
// sparsemax distribution) in the function record, because their backward
// is a Jacobian-vector product expressed in terms of that output.

/// y = softmax(x), numerically stabilized by max subtraction.
pub struct Softmax<T: Element> {
    x: Node<T>,
    y: OnceLock<Matrix<T>>,
}

impl<T: Element> Softmax<T> {
    pub fn new(x: Node<T>) -> Self {
        Softmax {
            x,
            y: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let max = xv.max_value();
        let exp = xv.map(|v| (v - max).exp());
        let total = exp.sum();
        let y = exp.div_scalar(total);
        exp.release();
        self.y.set(y.clone()).ok();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let y = self.y.get().expect("softmax: backward before forward");
        // gx_i = y_i · (gy_i − Σ_j gy_j y_j)
        let mut inner = T::zero();
        for (&g, &yv) in gy.data().iter().zip(y.data().iter()) {
            inner = inner + g * yv;
        }
        let gx = y.zip_map(gy, |yv, g| yv * (g - inner));
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = log(softmax(x))
pub struct LogSoftmax<T: Element> {
    x: Node<T>,
    y: OnceLock<Matrix<T>>,
}

impl<T: Element> LogSoftmax<T> {
    pub fn new(x: Node<T>) -> Self {
        LogSoftmax {
            x,
            y: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let max = xv.max_value();
        let mut total = T::zero();
        for &v in xv.data() {
            total = total + (v - max).exp();
        }
        let lse = max + total.ln();
        let y = xv.map(|v| v - lse);
        self.y.set(y.clone()).ok();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let y = self.y.get().expect("log_softmax: backward before forward");
        // gx_i = gy_i − softmax(x)_i · Σ_j gy_j
        let total = gy.sum();
        let gx = y.zip_map(gy, |yv, g| g - yv.exp() * total);
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// Threshold τ and support size of the sparsemax projection of `z`
/// (Martins & Astudillo, 2016).
fn sparsemax_tau<T: Element>(z: &[T]) -> (T, usize) {
    let mut sorted: Vec<T> = z.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).expect("sparse_max: NaN in input"));

    let mut cumsum = T::zero();
    let mut tau = T::zero();
    let mut support = 0usize;
    for (j, &v) in sorted.iter().enumerate() {
        cumsum = cumsum + v;
        let k = T::from_f64((j + 1) as f64);
        if T::one() + k * v > cumsum {
            tau = (cumsum - T::one()) / k;
            support = j + 1;
        }
    }
    (tau, support)
}

/// y = sparsemax(x): the Euclidean projection of x onto the simplex.
pub struct SparseMax<T: Element> {
    x: Node<T>,
    y: OnceLock<Matrix<T>>,
}

impl<T: Element> SparseMax<T> {
    pub fn new(x: Node<T>) -> Self {
        SparseMax {
            x,
            y: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let (tau, _) = sparsemax_tau(xv.data());
        let y = xv.map(|v| (v - tau).max(T::zero()));
        self.y.set(y.clone()).ok();
        y
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let y = self.y.get().expect("sparse_max: backward before forward");
        // Inside the support: gx_i = gy_i − mean of gy over the support.
        let mut support = 0usize;
        let mut total = T::zero();
        for (&yv, &g) in y.data().iter().zip(gy.data().iter()) {
            if yv > T::zero() {
                support += 1;
                total = total + g;
            }
        }
        let mean = if support > 0 {
            total / T::from_f64(support as f64)
        } else {
            T::zero()
        };
        let gx = y.zip_map(gy, |yv, g| if yv > T::zero() { g - mean } else { T::zero() });
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = x − τ(x): the sparsemax analogue of log-softmax, consumed by
/// sparsemax losses.
pub struct SparseMaxLoss<T: Element> {
    x: Node<T>,
    p: OnceLock<Matrix<T>>,
}

impl<T: Element> SparseMaxLoss<T> {
    pub fn new(x: Node<T>) -> Self {
        SparseMaxLoss {
            x,
            p: OnceLock::new(),
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let (tau, _) = sparsemax_tau(xv.data());
        let p = xv.map(|v| (v - tau).max(T::zero()));
        self.p.set(p).ok();
        xv.sub_scalar(tau)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let p = self.p.get().expect("sparse_max_loss: backward before forward");
        // gx_i = gy_i − p_i · Σ_j gy_j
        let total = gy.sum();
        let gx = p.zip_map(gy, |pv, g| g - pv * total);
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(expected.iter()) {
            assert!((g - e).abs() < tol, "got {:?} expected {:?}", got, expected);
        }
    }

    #[test]
    fn test_softmax_forward_backward() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(
            Matrix::vec_from_slice(&[-0.41, -1.08, 0.0, 0.87, -0.19, -0.75]),
            true,
        );
        let f = Softmax::new(x.clone());
        let y = f.forward();
        assert_vec_approx(
            &y.to_f64_vec(),
            &[0.1166451, 0.0596882, 0.1757629, 0.4195304, 0.1453487, 0.083024],
            1e-6,
        );

        f.backward(&Matrix::vec_from_slice(&[0.0, 0.0, -5.689482, 0.0, 0.0, 0.0]));
        assert_vec_approx(
            &x.grad().unwrap().to_f64_vec(),
            &[0.1166451, 0.0596882, -0.8242370, 0.4195304, 0.1453487, 0.083024],
            1e-6,
        );
    }

    #[test]
    fn test_log_softmax_grad_sums_to_zero() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[0.2, -1.3, 0.5, 0.0]), true);
        let f = LogSoftmax::new(x.clone());
        let y = f.forward();
        // log-softmax outputs exponentiate to a distribution.
        let total: f64 = y.to_f64_vec().iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-12);

        f.backward(&Matrix::vec_from_slice(&[1.0, 0.0, 0.0, 0.0]));
        let gx = x.grad().unwrap().to_f64_vec();
        // Rows of the log-softmax Jacobian sum to zero.
        assert!(gx.iter().sum::<f64>().abs() < 1e-12);
        assert!(gx[0] > 0.0);
    }

    #[test]
    fn test_sparsemax_is_sparse_distribution() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[2.0, 0.1, -1.0, 1.9]), true);
        let f = SparseMax::new(x.clone());
        let y = f.forward().to_f64_vec();

        let total: f64 = y.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        // The small logits fall out of the support.
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 0.0);
        assert!(y[0] > y[3]);

        f.backward(&Matrix::vec_from_slice(&[1.0, 0.0, 0.0, 0.0]));
        let gx = x.grad().unwrap().to_f64_vec();
        // Gradient is centered over the support and zero outside it.
        assert_vec_approx(&gx, &[0.5, 0.0, 0.0, -0.5], 1e-12);
    }

    #[test]
    fn test_sparsemax_loss_shifts_by_tau() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&[2.0, 0.1, -1.0, 1.9]), true);
        let f = SparseMaxLoss::new(x.clone());
        let y = f.forward().to_f64_vec();
        let xs = [2.0, 0.1, -1.0, 1.9];
        // y = x − τ with a constant τ.
        let tau = xs[0] - y[0];
        for (xv, yv) in xs.iter().zip(y.iter()) {
            assert!((xv - yv - tau).abs() < 1e-12);
        }
    }
}
