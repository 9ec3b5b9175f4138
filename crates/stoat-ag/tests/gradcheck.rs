// Finite-difference verification: for a scalar-valued build over a leaf
// vector, the backward gradient must match the central-difference numeric
// gradient within tolerance.

use stoat_ag::{Graph, Node};
use stoat_core::Matrix;

const EPS: f64 = 1e-6;
const TOL: f64 = 1e-4;

fn eval(build: &dyn Fn(&Graph<f64>, &Node<f64>) -> Node<f64>, x0: &[f64]) -> f64 {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(x0), false);
    let y = build(&g, &x);
    y.value().scalar_value()
}

fn check_gradients(build: impl Fn(&Graph<f64>, &Node<f64>) -> Node<f64>, x0: &[f64]) {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(x0), true);
    let y = build(&g, &x);
    g.backward(&y).unwrap();
    let analytic = x.grad().unwrap().to_f64_vec();

    for i in 0..x0.len() {
        let mut plus = x0.to_vec();
        plus[i] += EPS;
        let mut minus = x0.to_vec();
        minus[i] -= EPS;
        let numeric = (eval(&build, &plus) - eval(&build, &minus)) / (2.0 * EPS);
        assert!(
            (analytic[i] - numeric).abs() < TOL,
            "component {}: analytic {} vs numeric {}",
            i,
            analytic[i],
            numeric
        );
    }
}

#[test]
fn test_gradcheck_sum_of_squares() {
    check_gradients(|g, x| g.reduce_sum(&g.square(x)), &[0.4, -1.2, 2.0]);
}

#[test]
fn test_gradcheck_tanh_sigmoid_product() {
    check_gradients(
        |g, x| {
            let t = g.tanh(x);
            let s = g.sigmoid(x);
            g.reduce_sum(&g.prod(&t, &s))
        },
        &[0.3, -0.6, 1.1, -1.7],
    );
}

#[test]
fn test_gradcheck_smooth_activations() {
    check_gradients(|g, x| g.reduce_sum(&g.gelu(x)), &[0.5, -0.4, 1.3]);
    check_gradients(|g, x| g.reduce_sum(&g.mish(x)), &[0.5, -0.4, 1.3]);
    check_gradients(|g, x| g.reduce_sum(&g.softsign(x)), &[0.5, -0.4, 1.3]);
    check_gradients(|g, x| g.reduce_sum(&g.silu(x)), &[0.5, -0.4, 1.3]);
}

#[test]
fn test_gradcheck_exp_log_chain() {
    check_gradients(
        |g, x| g.reduce_sum(&g.log(&g.add_scalar(&g.exp(x), &g.new_scalar(1.0)))),
        &[0.2, -0.9, 0.7],
    );
}

#[test]
fn test_gradcheck_softmax_dot() {
    check_gradients(
        |g, x| {
            let p = g.softmax(x);
            let w = g.new_constant(Matrix::vec_from_slice(&[1.0, -2.0, 0.5, 3.0]));
            g.dot(&p, &w)
        },
        &[-0.41, -1.08, 0.0, 0.87],
    );
}

#[test]
fn test_gradcheck_log_softmax_pick() {
    check_gradients(
        |g, x| g.at_vec(&g.log_softmax(x), 1),
        &[0.2, -1.3, 0.5, 0.0],
    );
}

#[test]
fn test_gradcheck_matmul_chain() {
    check_gradients(
        |g, x| {
            let w = g.new_constant(Matrix::from_slice(
                2,
                3,
                &[0.1, -0.4, 0.8, 0.5, 0.2, -0.7],
            ));
            let m = g.reshape(x, 3, 1);
            g.reduce_sum(&g.tanh(&g.mul(&w, &m)))
        },
        &[0.3, -0.5, 0.9],
    );
}

#[test]
fn test_gradcheck_reduce_mean() {
    check_gradients(|g, x| g.reduce_mean(&g.square(x)), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_gradcheck_views_compose() {
    check_gradients(
        |g, x| {
            let m = g.reshape(x, 2, 2);
            let r = g.row_view(&m, 1);
            let t = g.t(&g.col_view(&m, 0));
            g.reduce_sum(&g.prod(&r, &t))
        },
        &[0.4, -0.2, 0.9, 1.5],
    );
}

#[test]
fn test_gradcheck_rotate_and_concat() {
    check_gradients(
        |g, x| {
            let r = g.rotate_r(x, 2);
            let c = g.concat(&[r, x.clone()]);
            g.reduce_sum(&g.square(&c))
        },
        &[0.3, -0.8, 0.5, 1.2],
    );
}

#[test]
fn test_gradcheck_scalar_parameter_ops() {
    check_gradients(
        |g, x| {
            let s = g.new_scalar(0.7);
            g.reduce_sum(&g.div_scalar(&g.prod_scalar(x, &s), &g.new_scalar(1.3)))
        },
        &[0.3, -0.8, 0.5],
    );
}

#[test]
fn test_gradcheck_swish_b_beta() {
    // β is itself a leaf here; verify its gradient numerically too.
    let x0 = [0.1, -0.2, 0.3];
    let b0 = 2.0;

    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&x0), true);
    let beta = g.new_variable(Matrix::scalar(b0), true);
    let y = g.reduce_sum(&g.swish_b(&x, &beta));
    g.backward(&y).unwrap();
    let analytic = beta.grad().unwrap().to_f64_vec()[0];

    let eval_at = |b: f64| -> f64 {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(Matrix::vec_from_slice(&x0), false);
        let beta = g.new_variable(Matrix::scalar(b), false);
        g.reduce_sum(&g.swish_b(&x, &beta)).value().scalar_value()
    };
    let numeric = (eval_at(b0 + EPS) - eval_at(b0 - EPS)) / (2.0 * EPS);
    assert!(
        (analytic - numeric).abs() < TOL,
        "beta: analytic {} vs numeric {}",
        analytic,
        numeric
    );
}
