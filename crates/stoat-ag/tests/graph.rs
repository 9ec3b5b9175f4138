// Integration tests for the graph engine: concurrent forwards, gradient
// accumulation, lifecycle, truncated BPTT, and by-name dispatch.

use std::panic::AssertUnwindSafe;

use stoat_ag::{release_operators, BackwardOptions, Graph, GraphConfig, Mode, OpName};
use stoat_core::{Error, Matrix};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

// Forward scenarios

#[test]
fn test_relu_forward_backward_through_graph() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[0.1, -0.2, 0.3, 0.0]), true);
    let y = g.relu(&x);

    assert_vec_approx(&y.value().to_f64_vec(), &[0.1, 0.0, 0.3, 0.0], 1e-6);

    g.backward_opts(
        &y,
        BackwardOptions::default().seed(Matrix::vec_from_slice(&[-1.0, 0.5, 0.8, 0.0])),
    )
    .unwrap();
    assert_vec_approx(
        &x.grad().unwrap().to_f64_vec(),
        &[-1.0, 0.0, 0.8, 0.0],
        1e-6,
    );
}

#[test]
fn test_value_is_idempotent() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), false);
    let y = g.exp(&x);
    let first = y.value();
    let second = y.value();
    assert_eq!(first, second);
}

#[test]
fn test_concurrent_independent_operators() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0]), false);

    // Hundreds of forwards in flight at once; each is x scaled by i.
    let scales: Vec<_> = (0..200)
        .map(|i| g.new_scalar(i as f64))
        .collect();
    let ops: Vec<_> = scales
        .iter()
        .map(|s| g.prod_scalar(&x, s))
        .collect();
    g.wait_for_all();

    let total: f64 = ops.iter().map(|op| op.value().sum()).sum();
    let serial: f64 = (0..200).map(|i| 6.0 * i as f64).sum();
    assert!(approx_eq(total, serial, 1e-9));
}

#[test]
fn test_requires_grad_is_or_over_operands() {
    let g: Graph<f64> = Graph::new();
    let a = g.new_variable(Matrix::vec_from_slice(&[1.0]), true);
    let b = g.new_variable(Matrix::vec_from_slice(&[2.0]), false);
    let c = g.new_constant(Matrix::vec_from_slice(&[3.0]));

    assert!(g.add(&a, &b).requires_grad());
    assert!(!g.add(&b, &c).requires_grad());
    assert!(g.add(&c, &a).requires_grad());
}

// Gradient engine

#[test]
fn test_gradient_accumulation_over_fan_out() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[0.5, -0.3]), true);
    // s feeds two consumers; its grad is the sum of both partials.
    let s = g.sigmoid(&x);
    let y1 = g.prod(&s, &s); // ds = 2s
    let y2 = g.identity(&s); // ds = 1
    let total = g.add(&y1, &y2);
    let loss = g.reduce_sum(&total);

    g.backward(&loss).unwrap();

    let sv = s.value().to_f64_vec();
    let expected_s_grad: Vec<f64> = sv.iter().map(|v| 2.0 * v + 1.0).collect();
    assert_vec_approx(&s.grad().unwrap().to_f64_vec(), &expected_s_grad, 1e-9);

    let expected_x_grad: Vec<f64> = sv
        .iter()
        .map(|v| (2.0 * v + 1.0) * v * (1.0 - v))
        .collect();
    assert_vec_approx(&x.grad().unwrap().to_f64_vec(), &expected_x_grad, 1e-9);
}

#[test]
fn test_default_seed_requires_scalar_root() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
    let y = g.square(&x);
    assert!(matches!(
        g.backward(&y),
        Err(Error::NonScalarRootWithoutSeed)
    ));

    // With a seed the same root works.
    g.backward_opts(
        &y,
        BackwardOptions::default().seed(Matrix::vec_from_slice(&[1.0, 1.0])),
    )
    .unwrap();
    assert_vec_approx(&x.grad().unwrap().to_f64_vec(), &[2.0, 4.0], 1e-12);
}

#[test]
fn test_backward_is_deterministic_across_runs() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[0.3, -0.8, 1.2]), true);
    let a = g.tanh(&x);
    let b = g.sigmoid(&a);
    let c = g.prod(&a, &b);
    let loss = g.reduce_sum(&c);

    g.backward(&loss).unwrap();
    let first = x.grad().unwrap().to_f64_vec();

    g.zero_grad();
    g.backward(&loss).unwrap();
    let second = x.grad().unwrap().to_f64_vec();

    // Bitwise identical, not just approximately equal.
    assert_eq!(first, second);
}

#[test]
fn test_deep_chain_backward() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(0.01), true);
    let mut y = x.clone();
    for _ in 0..50 {
        y = g.add(&y, &x);
    }
    g.backward(&y).unwrap();
    // y = 51·x
    assert_vec_approx(&x.grad().unwrap().to_f64_vec(), &[51.0], 1e-9);
}

#[test]
fn test_leaf_root_backward_is_a_seed_assignment() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(3.0), true);
    g.backward(&x).unwrap();
    assert_vec_approx(&x.grad().unwrap().to_f64_vec(), &[1.0], 1e-12);
}

#[test]
fn test_no_grad_root_is_a_no_op() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(3.0), false);
    let y = g.square(&x);
    g.backward(&y).unwrap();
    assert!(y.grad().is_none());
    assert!(x.grad().is_none());
}

// Truncated BPTT

#[test]
fn test_truncated_bptt_cuts_at_time_step_boundary() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(0.5), true);

    let a = g.square(&x); // time-step 0
    g.increment_time_step();
    let b = g.square(&a); // time-step 1
    g.increment_time_step();
    let c = g.square(&b); // time-step 2

    g.backward_opts(&c, BackwardOptions::default().truncated_steps(1))
        .unwrap();

    // c and b run their backward; a is beyond the boundary, so the chain
    // terminates there and the leaf never receives a gradient.
    assert!(c.grad().is_some());
    assert!(b.grad().is_some());
    assert!(x.grad().is_none());
    // The boundary operator still accumulated the partial flowing into it.
    assert!(a.grad().is_some());
}

#[test]
fn test_full_backward_through_time_steps() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(0.5), true);
    let a = g.square(&x);
    g.increment_time_step();
    let b = g.square(&a);
    g.increment_time_step();
    let c = g.square(&b);

    g.backward(&c).unwrap();
    // d(x^8)/dx = 8 x^7
    assert_vec_approx(
        &x.grad().unwrap().to_f64_vec(),
        &[8.0 * 0.5f64.powi(7)],
        1e-12,
    );
}

// Wraps

#[test]
fn test_wrap_borrows_value_and_blocks_gradients() {
    let g1: Graph<f64> = Graph::new();
    let x = g1.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
    let y1 = g1.square(&x);

    let g2: Graph<f64> = Graph::new();
    let w = g2.wrap(&y1);
    assert_vec_approx(&w.value().to_f64_vec(), &[1.0, 4.0], 1e-12);
    assert!(!w.requires_grad());

    let z = g2.new_variable(Matrix::vec_from_slice(&[3.0, 4.0]), true);
    let y2 = g2.reduce_sum(&g2.prod(&w, &z));
    g2.backward(&y2).unwrap();

    // The wrapped producer's graph is untouched.
    assert_vec_approx(&z.grad().unwrap().to_f64_vec(), &[1.0, 4.0], 1e-12);
    assert!(x.grad().is_none());
    assert!(y1.grad().is_none());
}

// Lifecycle

#[test]
fn test_zero_grad_resets_accumulated_gradients() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(2.0), true);
    let y = g.square(&x);
    g.backward(&y).unwrap();
    assert!(x.grad().is_some());

    g.zero_grad();
    assert!(x.grad().is_none());
    assert!(y.grad().is_none());

    // Gradients accumulate again after the reset.
    g.backward(&y).unwrap();
    assert_vec_approx(&x.grad().unwrap().to_f64_vec(), &[4.0], 1e-12);
}

#[test]
fn test_release_operators_is_idempotent_and_frees_the_subgraph() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), true);
    let a = g.square(&x);
    let b = g.exp(&a);
    let loss = g.reduce_sum(&b);
    g.backward(&loss).unwrap();
    g.wait_for_all();

    release_operators(&[loss.clone()]);
    // A second release is a no-op.
    release_operators(&[loss.clone()]);

    // Released operators must not be used: reading a value panics.
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| a.value()));
    assert!(result.is_err());

    // Leaves are untouched by release.
    assert_vec_approx(&x.value().to_f64_vec(), &[1.0, 2.0], 1e-12);
}

#[test]
fn test_clear_releases_everything_and_resets_time() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::scalar(1.0), true);
    let y = g.exp(&x);
    let _ = y.value();
    g.increment_time_step();
    assert_eq!(g.time_step(), 1);
    assert_eq!(g.len(), 2);

    g.wait_for_all();
    g.clear();
    assert_eq!(g.len(), 0);
    assert_eq!(g.time_step(), 0);
}

#[test]
fn test_time_step_is_assigned_at_creation() {
    let g: Graph<f64> = Graph::new();
    let a = g.new_variable(Matrix::scalar(1.0), false);
    g.increment_time_step();
    g.increment_time_step();
    let b = g.new_variable(Matrix::scalar(1.0), false);
    assert_eq!(a.time_step(), 0);
    assert_eq!(b.time_step(), 2);
}

// Modes and stochastic operators

#[test]
fn test_dropout_is_identity_in_inference_mode() {
    let g: Graph<f64> = Graph::with_config(GraphConfig::default().mode(Mode::Inference));
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0, 3.0]), false);
    let y = g.dropout(&x, 0.9);
    assert_vec_approx(&y.value().to_f64_vec(), &[1.0, 2.0, 3.0], 1e-12);
}

#[test]
fn test_dropout_masks_are_seed_deterministic() {
    let run = |seed: u64| -> Vec<f64> {
        let g: Graph<f64> = Graph::with_config(GraphConfig::default().seed(seed));
        let x = g.new_variable(Matrix::vec_from_slice(&[1.0; 32]), false);
        g.dropout(&x, 0.5).value().to_f64_vec()
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn test_mode_can_be_switched() {
    let g: Graph<f64> = Graph::new();
    assert_eq!(g.mode(), Mode::Training);
    g.set_mode(Mode::Inference);
    assert_eq!(g.mode(), Mode::Inference);
}

// Dynamic dispatch

#[test]
fn test_new_operator_by_name() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[0.1, -0.2, 0.3, 0.0]), true);

    let op: OpName = "ReLU".parse().unwrap();
    let y = g.new_operator_by_name(op, &[x.clone()]).unwrap();
    assert_eq!(y.name(), "relu");
    assert_vec_approx(&y.value().to_f64_vec(), &[0.1, 0.0, 0.3, 0.0], 1e-6);
}

#[test]
fn test_by_name_arity_errors() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0]), false);

    assert!(matches!(
        g.new_operator_by_name(OpName::Add, &[x.clone()]),
        Err(Error::WrongOperandCount { expected: 2, got: 1, .. })
    ));
    assert!(matches!(
        g.new_operator_by_name(OpName::Dropout, &[x.clone()]),
        Err(Error::NotInvocableByName("dropout"))
    ));
    assert!(matches!(
        g.new_operator_by_name(OpName::Concat, &[]),
        Err(Error::WrongOperandCount { .. })
    ));
}

#[test]
fn test_operator_names_are_stable() {
    let g: Graph<f64> = Graph::new();
    let x = g.new_variable(Matrix::vec_from_slice(&[1.0, 2.0]), false);
    let s = g.new_scalar(2.0);

    assert_eq!(g.add(&x, &x).name(), "add");
    assert_eq!(g.prod_scalar(&x, &s).name(), "prod_scalar");
    assert_eq!(g.softmax(&x).name(), "softmax");
    assert_eq!(g.t(&x).name(), "transpose");
    assert_eq!(x.name(), "variable");
    assert_eq!(s.name(), "constant");
    g.wait_for_all();
}
