use stoat_ag::{Graph, Node};
use stoat_core::Element;

/// b + Σᵢ wᵢ @ xᵢ — the affine combination every gated layer is built
/// from. Pairs with an absent input (the first recurrent step has no
/// previous state) are skipped.
pub fn affine<T: Element>(
    g: &Graph<T>,
    bias: &Node<T>,
    pairs: &[(&Node<T>, Option<&Node<T>>)],
) -> Node<T> {
    let mut sum = bias.clone();
    for &(w, x) in pairs {
        if let Some(x) = x {
            sum = g.add(&sum, &g.mul(w, x));
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_core::Matrix;

    #[test]
    fn test_affine_skips_absent_inputs() {
        let g: Graph<f64> = Graph::new();
        let b = g.new_variable(Matrix::vec_from_slice(&[1.0, -1.0]), true);
        let w = g.new_variable(Matrix::from_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]), true);
        let x = g.new_variable(Matrix::vec_from_slice(&[2.0, 3.0]), true);

        let y = affine(&g, &b, &[(&w, Some(&x)), (&w, None)]);
        assert_eq!(y.value().to_f64_vec(), vec![3.0, 2.0]);
    }
}
