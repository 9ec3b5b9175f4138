use stoat_core::{Element, Matrix};

use crate::node::Node;

// Views and shape rearrangements. Their backward places the incoming
// gradient back into the corresponding slice or permutation of a
// zero-initialized operand-shaped buffer.

/// y = x[i, j], a 1×1 matrix
pub struct At<T: Element> {
    x: Node<T>,
    i: usize,
    j: usize,
}

impl<T: Element> At<T> {
    pub fn new(x: Node<T>, i: usize, j: usize) -> Self {
        At { x, i, j }
    }

    pub fn forward(&self) -> Matrix<T> {
        Matrix::scalar(self.x.value().at(self.i, self.j))
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(gy.is_scalar(), "at: the incoming gradient must be scalar");
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let mut buf = T::pool().get_zeroed(xv.size());
        buf[self.i * xv.cols() + self.j] = gy.scalar_value();
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = x[i] of a vector operand, a 1×1 matrix
pub struct AtVec<T: Element> {
    x: Node<T>,
    i: usize,
}

impl<T: Element> AtVec<T> {
    pub fn new(x: Node<T>, i: usize) -> Self {
        AtVec { x, i }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        assert!(xv.is_vector(), "at_vec: the operand must be a vector");
        Matrix::scalar(xv.data()[self.i])
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(gy.is_scalar(), "at_vec: the incoming gradient must be scalar");
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let mut buf = T::pool().get_zeroed(xv.size());
        buf[self.i] = gy.scalar_value();
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = the rows×cols block of x starting at (row, col)
pub struct View<T: Element> {
    x: Node<T>,
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
}

impl<T: Element> View<T> {
    pub fn new(x: Node<T>, row: usize, col: usize, rows: usize, cols: usize) -> Self {
        View {
            x,
            row,
            col,
            rows,
            cols,
        }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        assert!(
            self.row + self.rows <= xv.rows() && self.col + self.cols <= xv.cols(),
            "view: {}x{} block at ({}, {}) exceeds a {}x{} matrix",
            self.rows,
            self.cols,
            self.row,
            self.col,
            xv.rows(),
            xv.cols()
        );
        let mut buf = T::pool().get_raw(self.rows * self.cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                buf[r * self.cols + c] = xv.at(self.row + r, self.col + c);
            }
        }
        Matrix::new(self.rows, self.cols, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(
            gy.rows() == self.rows && gy.cols() == self.cols,
            "view: gradient shape {}x{} does not match the view {}x{}",
            gy.rows(),
            gy.cols(),
            self.rows,
            self.cols
        );
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let mut buf = T::pool().get_zeroed(xv.size());
        for r in 0..self.rows {
            for c in 0..self.cols {
                buf[(self.row + r) * xv.cols() + self.col + c] = gy.at(r, c);
            }
        }
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = row i of x, as a 1×cols matrix
pub struct RowView<T: Element> {
    x: Node<T>,
    row: usize,
}

impl<T: Element> RowView<T> {
    pub fn new(x: Node<T>, row: usize) -> Self {
        RowView { x, row }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        assert!(
            self.row < xv.rows(),
            "row_view: row {} out of bounds for {} rows",
            self.row,
            xv.rows()
        );
        let cols = xv.cols();
        let mut buf = T::pool().get_raw(cols);
        buf.copy_from_slice(&xv.data()[self.row * cols..(self.row + 1) * cols]);
        Matrix::new(1, cols, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let cols = xv.cols();
        assert_eq!(gy.size(), cols, "row_view: gradient length mismatch");
        let mut buf = T::pool().get_zeroed(xv.size());
        buf[self.row * cols..(self.row + 1) * cols].copy_from_slice(gy.data());
        self.x
            .propagate_grad(Matrix::new(xv.rows(), cols, buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = column j of x, as a rows×1 matrix
pub struct ColView<T: Element> {
    x: Node<T>,
    col: usize,
}

impl<T: Element> ColView<T> {
    pub fn new(x: Node<T>, col: usize) -> Self {
        ColView { x, col }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        assert!(
            self.col < xv.cols(),
            "col_view: column {} out of bounds for {} columns",
            self.col,
            xv.cols()
        );
        let mut buf = T::pool().get_raw(xv.rows());
        for (r, out) in buf.iter_mut().enumerate() {
            *out = xv.at(r, self.col);
        }
        Matrix::new(xv.rows(), 1, buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        assert_eq!(gy.size(), xv.rows(), "col_view: gradient length mismatch");
        let mut buf = T::pool().get_zeroed(xv.size());
        for (r, &gv) in gy.data().iter().enumerate() {
            buf[r * xv.cols() + self.col] = gv;
        }
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = x raveled into a column vector (row-major order)
pub struct VecView<T: Element> {
    x: Node<T>,
}

impl<T: Element> VecView<T> {
    pub fn new(x: Node<T>) -> Self {
        VecView { x }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        Matrix::vec_from_slice(xv.data())
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        assert_eq!(gy.size(), xv.size(), "vec: gradient length mismatch");
        self.x
            .propagate_grad(gy.reshape(xv.rows(), xv.cols()));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = x with a different shape, same element count
pub struct Reshape<T: Element> {
    x: Node<T>,
    rows: usize,
    cols: usize,
}

impl<T: Element> Reshape<T> {
    pub fn new(x: Node<T>, rows: usize, cols: usize) -> Self {
        Reshape { x, rows, cols }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x.value().reshape(self.rows, self.cols)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        assert!(
            gy.rows() == self.rows && gy.cols() == self.cols,
            "reshape: gradient shape mismatch"
        );
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        self.x
            .propagate_grad(gy.reshape(xv.rows(), xv.cols()));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = x with its elements circularly shifted right by `shift` places
pub struct RotateR<T: Element> {
    x: Node<T>,
    shift: usize,
}

impl<T: Element> RotateR<T> {
    pub fn new(x: Node<T>, shift: usize) -> Self {
        RotateR { x, shift }
    }

    pub fn forward(&self) -> Matrix<T> {
        let xv = self.x.value();
        let mut buf = T::pool().get_raw(xv.size());
        buf.copy_from_slice(xv.data());
        let len = buf.len().max(1);
        buf.rotate_right(self.shift % len);
        Matrix::new(xv.rows(), xv.cols(), buf)
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        assert_eq!(gy.size(), xv.size(), "rotate_r: gradient length mismatch");
        let mut buf = T::pool().get_raw(gy.size());
        buf.copy_from_slice(gy.data());
        let len = buf.len().max(1);
        buf.rotate_left(self.shift % len);
        self.x
            .propagate_grad(Matrix::new(xv.rows(), xv.cols(), buf));
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}

/// y = xᵀ
pub struct Transpose<T: Element> {
    x: Node<T>,
}

impl<T: Element> Transpose<T> {
    pub fn new(x: Node<T>) -> Self {
        Transpose { x }
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x.value().transpose()
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        self.x.propagate_grad(gy.transpose());
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
    fn test_view_slice_forward_backward() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(
            Matrix::from_slice(
                3,
                4,
                &[
                    0.1, 0.2, 0.3, 0.0, //
                    0.4, 0.5, -0.6, 0.7, //
                    -0.5, 0.8, -0.8, -0.1,
                ],
            ),
            true,
        );
        let f = View::new(x.clone(), 1, 1, 2, 2);
        let y = f.forward();
        assert_vec_approx(&y.to_f64_vec(), &[0.5, -0.6, 0.8, -0.8], 1e-6);
        assert_eq!(y.rows(), 2);
        assert_eq!(y.cols(), 2);

        f.backward(&Matrix::from_slice(2, 2, &[0.1, 0.2, -0.8, -0.1]));
        assert_vec_approx(
            &x.grad().unwrap().to_f64_vec(),
            &[
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.1, 0.2, 0.0, //
                0.0, -0.8, -0.1, 0.0,
            ],
            1e-6,
        );
    }

    #[test]
    fn test_rotate_r_round_trip() {
        let g: Graph<f64> = Graph::new();
        let x = g.new_variable(
            Matrix::vec_from_slice(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]),
            true,
        );
        let f = RotateR::new(x.clone(), 1);
        let y = f.forward();
        assert_vec_approx(
            &y.to_f64_vec(),
            &[0.8, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7],
            1e-6,
        );

        f.backward(&Matrix::vec_from_slice(&[
            0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8,
        ]));
        assert_vec_approx(
            &x.grad().unwrap().to_f64_vec(),
            &[0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.1],
            1e-6,
        );
    }

    #[test]
    fn test_at_and_at_vec() {
        let g: Graph<f64> = Graph::new();
        let m = g.new_variable(Matrix::from_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]), true);
        let f = At::new(m.clone(), 1, 0);
        assert_eq!(f.forward().to_f64_vec(), vec![3.0]);
        f.backward(&Matrix::scalar(5.0));
        assert_eq!(m.grad().unwrap().to_f64_vec(), vec![0.0, 0.0, 5.0, 0.0]);

        let v = g.new_variable(Matrix::vec_from_slice(&[7.0, 8.0, 9.0]), true);
        let f = AtVec::new(v.clone(), 2);
        assert_eq!(f.forward().to_f64_vec(), vec![9.0]);
        f.backward(&Matrix::scalar(1.0));
        assert_eq!(v.grad().unwrap().to_f64_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_row_and_col_views() {
        let g: Graph<f64> = Graph::new();
        let m = g.new_variable(
            Matrix::from_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            true,
        );

        let f = RowView::new(m.clone(), 1);
        let y = f.forward();
        assert_eq!(y.rows(), 1);
        assert_eq!(y.to_f64_vec(), vec![4.0, 5.0, 6.0]);
        f.backward(&Matrix::new(1, 3, vec![1.0, 2.0, 3.0]));
        assert_eq!(
            m.grad().unwrap().to_f64_vec(),
            vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]
        );

        m.zero_grad();
        let f = ColView::new(m.clone(), 2);
        let y = f.forward();
        assert_eq!(y.cols(), 1);
        assert_eq!(y.to_f64_vec(), vec![3.0, 6.0]);
        f.backward(&Matrix::vec_from_slice(&[1.0, -1.0]));
        assert_eq!(
            m.grad().unwrap().to_f64_vec(),
            vec![0.0, 0.0, 1.0, 0.0, 0.0, -1.0]
        );
    }

    #[test]
    fn test_transpose_and_reshape_and_vec() {
        let g: Graph<f64> = Graph::new();
        let m = g.new_variable(
            Matrix::from_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            true,
        );

        let f = Transpose::new(m.clone());
        let y = f.forward();
        assert_eq!(y.rows(), 3);
        assert_eq!(y.to_f64_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        f.backward(&Matrix::from_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert_eq!(
            m.grad().unwrap().to_f64_vec(),
            vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]
        );

        m.zero_grad();
        let f = VecView::new(m.clone());
        let y = f.forward();
        assert_eq!(y.cols(), 1);
        assert_eq!(y.size(), 6);
        f.backward(&Matrix::vec_from_slice(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]));
        let gm = m.grad().unwrap();
        assert_eq!(gm.rows(), 2);
        assert_eq!(gm.to_f64_vec(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }
}
