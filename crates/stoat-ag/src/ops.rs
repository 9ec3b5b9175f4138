use stoat_core::Element;

use crate::fns::{
    Add, AddScalar, At, AtVec, Celu, ColView, Concat, Div, DivScalar, Dot, Dropout, Elu, Function,
    LeakyRelu, Max, MaxPooling, MeanList, Min, Mul, Pow, Prod, ProdScalar, ReduceMean, ReduceSum,
    Reshape, ReverseSub, RotateR, RowView, Selu, SoftPlus, SoftShrink, Softmax, SparseMax,
    SparseMaxLoss, Stack, Sub, SubScalar, SumList, SwishB, Threshold, Transpose, Unary, UnaryKind,
    VecView, View, LogSoftmax,
};
use crate::graph::{Graph, Mode};
use crate::node::Node;

// One factory per catalog entry. Each builds the function record, wraps it
// in an operator node, and schedules its forward.

impl<T: Element> Graph<T> {
    fn unary(&self, x: &Node<T>, kind: UnaryKind) -> Node<T> {
        self.new_operator(Function::Unary(Unary::new(x.clone(), kind)))
    }

    /// y = x
    pub fn identity(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Identity)
    }

    /// Inverted dropout with probability `p`, using the graph's RNG.
    /// Identity in inference mode.
    pub fn dropout(&self, x: &Node<T>, p: T) -> Node<T> {
        let active = self.mode() == Mode::Training;
        self.new_operator(Function::Dropout(Dropout::new(
            x.clone(),
            p,
            active,
            self.inner().rng.clone(),
        )))
    }

    /// y = x[i, j]
    pub fn at(&self, x: &Node<T>, i: usize, j: usize) -> Node<T> {
        self.new_operator(Function::At(At::new(x.clone(), i, j)))
    }

    /// y = x[i] of a vector operand
    pub fn at_vec(&self, x: &Node<T>, i: usize) -> Node<T> {
        self.new_operator(Function::AtVec(AtVec::new(x.clone(), i)))
    }

    /// y = x1 + x2
    pub fn add(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Add(Add::new(x1.clone(), x2.clone())))
    }

    /// y = x1 - x2
    pub fn sub(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Sub(Sub::new(x1.clone(), x2.clone())))
    }

    /// y = x1 - s for a 1×1 operand s
    pub fn sub_scalar(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::SubScalar(SubScalar::new(x1.clone(), x2.clone())))
    }

    /// y = x1 + s for a 1×1 operand s
    pub fn add_scalar(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::AddScalar(AddScalar::new(x1.clone(), x2.clone())))
    }

    /// y = s - x1 for a 1×1 operand s
    pub fn reverse_sub(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::ReverseSub(ReverseSub::new(
            x1.clone(),
            x2.clone(),
        )))
    }

    /// y = x1 ∘ x2
    pub fn prod(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Prod(Prod::new(x1.clone(), x2.clone())))
    }

    /// y = x1 / x2, elementwise
    pub fn div(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Div(Div::new(x1.clone(), x2.clone())))
    }

    /// y = x1 · s for a 1×1 operand s
    pub fn prod_scalar(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::ProdScalar(ProdScalar::new(
            x1.clone(),
            x2.clone(),
        )))
    }

    /// y = x1 / s for a 1×1 operand s
    pub fn div_scalar(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::DivScalar(DivScalar::new(x1.clone(), x2.clone())))
    }

    /// y = x1 @ x2
    pub fn mul(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Mul(Mul::new(x1.clone(), x2.clone())))
    }

    /// y = Σ x1ᵢ x2ᵢ
    pub fn dot(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Dot(Dot::new(x1.clone(), x2.clone())))
    }

    /// y = max(x1, x2), elementwise; ties go to x1
    pub fn max(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Max(Max::new(x1.clone(), x2.clone())))
    }

    /// y = min(x1, x2), elementwise; ties go to x1
    pub fn min(&self, x1: &Node<T>, x2: &Node<T>) -> Node<T> {
        self.new_operator(Function::Min(Min::new(x1.clone(), x2.clone())))
    }

    /// y = x reshaped to rows×cols
    pub fn reshape(&self, x: &Node<T>, rows: usize, cols: usize) -> Node<T> {
        self.new_operator(Function::Reshape(Reshape::new(x.clone(), rows, cols)))
    }

    /// Window max-pooling
    pub fn max_pooling(&self, x: &Node<T>, pool_rows: usize, pool_cols: usize) -> Node<T> {
        self.new_operator(Function::MaxPooling(MaxPooling::new(
            x.clone(),
            pool_rows,
            pool_cols,
        )))
    }

    /// y = the rows×cols block of x at (row, col)
    pub fn view(&self, x: &Node<T>, row: usize, col: usize, rows: usize, cols: usize) -> Node<T> {
        self.new_operator(Function::View(View::new(x.clone(), row, col, rows, cols)))
    }

    /// y = row i of x
    pub fn row_view(&self, x: &Node<T>, row: usize) -> Node<T> {
        self.new_operator(Function::RowView(RowView::new(x.clone(), row)))
    }

    /// y = column j of x
    pub fn col_view(&self, x: &Node<T>, col: usize) -> Node<T> {
        self.new_operator(Function::ColView(ColView::new(x.clone(), col)))
    }

    /// y = x raveled into a column vector
    pub fn vec(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::VecView(VecView::new(x.clone())))
    }

    /// y = x circularly shifted right by `shift` elements
    pub fn rotate_r(&self, x: &Node<T>, shift: usize) -> Node<T> {
        self.new_operator(Function::RotateR(RotateR::new(x.clone(), shift)))
    }

    /// y = xᵀ
    pub fn t(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::Transpose(Transpose::new(x.clone())))
    }

    /// y = x², elementwise
    pub fn square(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Square)
    }

    /// y = x^power, elementwise, for a fixed exponent
    pub fn pow(&self, x: &Node<T>, power: T) -> Node<T> {
        self.new_operator(Function::Pow(Pow::new(x.clone(), power)))
    }

    pub fn sqrt(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Sqrt)
    }

    pub fn tan(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Tan)
    }

    pub fn tanh(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Tanh)
    }

    pub fn sigmoid(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Sigmoid)
    }

    pub fn hard_sigmoid(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::HardSigmoid)
    }

    pub fn hard_tanh(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::HardTanh)
    }

    pub fn softsign(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Softsign)
    }

    pub fn relu(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Relu)
    }

    /// CELU with a 1×1 alpha operand
    pub fn celu(&self, x: &Node<T>, alpha: &Node<T>) -> Node<T> {
        self.new_operator(Function::Celu(Celu::new(x.clone(), alpha.clone())))
    }

    pub fn gelu(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Gelu)
    }

    /// ELU with a 1×1 alpha operand
    pub fn elu(&self, x: &Node<T>, alpha: &Node<T>) -> Node<T> {
        self.new_operator(Function::Elu(Elu::new(x.clone(), alpha.clone())))
    }

    /// y = ELU(x) + 1, guaranteed positive
    pub fn positive_elu(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::PositiveElu)
    }

    /// Swish with a trainable 1×1 beta operand
    pub fn swish_b(&self, x: &Node<T>, beta: &Node<T>) -> Node<T> {
        self.new_operator(Function::SwishB(SwishB::new(x.clone(), beta.clone())))
    }

    pub fn swish(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Swish)
    }

    pub fn silu(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Silu)
    }

    pub fn mish(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Mish)
    }

    /// Leaky ReLU with a 1×1 negative-slope operand
    pub fn leaky_relu(&self, x: &Node<T>, alpha: &Node<T>) -> Node<T> {
        self.new_operator(Function::LeakyRelu(LeakyRelu::new(
            x.clone(),
            alpha.clone(),
        )))
    }

    /// SELU with 1×1 alpha and scale operands
    pub fn selu(&self, x: &Node<T>, alpha: &Node<T>, scale: &Node<T>) -> Node<T> {
        self.new_operator(Function::Selu(Selu::new(
            x.clone(),
            alpha.clone(),
            scale.clone(),
        )))
    }

    /// Softplus with 1×1 beta and threshold operands
    pub fn soft_plus(&self, x: &Node<T>, beta: &Node<T>, threshold: &Node<T>) -> Node<T> {
        self.new_operator(Function::SoftPlus(SoftPlus::new(
            x.clone(),
            beta.clone(),
            threshold.clone(),
        )))
    }

    /// Soft shrinkage with a 1×1 lambda operand
    pub fn soft_shrink(&self, x: &Node<T>, lambda: &Node<T>) -> Node<T> {
        self.new_operator(Function::SoftShrink(SoftShrink::new(
            x.clone(),
            lambda.clone(),
        )))
    }

    /// y = x above the threshold, k elsewhere; 1×1 threshold and k operands
    pub fn threshold(&self, x: &Node<T>, threshold: &Node<T>, k: &Node<T>) -> Node<T> {
        self.new_operator(Function::Threshold(Threshold::new(
            x.clone(),
            threshold.clone(),
            k.clone(),
        )))
    }

    pub fn softmax(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::Softmax(Softmax::new(x.clone())))
    }

    pub fn log_softmax(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::LogSoftmax(LogSoftmax::new(x.clone())))
    }

    pub fn sparse_max(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::SparseMax(SparseMax::new(x.clone())))
    }

    pub fn sparse_max_loss(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::SparseMaxLoss(SparseMaxLoss::new(x.clone())))
    }

    pub fn sin(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Sin)
    }

    pub fn cos(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Cos)
    }

    pub fn exp(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Exp)
    }

    pub fn log(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Log)
    }

    pub fn abs(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Abs)
    }

    pub fn neg(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Neg)
    }

    pub fn reciprocal(&self, x: &Node<T>) -> Node<T> {
        self.unary(x, UnaryKind::Reciprocal)
    }

    /// y = Σ x, a 1×1 matrix
    pub fn reduce_sum(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::ReduceSum(ReduceSum::new(x.clone())))
    }

    /// y = mean of x, a 1×1 matrix
    pub fn reduce_mean(&self, x: &Node<T>) -> Node<T> {
        self.new_operator(Function::ReduceMean(ReduceMean::new(x.clone())))
    }

    /// y = elementwise mean of same-shaped nodes
    pub fn mean(&self, xs: &[Node<T>]) -> Node<T> {
        self.new_operator(Function::MeanList(MeanList::new(xs.to_vec())))
    }

    /// y = elementwise sum of same-shaped nodes
    pub fn sum(&self, xs: &[Node<T>]) -> Node<T> {
        self.new_operator(Function::SumList(SumList::new(xs.to_vec())))
    }

    /// y = the operand vectors laid end to end
    pub fn concat(&self, xs: &[Node<T>]) -> Node<T> {
        self.new_operator(Function::Concat(Concat::new(xs.to_vec())))
    }

    /// y = the operand vectors stacked as matrix rows
    pub fn stack(&self, xs: &[Node<T>]) -> Node<T> {
        self.new_operator(Function::Stack(Stack::new(xs.to_vec())))
    }
}
