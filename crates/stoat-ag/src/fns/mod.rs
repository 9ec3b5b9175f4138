use stoat_core::{Element, Matrix};

use crate::node::Node;

// Function catalog — the differentiable primitives
//
// Each primitive is a small record holding its operand nodes plus any
// scalar or structural parameters. It computes a forward matrix from the
// operand values and, on backward, writes a partial gradient into every
// operand that requires grad via propagate_grad. Function is a closed sum
// over the records so dispatch is a match, not a vtable.
//
// Kernel contract:
//   - forward() is pure in the operand values and may block reading them;
//   - backward(gy) is called with gy shaped like the forward output, after
//     the operator's gradient has fully accumulated;
//   - backward must propagate to EVERY operand with requires_grad, even
//     when the partial is structurally zero — the gradient engine counts
//     contributions per operand edge;
//   - partials are shaped like the operand value;
//   - shape faults panic.

pub mod activations;
pub mod arithmetic;
pub mod linalg;
pub mod misc;
pub mod reduce;
pub mod softmax;
pub mod unary;
pub mod views;

pub use activations::{Celu, Elu, LeakyRelu, Selu, SoftPlus, SoftShrink, SwishB, Threshold};
pub use arithmetic::{
    Add, AddScalar, Div, DivScalar, Max, Min, Pow, Prod, ProdScalar, ReverseSub, Sub, SubScalar,
};
pub use linalg::{Dot, Mul};
pub use misc::{Concat, Dropout, MeanList, Stack, SumList};
pub use reduce::{MaxPooling, ReduceMean, ReduceSum};
pub use softmax::{LogSoftmax, Softmax, SparseMax, SparseMaxLoss};
pub use unary::{Unary, UnaryKind};
pub use views::{At, AtVec, ColView, Reshape, RotateR, RowView, Transpose, VecView, View};

/// Reshape `m` to the dimensions of `like` when a vector-typed kernel
/// produced the right elements in the wrong orientation. Partials handed
/// to propagate_grad always match the operand value's shape.
pub(crate) fn shaped_like<T: Element>(m: Matrix<T>, like: &Matrix<T>) -> Matrix<T> {
    if m.rows() == like.rows() && m.cols() == like.cols() {
        m
    } else {
        let reshaped = m.reshape(like.rows(), like.cols());
        m.release();
        reshaped
    }
}

/// The closed sum over every catalog entry.
pub enum Function<T: Element> {
    Unary(Unary<T>),
    Add(Add<T>),
    Sub(Sub<T>),
    AddScalar(AddScalar<T>),
    SubScalar(SubScalar<T>),
    ReverseSub(ReverseSub<T>),
    Prod(Prod<T>),
    Div(Div<T>),
    ProdScalar(ProdScalar<T>),
    DivScalar(DivScalar<T>),
    Pow(Pow<T>),
    Max(Max<T>),
    Min(Min<T>),
    Mul(Mul<T>),
    Dot(Dot<T>),
    At(At<T>),
    AtVec(AtVec<T>),
    View(View<T>),
    RowView(RowView<T>),
    ColView(ColView<T>),
    VecView(VecView<T>),
    Reshape(Reshape<T>),
    RotateR(RotateR<T>),
    Transpose(Transpose<T>),
    MaxPooling(MaxPooling<T>),
    ReduceSum(ReduceSum<T>),
    ReduceMean(ReduceMean<T>),
    Softmax(Softmax<T>),
    LogSoftmax(LogSoftmax<T>),
    SparseMax(SparseMax<T>),
    SparseMaxLoss(SparseMaxLoss<T>),
    Celu(Celu<T>),
    Elu(Elu<T>),
    SwishB(SwishB<T>),
    LeakyRelu(LeakyRelu<T>),
    Selu(Selu<T>),
    SoftPlus(SoftPlus<T>),
    SoftShrink(SoftShrink<T>),
    Threshold(Threshold<T>),
    Dropout(Dropout<T>),
    Concat(Concat<T>),
    Stack(Stack<T>),
    SumList(SumList<T>),
    MeanList(MeanList<T>),
}

impl<T: Element> Function<T> {
    /// Compute the forward value from the operand values.
    pub fn forward(&self) -> Matrix<T> {
        match self {
            Function::Unary(f) => f.forward(),
            Function::Add(f) => f.forward(),
            Function::Sub(f) => f.forward(),
            Function::AddScalar(f) => f.forward(),
            Function::SubScalar(f) => f.forward(),
            Function::ReverseSub(f) => f.forward(),
            Function::Prod(f) => f.forward(),
            Function::Div(f) => f.forward(),
            Function::ProdScalar(f) => f.forward(),
            Function::DivScalar(f) => f.forward(),
            Function::Pow(f) => f.forward(),
            Function::Max(f) => f.forward(),
            Function::Min(f) => f.forward(),
            Function::Mul(f) => f.forward(),
            Function::Dot(f) => f.forward(),
            Function::At(f) => f.forward(),
            Function::AtVec(f) => f.forward(),
            Function::View(f) => f.forward(),
            Function::RowView(f) => f.forward(),
            Function::ColView(f) => f.forward(),
            Function::VecView(f) => f.forward(),
            Function::Reshape(f) => f.forward(),
            Function::RotateR(f) => f.forward(),
            Function::Transpose(f) => f.forward(),
            Function::MaxPooling(f) => f.forward(),
            Function::ReduceSum(f) => f.forward(),
            Function::ReduceMean(f) => f.forward(),
            Function::Softmax(f) => f.forward(),
            Function::LogSoftmax(f) => f.forward(),
            Function::SparseMax(f) => f.forward(),
            Function::SparseMaxLoss(f) => f.forward(),
            Function::Celu(f) => f.forward(),
            Function::Elu(f) => f.forward(),
            Function::SwishB(f) => f.forward(),
            Function::LeakyRelu(f) => f.forward(),
            Function::Selu(f) => f.forward(),
            Function::SoftPlus(f) => f.forward(),
            Function::SoftShrink(f) => f.forward(),
            Function::Threshold(f) => f.forward(),
            Function::Dropout(f) => f.forward(),
            Function::Concat(f) => f.forward(),
            Function::Stack(f) => f.forward(),
            Function::SumList(f) => f.forward(),
            Function::MeanList(f) => f.forward(),
        }
    }

    /// Propagate the output gradient to the operands that require grad.
    pub fn backward(&self, gy: &Matrix<T>) {
        match self {
            Function::Unary(f) => f.backward(gy),
            Function::Add(f) => f.backward(gy),
            Function::Sub(f) => f.backward(gy),
            Function::AddScalar(f) => f.backward(gy),
            Function::SubScalar(f) => f.backward(gy),
            Function::ReverseSub(f) => f.backward(gy),
            Function::Prod(f) => f.backward(gy),
            Function::Div(f) => f.backward(gy),
            Function::ProdScalar(f) => f.backward(gy),
            Function::DivScalar(f) => f.backward(gy),
            Function::Pow(f) => f.backward(gy),
            Function::Max(f) => f.backward(gy),
            Function::Min(f) => f.backward(gy),
            Function::Mul(f) => f.backward(gy),
            Function::Dot(f) => f.backward(gy),
            Function::At(f) => f.backward(gy),
            Function::AtVec(f) => f.backward(gy),
            Function::View(f) => f.backward(gy),
            Function::RowView(f) => f.backward(gy),
            Function::ColView(f) => f.backward(gy),
            Function::VecView(f) => f.backward(gy),
            Function::Reshape(f) => f.backward(gy),
            Function::RotateR(f) => f.backward(gy),
            Function::Transpose(f) => f.backward(gy),
            Function::MaxPooling(f) => f.backward(gy),
            Function::ReduceSum(f) => f.backward(gy),
            Function::ReduceMean(f) => f.backward(gy),
            Function::Softmax(f) => f.backward(gy),
            Function::LogSoftmax(f) => f.backward(gy),
            Function::SparseMax(f) => f.backward(gy),
            Function::SparseMaxLoss(f) => f.backward(gy),
            Function::Celu(f) => f.backward(gy),
            Function::Elu(f) => f.backward(gy),
            Function::SwishB(f) => f.backward(gy),
            Function::LeakyRelu(f) => f.backward(gy),
            Function::Selu(f) => f.backward(gy),
            Function::SoftPlus(f) => f.backward(gy),
            Function::SoftShrink(f) => f.backward(gy),
            Function::Threshold(f) => f.backward(gy),
            Function::Dropout(f) => f.backward(gy),
            Function::Concat(f) => f.backward(gy),
            Function::Stack(f) => f.backward(gy),
            Function::SumList(f) => f.backward(gy),
            Function::MeanList(f) => f.backward(gy),
        }
    }

    /// The operand nodes, in positional order.
    pub fn operands(&self) -> Vec<Node<T>> {
        match self {
            Function::Unary(f) => f.operands(),
            Function::Add(f) => f.operands(),
            Function::Sub(f) => f.operands(),
            Function::AddScalar(f) => f.operands(),
            Function::SubScalar(f) => f.operands(),
            Function::ReverseSub(f) => f.operands(),
            Function::Prod(f) => f.operands(),
            Function::Div(f) => f.operands(),
            Function::ProdScalar(f) => f.operands(),
            Function::DivScalar(f) => f.operands(),
            Function::Pow(f) => f.operands(),
            Function::Max(f) => f.operands(),
            Function::Min(f) => f.operands(),
            Function::Mul(f) => f.operands(),
            Function::Dot(f) => f.operands(),
            Function::At(f) => f.operands(),
            Function::AtVec(f) => f.operands(),
            Function::View(f) => f.operands(),
            Function::RowView(f) => f.operands(),
            Function::ColView(f) => f.operands(),
            Function::VecView(f) => f.operands(),
            Function::Reshape(f) => f.operands(),
            Function::RotateR(f) => f.operands(),
            Function::Transpose(f) => f.operands(),
            Function::MaxPooling(f) => f.operands(),
            Function::ReduceSum(f) => f.operands(),
            Function::ReduceMean(f) => f.operands(),
            Function::Softmax(f) => f.operands(),
            Function::LogSoftmax(f) => f.operands(),
            Function::SparseMax(f) => f.operands(),
            Function::SparseMaxLoss(f) => f.operands(),
            Function::Celu(f) => f.operands(),
            Function::Elu(f) => f.operands(),
            Function::SwishB(f) => f.operands(),
            Function::LeakyRelu(f) => f.operands(),
            Function::Selu(f) => f.operands(),
            Function::SoftPlus(f) => f.operands(),
            Function::SoftShrink(f) => f.operands(),
            Function::Threshold(f) => f.operands(),
            Function::Dropout(f) => f.operands(),
            Function::Concat(f) => f.operands(),
            Function::Stack(f) => f.operands(),
            Function::SumList(f) => f.operands(),
            Function::MeanList(f) => f.operands(),
        }
    }

    /// The stable symbolic name of the primitive.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Unary(f) => f.kind().name(),
            Function::Add(_) => "add",
            Function::Sub(_) => "sub",
            Function::AddScalar(_) => "add_scalar",
            Function::SubScalar(_) => "sub_scalar",
            Function::ReverseSub(_) => "reverse_sub",
            Function::Prod(_) => "prod",
            Function::Div(_) => "div",
            Function::ProdScalar(_) => "prod_scalar",
            Function::DivScalar(_) => "div_scalar",
            Function::Pow(_) => "pow",
            Function::Max(_) => "max",
            Function::Min(_) => "min",
            Function::Mul(_) => "mul",
            Function::Dot(_) => "dot",
            Function::At(_) => "at",
            Function::AtVec(_) => "at_vec",
            Function::View(_) => "view",
            Function::RowView(_) => "row_view",
            Function::ColView(_) => "col_view",
            Function::VecView(_) => "vec",
            Function::Reshape(_) => "reshape",
            Function::RotateR(_) => "rotate_r",
            Function::Transpose(_) => "transpose",
            Function::MaxPooling(_) => "max_pooling",
            Function::ReduceSum(_) => "reduce_sum",
            Function::ReduceMean(_) => "reduce_mean",
            Function::Softmax(_) => "softmax",
            Function::LogSoftmax(_) => "log_softmax",
            Function::SparseMax(_) => "sparse_max",
            Function::SparseMaxLoss(_) => "sparse_max_loss",
            Function::Celu(_) => "celu",
            Function::Elu(_) => "elu",
            Function::SwishB(_) => "swish_b",
            Function::LeakyRelu(_) => "leaky_relu",
            Function::Selu(_) => "selu",
            Function::SoftPlus(_) => "soft_plus",
            Function::SoftShrink(_) => "soft_shrink",
            Function::Threshold(_) => "threshold",
            Function::Dropout(_) => "dropout",
            Function::Concat(_) => "concat",
            Function::Stack(_) => "stack",
            Function::SumList(_) => "sum",
            Function::MeanList(_) => "mean",
        }
    }
}
