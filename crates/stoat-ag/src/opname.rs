use std::str::FromStr;

use stoat_core::{Element, Error, Result};

use crate::graph::Graph;
use crate::node::Node;

// Symbolic operator names and by-name construction.
//
// Every catalog entry has a stable symbolic name. Generic code (test
// harnesses, serializers, dynamically defined layers) resolves a name to
// an OpName once and then constructs operators through the table below —
// a match on the enum, not reflection.

/// The stable enumeration of every operator in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpName {
    Identity,
    Dropout,
    At,
    AtVec,
    Add,
    Sub,
    SubScalar,
    AddScalar,
    ReverseSub,
    Prod,
    Div,
    ProdScalar,
    DivScalar,
    Mul,
    Dot,
    Reshape,
    MaxPooling,
    View,
    RowView,
    ColView,
    Vec,
    RotateR,
    Transpose,
    Square,
    Pow,
    Sqrt,
    Tan,
    Tanh,
    Sigmoid,
    HardSigmoid,
    HardTanh,
    Softsign,
    Relu,
    Celu,
    Gelu,
    Elu,
    PositiveElu,
    SwishB,
    Swish,
    Silu,
    Mish,
    LeakyRelu,
    Selu,
    SoftPlus,
    SoftShrink,
    Threshold,
    Softmax,
    LogSoftmax,
    SparseMax,
    SparseMaxLoss,
    Sin,
    Cos,
    Exp,
    Log,
    Abs,
    Neg,
    Reciprocal,
    Max,
    Min,
    ReduceSum,
    ReduceMean,
    Mean,
    Sum,
    Concat,
    Stack,
}

impl OpName {
    /// Every catalog entry, in enumeration order.
    pub const ALL: [OpName; 65] = [
        OpName::Identity,
        OpName::Dropout,
        OpName::At,
        OpName::AtVec,
        OpName::Add,
        OpName::Sub,
        OpName::SubScalar,
        OpName::AddScalar,
        OpName::ReverseSub,
        OpName::Prod,
        OpName::Div,
        OpName::ProdScalar,
        OpName::DivScalar,
        OpName::Mul,
        OpName::Dot,
        OpName::Reshape,
        OpName::MaxPooling,
        OpName::View,
        OpName::RowView,
        OpName::ColView,
        OpName::Vec,
        OpName::RotateR,
        OpName::Transpose,
        OpName::Square,
        OpName::Pow,
        OpName::Sqrt,
        OpName::Tan,
        OpName::Tanh,
        OpName::Sigmoid,
        OpName::HardSigmoid,
        OpName::HardTanh,
        OpName::Softsign,
        OpName::Relu,
        OpName::Celu,
        OpName::Gelu,
        OpName::Elu,
        OpName::PositiveElu,
        OpName::SwishB,
        OpName::Swish,
        OpName::Silu,
        OpName::Mish,
        OpName::LeakyRelu,
        OpName::Selu,
        OpName::SoftPlus,
        OpName::SoftShrink,
        OpName::Threshold,
        OpName::Softmax,
        OpName::LogSoftmax,
        OpName::SparseMax,
        OpName::SparseMaxLoss,
        OpName::Sin,
        OpName::Cos,
        OpName::Exp,
        OpName::Log,
        OpName::Abs,
        OpName::Neg,
        OpName::Reciprocal,
        OpName::Max,
        OpName::Min,
        OpName::ReduceSum,
        OpName::ReduceMean,
        OpName::Mean,
        OpName::Sum,
        OpName::Concat,
        OpName::Stack,
    ];

    /// The symbolic name.
    pub fn as_str(self) -> &'static str {
        match self {
            OpName::Identity => "identity",
            OpName::Dropout => "dropout",
            OpName::At => "at",
            OpName::AtVec => "at_vec",
            OpName::Add => "add",
            OpName::Sub => "sub",
            OpName::SubScalar => "sub_scalar",
            OpName::AddScalar => "add_scalar",
            OpName::ReverseSub => "reverse_sub",
            OpName::Prod => "prod",
            OpName::Div => "div",
            OpName::ProdScalar => "prod_scalar",
            OpName::DivScalar => "div_scalar",
            OpName::Mul => "mul",
            OpName::Dot => "dot",
            OpName::Reshape => "reshape",
            OpName::MaxPooling => "max_pooling",
            OpName::View => "view",
            OpName::RowView => "row_view",
            OpName::ColView => "col_view",
            OpName::Vec => "vec",
            OpName::RotateR => "rotate_r",
            OpName::Transpose => "transpose",
            OpName::Square => "square",
            OpName::Pow => "pow",
            OpName::Sqrt => "sqrt",
            OpName::Tan => "tan",
            OpName::Tanh => "tanh",
            OpName::Sigmoid => "sigmoid",
            OpName::HardSigmoid => "hard_sigmoid",
            OpName::HardTanh => "hard_tanh",
            OpName::Softsign => "softsign",
            OpName::Relu => "relu",
            OpName::Celu => "celu",
            OpName::Gelu => "gelu",
            OpName::Elu => "elu",
            OpName::PositiveElu => "positive_elu",
            OpName::SwishB => "swish_b",
            OpName::Swish => "swish",
            OpName::Silu => "silu",
            OpName::Mish => "mish",
            OpName::LeakyRelu => "leaky_relu",
            OpName::Selu => "selu",
            OpName::SoftPlus => "soft_plus",
            OpName::SoftShrink => "soft_shrink",
            OpName::Threshold => "threshold",
            OpName::Softmax => "softmax",
            OpName::LogSoftmax => "log_softmax",
            OpName::SparseMax => "sparse_max",
            OpName::SparseMaxLoss => "sparse_max_loss",
            OpName::Sin => "sin",
            OpName::Cos => "cos",
            OpName::Exp => "exp",
            OpName::Log => "log",
            OpName::Abs => "abs",
            OpName::Neg => "neg",
            OpName::Reciprocal => "reciprocal",
            OpName::Max => "max",
            OpName::Min => "min",
            OpName::ReduceSum => "reduce_sum",
            OpName::ReduceMean => "reduce_mean",
            OpName::Mean => "mean",
            OpName::Sum => "sum",
            OpName::Concat => "concat",
            OpName::Stack => "stack",
        }
    }
}

impl FromStr for OpName {
    type Err = Error;

    /// Case-insensitive lookup of a symbolic name.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        OpName::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| Error::UnknownOperator(s.to_string()))
    }
}

impl std::fmt::Display for OpName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn fixed<const N: usize, T: Element>(op: OpName, xs: &[Node<T>]) -> Result<[&Node<T>; N]> {
    if xs.len() != N {
        return Err(Error::WrongOperandCount {
            op: op.as_str(),
            expected: N,
            got: xs.len(),
        });
    }
    let mut out = [&xs[0]; N];
    for (slot, x) in out.iter_mut().zip(xs.iter()) {
        *slot = x;
    }
    Ok(out)
}

fn variadic<T: Element>(op: OpName, xs: &[Node<T>]) -> Result<&[Node<T>]> {
    if xs.is_empty() {
        return Err(Error::WrongOperandCount {
            op: op.as_str(),
            expected: 1,
            got: 0,
        });
    }
    Ok(xs)
}

impl<T: Element> Graph<T> {
    /// Construct an operator from its symbolic name and operand nodes.
    ///
    /// Operators whose constructors need non-node parameters (indices,
    /// probabilities, exponents) cannot be built this way and report
    /// [`Error::NotInvocableByName`].
    pub fn new_operator_by_name(&self, op: OpName, xs: &[Node<T>]) -> Result<Node<T>> {
        let node = match op {
            OpName::Identity => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.identity(x)
            }
            OpName::Add => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.add(a, b)
            }
            OpName::Sub => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.sub(a, b)
            }
            OpName::SubScalar => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.sub_scalar(a, b)
            }
            OpName::AddScalar => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.add_scalar(a, b)
            }
            OpName::ReverseSub => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.reverse_sub(a, b)
            }
            OpName::Prod => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.prod(a, b)
            }
            OpName::Div => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.div(a, b)
            }
            OpName::ProdScalar => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.prod_scalar(a, b)
            }
            OpName::DivScalar => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.div_scalar(a, b)
            }
            OpName::Mul => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.mul(a, b)
            }
            OpName::Dot => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.dot(a, b)
            }
            OpName::Max => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.max(a, b)
            }
            OpName::Min => {
                let [a, b] = fixed::<2, T>(op, xs)?;
                self.min(a, b)
            }
            OpName::Vec => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.vec(x)
            }
            OpName::Transpose => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.t(x)
            }
            OpName::Square => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.square(x)
            }
            OpName::Sqrt => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.sqrt(x)
            }
            OpName::Tan => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.tan(x)
            }
            OpName::Tanh => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.tanh(x)
            }
            OpName::Sigmoid => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.sigmoid(x)
            }
            OpName::HardSigmoid => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.hard_sigmoid(x)
            }
            OpName::HardTanh => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.hard_tanh(x)
            }
            OpName::Softsign => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.softsign(x)
            }
            OpName::Relu => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.relu(x)
            }
            OpName::Celu => {
                let [x, alpha] = fixed::<2, T>(op, xs)?;
                self.celu(x, alpha)
            }
            OpName::Gelu => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.gelu(x)
            }
            OpName::Elu => {
                let [x, alpha] = fixed::<2, T>(op, xs)?;
                self.elu(x, alpha)
            }
            OpName::PositiveElu => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.positive_elu(x)
            }
            OpName::SwishB => {
                let [x, beta] = fixed::<2, T>(op, xs)?;
                self.swish_b(x, beta)
            }
            OpName::Swish => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.swish(x)
            }
            OpName::Silu => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.silu(x)
            }
            OpName::Mish => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.mish(x)
            }
            OpName::LeakyRelu => {
                let [x, alpha] = fixed::<2, T>(op, xs)?;
                self.leaky_relu(x, alpha)
            }
            OpName::Selu => {
                let [x, alpha, scale] = fixed::<3, T>(op, xs)?;
                self.selu(x, alpha, scale)
            }
            OpName::SoftPlus => {
                let [x, beta, threshold] = fixed::<3, T>(op, xs)?;
                self.soft_plus(x, beta, threshold)
            }
            OpName::SoftShrink => {
                let [x, lambda] = fixed::<2, T>(op, xs)?;
                self.soft_shrink(x, lambda)
            }
            OpName::Threshold => {
                let [x, threshold, k] = fixed::<3, T>(op, xs)?;
                self.threshold(x, threshold, k)
            }
            OpName::Softmax => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.softmax(x)
            }
            OpName::LogSoftmax => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.log_softmax(x)
            }
            OpName::SparseMax => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.sparse_max(x)
            }
            OpName::SparseMaxLoss => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.sparse_max_loss(x)
            }
            OpName::Sin => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.sin(x)
            }
            OpName::Cos => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.cos(x)
            }
            OpName::Exp => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.exp(x)
            }
            OpName::Log => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.log(x)
            }
            OpName::Abs => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.abs(x)
            }
            OpName::Neg => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.neg(x)
            }
            OpName::Reciprocal => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.reciprocal(x)
            }
            OpName::ReduceSum => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.reduce_sum(x)
            }
            OpName::ReduceMean => {
                let [x] = fixed::<1, T>(op, xs)?;
                self.reduce_mean(x)
            }
            OpName::Mean => self.mean(variadic(op, xs)?),
            OpName::Sum => self.sum(variadic(op, xs)?),
            OpName::Concat => self.concat(variadic(op, xs)?),
            OpName::Stack => self.stack(variadic(op, xs)?),
            OpName::Dropout
            | OpName::At
            | OpName::AtVec
            | OpName::Reshape
            | OpName::MaxPooling
            | OpName::View
            | OpName::RowView
            | OpName::ColView
            | OpName::RotateR
            | OpName::Pow => return Err(Error::NotInvocableByName(op.as_str())),
        };
        Ok(node)
    }
}
