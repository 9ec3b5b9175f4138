use stoat_core::{Element, Matrix};

use crate::node::Node;

// Elementwise unary primitives that need no parameters beyond the operand.
// One record serves all of them: the kind selects the scalar function and
// its derivative, the way a backend op enum selects a kernel.

/// The parameter-free elementwise primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Identity,
    Neg,
    Abs,
    Square,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Reciprocal,
    Tanh,
    Sigmoid,
    HardSigmoid,
    HardTanh,
    Softsign,
    Relu,
    Gelu,
    PositiveElu,
    Swish,
    Silu,
    Mish,
}

fn sigmoid<T: Element>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

/// x·tanh(ln(1 + eˣ))
fn mish<T: Element>(x: T) -> T {
    x * x.exp().ln_1p().tanh()
}

const GELU_C: f64 = 0.797_884_560_802_865_4; // sqrt(2/pi)
const GELU_A: f64 = 0.044_715;

fn gelu<T: Element>(x: T) -> T {
    let half = T::from_f64(0.5);
    let c = T::from_f64(GELU_C);
    let a = T::from_f64(GELU_A);
    half * x * (T::one() + (c * (x + a * x * x * x)).tanh())
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Identity => "identity",
            UnaryKind::Neg => "neg",
            UnaryKind::Abs => "abs",
            UnaryKind::Square => "square",
            UnaryKind::Sqrt => "sqrt",
            UnaryKind::Exp => "exp",
            UnaryKind::Log => "log",
            UnaryKind::Sin => "sin",
            UnaryKind::Cos => "cos",
            UnaryKind::Tan => "tan",
            UnaryKind::Reciprocal => "reciprocal",
            UnaryKind::Tanh => "tanh",
            UnaryKind::Sigmoid => "sigmoid",
            UnaryKind::HardSigmoid => "hard_sigmoid",
            UnaryKind::HardTanh => "hard_tanh",
            UnaryKind::Softsign => "softsign",
            UnaryKind::Relu => "relu",
            UnaryKind::Gelu => "gelu",
            UnaryKind::PositiveElu => "positive_elu",
            UnaryKind::Swish => "swish",
            UnaryKind::Silu => "silu",
            UnaryKind::Mish => "mish",
        }
    }

    /// The scalar function y = f(x).
    fn apply<T: Element>(self, x: T) -> T {
        let one = T::one();
        let zero = T::zero();
        match self {
            UnaryKind::Identity => x,
            UnaryKind::Neg => -x,
            UnaryKind::Abs => x.abs(),
            UnaryKind::Square => x * x,
            UnaryKind::Sqrt => x.sqrt(),
            UnaryKind::Exp => x.exp(),
            UnaryKind::Log => x.ln(),
            UnaryKind::Sin => x.sin(),
            UnaryKind::Cos => x.cos(),
            UnaryKind::Tan => x.tan(),
            UnaryKind::Reciprocal => one / x,
            UnaryKind::Tanh => x.tanh(),
            UnaryKind::Sigmoid => sigmoid(x),
            UnaryKind::HardSigmoid => {
                let y = T::from_f64(0.2) * x + T::from_f64(0.5);
                y.max(zero).min(one)
            }
            UnaryKind::HardTanh => x.max(-one).min(one),
            UnaryKind::Softsign => x / (one + x.abs()),
            UnaryKind::Relu => x.max(zero),
            UnaryKind::Gelu => gelu(x),
            UnaryKind::PositiveElu => {
                if x > zero {
                    x + one
                } else {
                    x.exp()
                }
            }
            UnaryKind::Swish | UnaryKind::Silu => x * sigmoid(x),
            UnaryKind::Mish => mish(x),
        }
    }

    /// The scalar derivative dy/dx as a function of x.
    fn derivative<T: Element>(self, x: T) -> T {
        let one = T::one();
        let zero = T::zero();
        let two = T::from_f64(2.0);
        match self {
            UnaryKind::Identity => one,
            UnaryKind::Neg => -one,
            UnaryKind::Abs => {
                if x > zero {
                    one
                } else if x < zero {
                    -one
                } else {
                    zero
                }
            }
            UnaryKind::Square => two * x,
            UnaryKind::Sqrt => one / (two * x.sqrt()),
            UnaryKind::Exp => x.exp(),
            UnaryKind::Log => one / x,
            UnaryKind::Sin => x.cos(),
            UnaryKind::Cos => -x.sin(),
            UnaryKind::Tan => {
                let c = x.cos();
                one / (c * c)
            }
            UnaryKind::Reciprocal => -one / (x * x),
            UnaryKind::Tanh => {
                let t = x.tanh();
                one - t * t
            }
            UnaryKind::Sigmoid => {
                let s = sigmoid(x);
                s * (one - s)
            }
            UnaryKind::HardSigmoid => {
                let raw = T::from_f64(0.2) * x + T::from_f64(0.5);
                if raw > zero && raw < one {
                    T::from_f64(0.2)
                } else {
                    zero
                }
            }
            UnaryKind::HardTanh => {
                if x > -one && x < one {
                    one
                } else {
                    zero
                }
            }
            UnaryKind::Softsign => {
                let d = one + x.abs();
                one / (d * d)
            }
            UnaryKind::Relu => {
                if x > zero {
                    one
                } else {
                    zero
                }
            }
            UnaryKind::Gelu => {
                let half = T::from_f64(0.5);
                let c = T::from_f64(GELU_C);
                let a = T::from_f64(GELU_A);
                let three = T::from_f64(3.0);
                let u = c * (x + a * x * x * x);
                let t = u.tanh();
                let du = c * (one + three * a * x * x);
                half * (one + t) + half * x * (one - t * t) * du
            }
            UnaryKind::PositiveElu => {
                if x > zero {
                    one
                } else {
                    x.exp()
                }
            }
            UnaryKind::Swish | UnaryKind::Silu => {
                let s = sigmoid(x);
                s * (one + x * (one - s))
            }
            UnaryKind::Mish => {
                let t = x.exp().ln_1p().tanh();
                t + x * sigmoid(x) * (one - t * t)
            }
        }
    }
}

/// y = f(x), elementwise, for a parameter-free f.
pub struct Unary<T: Element> {
    x: Node<T>,
    kind: UnaryKind,
}

impl<T: Element> Unary<T> {
    pub fn new(x: Node<T>, kind: UnaryKind) -> Self {
        Unary { x, kind }
    }

    pub fn kind(&self) -> UnaryKind {
        self.kind
    }

    pub fn forward(&self) -> Matrix<T> {
        self.x.value().map(|v| self.kind.apply(v))
    }

    pub fn backward(&self, gy: &Matrix<T>) {
        if !self.x.requires_grad() {
            return;
        }
        let xv = self.x.value();
        let gx = xv.zip_map(gy, |x, g| g * self.kind.derivative(x));
        self.x.propagate_grad(gx);
    }

    pub fn operands(&self) -> Vec<Node<T>> {
        vec![self.x.clone()]
    }
}
