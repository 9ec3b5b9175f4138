use stoat_ag::{Graph, Node};
use stoat_core::{Element, Matrix};

use crate::affine::affine;

// LSTM — Long Short-Term Memory cell over the computation graph
//
// Gate equations:
//   inG  = sigmoid(wIn  @ x + bIn  + wInRec  @ yPrev)
//   outG = sigmoid(wOut @ x + bOut + wOutRec @ yPrev)
//   forG = sigmoid(wFor @ x + bFor + wForRec @ yPrev)
//   cand = tanh(wCand @ x + bCand + wCandRec @ yPrev)
//   cell = inG ∘ cand + forG ∘ cellPrev
//   y    = outG ∘ tanh(cell)
//
// Inputs and states are column vectors. The unrolled forward bumps the
// graph's time-step between steps so truncated backpropagation can cut
// the sequence at a step boundary.

/// The state produced by one LSTM step.
pub struct LstmState<T: Element> {
    pub in_gate: Node<T>,
    pub out_gate: Node<T>,
    pub forget_gate: Node<T>,
    pub candidate: Node<T>,
    pub cell: Node<T>,
    pub y: Node<T>,
}

/// One gate's parameter triple: input weights, recurrent weights, bias.
struct GateParams<T: Element> {
    w: Node<T>,
    w_rec: Node<T>,
    b: Node<T>,
}

impl<T: Element> GateParams<T> {
    fn zeros(g: &Graph<T>, input: usize, output: usize) -> Self {
        GateParams {
            w: g.new_variable(Matrix::zeros(output, input), true),
            w_rec: g.new_variable(Matrix::zeros(output, output), true),
            b: g.new_variable(Matrix::zeros(output, 1), true),
        }
    }

    fn from_matrices(g: &Graph<T>, w: Matrix<T>, w_rec: Matrix<T>, b: Matrix<T>) -> Self {
        GateParams {
            w: g.new_variable(w, true),
            w_rec: g.new_variable(w_rec, true),
            b: g.new_variable(b, true),
        }
    }
}

/// An LSTM cell whose parameters are variables of a graph.
pub struct Lstm<T: Element> {
    input_gate: GateParams<T>,
    output_gate: GateParams<T>,
    forget_gate: GateParams<T>,
    candidate: GateParams<T>,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl<T: Element> Lstm<T> {
    /// Create a cell with zero-initialized parameters.
    pub fn new(g: &Graph<T>, input_size: usize, hidden_size: usize) -> Self {
        Lstm {
            input_gate: GateParams::zeros(g, input_size, hidden_size),
            output_gate: GateParams::zeros(g, input_size, hidden_size),
            forget_gate: GateParams::zeros(g, input_size, hidden_size),
            candidate: GateParams::zeros(g, input_size, hidden_size),
            input_size,
            hidden_size,
        }
    }

    /// Create a cell from explicit parameter matrices, ordered
    /// (w, w_rec, b) for input, output, forget, candidate.
    #[allow(clippy::type_complexity)]
    pub fn from_matrices(
        g: &Graph<T>,
        input_size: usize,
        hidden_size: usize,
        params: [(Matrix<T>, Matrix<T>, Matrix<T>); 4],
    ) -> Self {
        let [ig, og, fg, cand] = params;
        Lstm {
            input_gate: GateParams::from_matrices(g, ig.0, ig.1, ig.2),
            output_gate: GateParams::from_matrices(g, og.0, og.1, og.2),
            forget_gate: GateParams::from_matrices(g, fg.0, fg.1, fg.2),
            candidate: GateParams::from_matrices(g, cand.0, cand.1, cand.2),
            input_size,
            hidden_size,
        }
    }

    /// Every parameter node, for gradient inspection and updates.
    pub fn parameters(&self) -> Vec<Node<T>> {
        let mut out = Vec::with_capacity(12);
        for gate in [
            &self.input_gate,
            &self.output_gate,
            &self.forget_gate,
            &self.candidate,
        ] {
            out.push(gate.w.clone());
            out.push(gate.w_rec.clone());
            out.push(gate.b.clone());
        }
        out
    }

    /// One forward step from an optional previous state.
    pub fn next(&self, g: &Graph<T>, state: Option<&LstmState<T>>, x: &Node<T>) -> LstmState<T> {
        let (y_prev, cell_prev) = match state {
            Some(s) => (Some(&s.y), Some(&s.cell)),
            None => (None, None),
        };

        let in_gate = g.sigmoid(&affine(
            g,
            &self.input_gate.b,
            &[
                (&self.input_gate.w, Some(x)),
                (&self.input_gate.w_rec, y_prev),
            ],
        ));
        let out_gate = g.sigmoid(&affine(
            g,
            &self.output_gate.b,
            &[
                (&self.output_gate.w, Some(x)),
                (&self.output_gate.w_rec, y_prev),
            ],
        ));
        let forget_gate = g.sigmoid(&affine(
            g,
            &self.forget_gate.b,
            &[
                (&self.forget_gate.w, Some(x)),
                (&self.forget_gate.w_rec, y_prev),
            ],
        ));
        let candidate = g.tanh(&affine(
            g,
            &self.candidate.b,
            &[
                (&self.candidate.w, Some(x)),
                (&self.candidate.w_rec, y_prev),
            ],
        ));

        let cell = match cell_prev {
            Some(prev) => g.add(
                &g.prod(&in_gate, &candidate),
                &g.prod(&forget_gate, prev),
            ),
            None => g.prod(&in_gate, &candidate),
        };
        let y = g.prod(&out_gate, &g.tanh(&cell));

        LstmState {
            in_gate,
            out_gate,
            forget_gate,
            candidate,
            cell,
            y,
        }
    }

    /// Unroll the cell over a sequence, bumping the graph's time-step
    /// between steps. Returns the output node of every step.
    pub fn forward(&self, g: &Graph<T>, xs: &[Node<T>]) -> Vec<Node<T>> {
        let mut ys = Vec::with_capacity(xs.len());
        let mut state: Option<LstmState<T>> = None;
        for (i, x) in xs.iter().enumerate() {
            if i > 0 {
                g.increment_time_step();
            }
            let next = self.next(g, state.as_ref(), x);
            ys.push(next.y.clone());
            state = Some(next);
        }
        ys
    }
}
