use std::sync::{Arc, Mutex, Weak};

use stoat_core::{Element, Matrix};

use crate::graph::{Graph, GraphInner};
use crate::operator::Operator;

// Node — The uniform participant type of a computation graph
//
// A node is one of four variants:
//
//   Variable — a leaf with a user-supplied value, optionally trainable
//   Constant — an immutable leaf that never requires grad
//   Operator — wraps a function; its value is computed on a background task
//   Wrap     — a grad-inert view of a node that lives in another graph
//
// The graph owns the node data; user code and operator functions hold
// cheap `Node` handles (an Arc to the data plus a weak pointer back to the
// owning graph). Handles stay valid across threads, so forward tasks can
// read operand values while the caller keeps building the graph.

/// Data of a leaf node holding a user-supplied value.
pub(crate) struct Variable<T: Element> {
    pub(crate) time_step: i64,
    pub(crate) requires_grad: bool,
    pub(crate) value: Matrix<T>,
    pub(crate) grad: Mutex<Option<Matrix<T>>>,
}

/// Data of an immutable leaf node.
pub(crate) struct Constant<T: Element> {
    pub(crate) time_step: i64,
    pub(crate) value: Matrix<T>,
}

/// Data of a handle into a foreign graph. The value is borrowed from the
/// source node; gradients never flow through a wrap.
pub(crate) struct Wrap<T: Element> {
    pub(crate) time_step: i64,
    pub(crate) source: Node<T>,
}

/// The closed sum over node variants. Owned by the graph, shared with
/// handles via Arc.
pub(crate) enum NodeData<T: Element> {
    Variable(Variable<T>),
    Constant(Constant<T>),
    Operator(Operator<T>),
    Wrap(Wrap<T>),
}

/// A handle to a node of a [`Graph`]. Clones are cheap and all clones
/// refer to the same node.
pub struct Node<T: Element> {
    pub(crate) id: usize,
    pub(crate) graph_id: u64,
    pub(crate) data: Arc<NodeData<T>>,
    pub(crate) graph: Weak<GraphInner<T>>,
}

impl<T: Element> Clone for Node<T> {
    fn clone(&self) -> Self {
        Node {
            id: self.id,
            graph_id: self.graph_id,
            data: Arc::clone(&self.data),
            graph: Weak::clone(&self.graph),
        }
    }
}

impl<T: Element> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node(graph={}, id={}, {})", self.graph_id, self.id, self.name())
    }
}

impl<T: Element> Node<T> {
    /// The index of this node within its graph (creation order).
    pub fn id(&self) -> usize {
        self.id
    }

    /// The graph this node belongs to.
    ///
    /// Panics when the graph has been dropped — a node must not outlive
    /// its graph.
    pub fn graph(&self) -> Graph<T> {
        Graph::from_inner(
            self.graph
                .upgrade()
                .expect("node: owning graph was dropped"),
        )
    }

    /// The time-step the node was created at.
    pub fn time_step(&self) -> i64 {
        match &*self.data {
            NodeData::Variable(v) => v.time_step,
            NodeData::Constant(c) => c.time_step,
            NodeData::Operator(o) => o.time_step,
            NodeData::Wrap(w) => w.time_step,
        }
    }

    /// Whether gradients are computed for this node.
    pub fn requires_grad(&self) -> bool {
        match &*self.data {
            NodeData::Variable(v) => v.requires_grad,
            NodeData::Constant(_) => false,
            NodeData::Operator(o) => o.requires_grad,
            NodeData::Wrap(_) => false,
        }
    }

    /// The value of this node. For operators this blocks until the forward
    /// task has published; repeated calls return the same matrix.
    pub fn value(&self) -> Matrix<T> {
        match &*self.data {
            NodeData::Variable(v) => v.value.clone(),
            NodeData::Constant(c) => c.value.clone(),
            NodeData::Operator(o) => o.value(),
            NodeData::Wrap(w) => w.source.value(),
        }
    }

    /// The accumulated gradient, or None when no gradient has been
    /// propagated to this node.
    pub fn grad(&self) -> Option<Matrix<T>> {
        match &*self.data {
            NodeData::Variable(v) => v.grad.lock().unwrap().clone(),
            NodeData::Constant(_) => None,
            NodeData::Operator(o) => o.grad(),
            NodeData::Wrap(_) => None,
        }
    }

    /// Accumulate a partial gradient into this node.
    ///
    /// For operators this also decrements the pending-grads counter and,
    /// when the counter reaches zero during an active backward pass,
    /// schedules the operator's own backward. Constants and wraps ignore
    /// incoming gradients.
    pub fn propagate_grad(&self, partial: Matrix<T>) {
        match &*self.data {
            NodeData::Variable(v) => {
                if !v.requires_grad {
                    return;
                }
                let mut grad = v.grad.lock().unwrap();
                match grad.as_mut() {
                    None => *grad = Some(partial),
                    Some(g) => {
                        g.add_assign(&partial);
                        partial.release();
                    }
                }
            }
            NodeData::Constant(_) | NodeData::Wrap(_) => {}
            NodeData::Operator(o) => {
                if !o.requires_grad {
                    return;
                }
                o.accumulate_grad(partial);
                let arrived = o.note_contribution();
                if arrived {
                    if let Some(inner) = self.graph.upgrade() {
                        if let Some(pass) = inner.active_pass() {
                            pass.enqueue(self.clone());
                        }
                    }
                }
            }
        }
    }

    /// Release the gradient buffer and reset the pending-grads counter.
    pub fn zero_grad(&self) {
        match &*self.data {
            NodeData::Variable(v) => {
                if let Some(g) = v.grad.lock().unwrap().take() {
                    g.release();
                }
            }
            NodeData::Constant(_) | NodeData::Wrap(_) => {}
            NodeData::Operator(o) => o.zero_grad(),
        }
    }

    /// The operand nodes consumed by this node's function. Empty for
    /// leaves and wraps.
    pub fn operands(&self) -> Vec<Node<T>> {
        match &*self.data {
            NodeData::Operator(o) => o.operands(),
            _ => Vec::new(),
        }
    }

    /// A short name describing the node: the operator's symbolic name, or
    /// the variant name for leaves.
    pub fn name(&self) -> &'static str {
        match &*self.data {
            NodeData::Variable(_) => "variable",
            NodeData::Constant(_) => "constant",
            NodeData::Operator(o) => o.name(),
            NodeData::Wrap(_) => "wrap",
        }
    }

    pub(crate) fn as_operator(&self) -> Option<&Operator<T>> {
        match &*self.data {
            NodeData::Operator(o) => Some(o),
            _ => None,
        }
    }

    /// Seed this node's gradient without touching the pending-grads
    /// bookkeeping. Used by the gradient engine for the backward root.
    pub(crate) fn seed_grad(&self, seed: Matrix<T>) {
        match &*self.data {
            NodeData::Variable(v) => {
                let mut grad = v.grad.lock().unwrap();
                match grad.as_mut() {
                    None => *grad = Some(seed),
                    Some(g) => {
                        g.add_assign(&seed);
                        seed.release();
                    }
                }
            }
            NodeData::Operator(o) => o.accumulate_grad(seed),
            NodeData::Constant(_) | NodeData::Wrap(_) => {}
        }
    }
}
