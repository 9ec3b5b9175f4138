use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;

use stoat_core::{Element, Matrix, Result};

use crate::backward::{self, BackwardOptions, PassState};
use crate::fns::Function;
use crate::node::{Constant, Node, NodeData, Variable, Wrap};
use crate::operator::Operator;
use crate::track;

// Graph — Owner of all nodes and entry point of the engine
//
// The graph is an arena: nodes live in a vector in creation order and
// handles address them by index. Creating an operator assigns the current
// time-step, schedules its forward on a fresh task, and hands back a
// handle; nothing is evaluated lazily and nothing is compiled.
//
// The time-step counter is not a wall clock. Recurrent layers bump it via
// increment_time_step() between logical steps so truncated backpropagation
// can cut the graph at a step boundary.

/// Processing mode of a graph. Stochastic operators (dropout) are inert in
/// inference mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

/// Configuration for a new [`Graph`].
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Seed for the graph's random generator (dropout masks). None seeds
    /// from entropy.
    pub seed: Option<u64>,
    /// Initial processing mode.
    pub mode: Mode,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            seed: None,
            mode: Mode::Training,
        }
    }
}

impl GraphConfig {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) struct GraphInner<T: Element> {
    pub(crate) id: u64,
    nodes: RwLock<Vec<Arc<NodeData<T>>>>,
    time_step: AtomicI64,
    mode: AtomicU8,
    pub(crate) rng: Arc<Mutex<StdRng>>,
    /// The backward pass currently draining, if any. Installed by
    /// Graph::backward and consulted by Node::propagate_grad to schedule
    /// operators whose pending count reaches zero.
    pass: Mutex<Option<Arc<PassState<T>>>>,
}

impl<T: Element> GraphInner<T> {
    pub(crate) fn active_pass(&self) -> Option<Arc<PassState<T>>> {
        self.pass.lock().unwrap().clone()
    }

    pub(crate) fn install_pass(&self, pass: Arc<PassState<T>>) {
        *self.pass.lock().unwrap() = Some(pass);
    }

    pub(crate) fn clear_pass(&self) {
        *self.pass.lock().unwrap() = None;
    }
}

/// A define-by-run computation graph.
///
/// Clones share the same underlying graph.
pub struct Graph<T: Element> {
    inner: Arc<GraphInner<T>>,
}

impl<T: Element> Clone for Graph<T> {
    fn clone(&self) -> Self {
        Graph {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> Graph<T> {
    /// Create a graph with the default configuration (training mode,
    /// entropy-seeded RNG).
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create a graph from an explicit configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Graph {
            inner: Arc::new(GraphInner {
                id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
                nodes: RwLock::new(Vec::new()),
                time_step: AtomicI64::new(0),
                mode: AtomicU8::new(config.mode as u8),
                rng: Arc::new(Mutex::new(rng)),
                pass: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<GraphInner<T>>) -> Self {
        Graph { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<GraphInner<T>> {
        &self.inner
    }

    // Factories

    /// Create a leaf node with a user-supplied value.
    pub fn new_variable(&self, value: Matrix<T>, requires_grad: bool) -> Node<T> {
        let data = NodeData::Variable(Variable {
            time_step: self.time_step(),
            requires_grad,
            value,
            grad: Mutex::new(None),
        });
        self.register(data)
    }

    /// Create an immutable tensor leaf.
    pub fn new_constant(&self, value: Matrix<T>) -> Node<T> {
        let data = NodeData::Constant(Constant {
            time_step: self.time_step(),
            value,
        });
        self.register(data)
    }

    /// Create an immutable 1×1 leaf.
    pub fn new_scalar(&self, value: T) -> Node<T> {
        self.new_constant(Matrix::scalar(value))
    }

    /// Create an operator node around a catalog function and start its
    /// forward computation on a fresh task.
    ///
    /// The operator requires grad iff any of its operands does.
    pub fn new_operator(&self, fun: Function<T>) -> Node<T> {
        let operands = fun.operands();
        let requires_grad = operands.iter().any(|n| n.requires_grad());
        {
            let next_id = self.inner.nodes.read().unwrap().len();
            for operand in &operands {
                assert!(
                    operand.graph_id == self.inner.id,
                    "graph: operand belongs to another graph; wrap it first"
                );
                assert!(
                    operand.id < next_id,
                    "graph: operand {} does not precede the operator it feeds",
                    operand.id
                );
            }
        }
        let data = NodeData::Operator(Operator::new(self.time_step(), requires_grad, fun));
        let node = self.register(data);

        track::begin();
        let task_node = node.clone();
        thread::spawn(move || {
            let task = ForwardTask {
                node: task_node,
                published: false,
            };
            task.run();
        });
        node
    }

    /// Create a grad-inert view of a node from another graph, usable as an
    /// operand here. The wrap borrows the source's value and contributes
    /// nothing to backward in this graph.
    pub fn wrap(&self, source: &Node<T>) -> Node<T> {
        let data = NodeData::Wrap(Wrap {
            time_step: self.time_step(),
            source: source.clone(),
        });
        self.register(data)
    }

    fn register(&self, data: NodeData<T>) -> Node<T> {
        let data = Arc::new(data);
        let mut nodes = self.inner.nodes.write().unwrap();
        let id = nodes.len();
        nodes.push(Arc::clone(&data));
        Node {
            id,
            graph_id: self.inner.id,
            data,
            graph: Arc::downgrade(&self.inner),
        }
    }

    // Control

    /// The current time-step.
    pub fn time_step(&self) -> i64 {
        self.inner.time_step.load(Ordering::Acquire)
    }

    /// Advance the time-step counter. Recurrent layers call this between
    /// logical steps so truncated backpropagation can cut at the boundary.
    pub fn increment_time_step(&self) {
        self.inner.time_step.fetch_add(1, Ordering::AcqRel);
    }

    /// The current processing mode.
    pub fn mode(&self) -> Mode {
        match self.inner.mode.load(Ordering::Acquire) {
            0 => Mode::Training,
            _ => Mode::Inference,
        }
    }

    /// Switch between training and inference.
    pub fn set_mode(&self, mode: Mode) {
        self.inner.mode.store(mode as u8, Ordering::Release);
    }

    /// Number of nodes created through this graph.
    pub fn len(&self) -> usize {
        self.inner.nodes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until every in-flight computation has completed.
    pub fn wait_for_all(&self) {
        track::wait_for_all();
    }

    // Backward

    /// Run reverse-mode backpropagation from `root`, seeding with a unit
    /// gradient. The root must be scalar; seed non-scalar roots through
    /// [`Graph::backward_opts`].
    ///
    /// Returns when every operator in the sub-graph has been processed.
    pub fn backward(&self, root: &Node<T>) -> Result<()> {
        self.backward_opts(root, BackwardOptions::default())
    }

    /// Run reverse-mode backpropagation from `root` with an explicit seed
    /// gradient and/or a truncated-BPTT bound.
    pub fn backward_opts(&self, root: &Node<T>, opts: BackwardOptions<T>) -> Result<()> {
        backward::run(&self.inner, root, opts)
    }

    // Lifecycle

    /// Release every gradient buffer and reset every pending-grads
    /// counter, across all nodes of the graph.
    pub fn zero_grad(&self) {
        let nodes = self.inner.nodes.read().unwrap();
        for data in nodes.iter() {
            match &**data {
                NodeData::Variable(v) => {
                    if let Some(g) = v.grad.lock().unwrap().take() {
                        g.release();
                    }
                }
                NodeData::Operator(o) => o.zero_grad(),
                NodeData::Constant(_) | NodeData::Wrap(_) => {}
            }
        }
    }

    /// Release every node and reset the time-step counter.
    ///
    /// Not concurrency-safe with in-flight computations: call
    /// [`Graph::wait_for_all`] first.
    pub fn clear(&self) {
        let mut nodes = self.inner.nodes.write().unwrap();
        for data in nodes.iter() {
            if let NodeData::Operator(o) = &**data {
                o.release();
            }
        }
        nodes.clear();
        self.inner.time_step.store(0, Ordering::Release);
    }
}

/// Free the resources of every operator reachable from `roots` through
/// operator operands: forward values, gradients, and the function records
/// (including their operand handles). Each operator is visited once;
/// already-released operators are skipped, so repeated calls are no-ops.
/// Non-operator nodes are untouched.
///
/// Not concurrency-safe with in-flight computations: callers must have
/// awaited all forwards and backwards first. A released operator must not
/// be used again.
pub fn release_operators<T: Element>(roots: &[Node<T>]) {
    let mut visited: HashSet<(u64, usize)> = HashSet::new();
    let mut stack: Vec<Node<T>> = roots.to_vec();
    while let Some(node) = stack.pop() {
        if !visited.insert((node.graph_id, node.id)) {
            continue;
        }
        let Some(op) = node.as_operator() else { continue };
        if op.is_released() {
            continue;
        }
        let operands = op.operands();
        op.release();
        for operand in operands {
            if operand.as_operator().is_some() {
                stack.push(operand);
            }
        }
    }
}

/// A forward task: computes one operator's value and publishes it. The
/// Drop impl keeps the global computation accounting correct and poisons
/// the latch when the function panicked, so readers fail instead of
/// blocking forever.
struct ForwardTask<T: Element> {
    node: Node<T>,
    published: bool,
}

impl<T: Element> ForwardTask<T> {
    fn run(mut self) {
        let op = self
            .node
            .as_operator()
            .expect("forward task on a non-operator node");
        op.run_forward();
        self.published = true;
    }
}

impl<T: Element> Drop for ForwardTask<T> {
    fn drop(&mut self) {
        if !self.published {
            if let Some(op) = self.node.as_operator() {
                op.poison();
            }
        }
        track::finish();
    }
}
