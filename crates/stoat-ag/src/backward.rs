use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use stoat_core::{Element, Error, Matrix, Result};

use crate::graph::GraphInner;
use crate::node::Node;
use crate::track;

// Gradient engine — reverse-mode scheduling by pending-grads counters
//
// The engine never sorts the graph. It walks the sub-graph once to count,
// for every operator, how many gradient contributions it will receive from
// consumers inside the sub-graph; it then drives a worklist with a pool of
// worker threads. An operator is enqueued when its counter reaches zero,
// which guarantees its own backward observes the complete accumulated
// gradient and runs exactly once. Correctness follows from the creation
// order invariant: operands always precede their consumers.
//
// Counting happens entirely before driving, so counters stay non-negative
// for pass members. Operators excluded by a truncated-BPTT bound are not
// members: partials flowing into them still accumulate (their counter goes
// negative, which never schedules), but their backward does not run and
// the gradient chain terminates there.

/// Options for [`Graph::backward_opts`](crate::Graph::backward_opts).
pub struct BackwardOptions<T: Element> {
    /// Gradient at the root. Defaults to a unit scalar; required when the
    /// root is not scalar.
    pub seed: Option<Matrix<T>>,
    /// Truncated-BPTT bound: operators more than this many time-steps
    /// older than the root are excluded from the pass.
    pub truncated_steps: Option<i64>,
}

impl<T: Element> Default for BackwardOptions<T> {
    fn default() -> Self {
        BackwardOptions {
            seed: None,
            truncated_steps: None,
        }
    }
}

impl<T: Element> BackwardOptions<T> {
    pub fn seed(mut self, seed: Matrix<T>) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn truncated_steps(mut self, steps: i64) -> Self {
        self.truncated_steps = Some(steps);
        self
    }
}

/// Shared state of one backward pass: the worklist and the count of
/// members whose backward has not yet completed.
pub(crate) struct PassState<T: Element> {
    state: Mutex<DriveState<T>>,
    cond: Condvar,
}

struct DriveState<T: Element> {
    queue: VecDeque<Node<T>>,
    remaining: usize,
    aborted: bool,
}

impl<T: Element> PassState<T> {
    fn new(members: usize) -> Arc<Self> {
        Arc::new(PassState {
            state: Mutex::new(DriveState {
                queue: VecDeque::new(),
                remaining: members,
                aborted: false,
            }),
            cond: Condvar::new(),
        })
    }

    /// Hand an operator whose contributions have all arrived to the worker
    /// pool.
    pub(crate) fn enqueue(&self, node: Node<T>) {
        let mut state = self.state.lock().unwrap();
        state.queue.push_back(node);
        self.cond.notify_one();
    }

    /// Next operator to backpropagate, or None when the pass is complete
    /// (or aborted by a panicking worker).
    fn next(&self) -> Option<Node<T>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.aborted || state.remaining == 0 {
                return None;
            }
            if let Some(node) = state.queue.pop_front() {
                return Some(node);
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    fn complete_one(&self) {
        let mut state = self.state.lock().unwrap();
        state.remaining -= 1;
        if state.remaining == 0 {
            self.cond.notify_all();
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        state.aborted = true;
        self.cond.notify_all();
    }
}

/// Entry point: seed, count, drive, join.
pub(crate) fn run<T: Element>(
    graph: &Arc<GraphInner<T>>,
    root: &Node<T>,
    opts: BackwardOptions<T>,
) -> Result<()> {
    if !root.requires_grad() {
        return Ok(());
    }

    let seed = match opts.seed {
        Some(seed) => seed,
        None => {
            // value() blocks until the root's forward has published.
            if !root.value().is_scalar() {
                return Err(Error::NonScalarRootWithoutSeed);
            }
            Matrix::scalar(T::one())
        }
    };
    root.seed_grad(seed);

    let members = collect_members(root, opts.truncated_steps);
    if members.is_empty() {
        // The root is a leaf: its gradient is the seed, nothing to drive.
        return Ok(());
    }

    let pass = PassState::new(members.len());
    graph.install_pass(Arc::clone(&pass));
    pass.enqueue(root.clone());

    track::begin();
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(members.len());
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let pass = Arc::clone(&pass);
        handles.push(thread::spawn(move || drain(&pass)));
    }
    let mut worker_panic = None;
    for handle in handles {
        if let Err(panic) = handle.join() {
            worker_panic = Some(panic);
        }
    }
    graph.clear_pass();
    track::finish();
    if let Some(panic) = worker_panic {
        std::panic::resume_unwind(panic);
    }
    Ok(())
}

/// Walk the sub-graph once, collecting the operators that participate in
/// the pass and installing each one's expected contribution count.
///
/// An operator participates when it is reachable from the root through
/// requires-grad operator operands and not older than the truncated-BPTT
/// boundary. The count is the number of operand edges pointing at it from
/// other participants.
fn collect_members<T: Element>(root: &Node<T>, truncated_steps: Option<i64>) -> Vec<Node<T>> {
    if root.as_operator().is_none() {
        return Vec::new();
    }
    let boundary = truncated_steps.map(|steps| root.time_step() - steps);

    let mut visited: HashSet<usize> = HashSet::new();
    let mut counts: HashMap<usize, i64> = HashMap::new();
    let mut members: Vec<Node<T>> = Vec::new();
    let mut stack: Vec<Node<T>> = vec![root.clone()];

    while let Some(node) = stack.pop() {
        if !visited.insert(node.id) {
            continue;
        }
        for operand in node.operands() {
            if operand.as_operator().is_none() || !operand.requires_grad() {
                continue;
            }
            if let Some(boundary) = boundary {
                if operand.time_step() < boundary {
                    continue;
                }
            }
            // Count per edge: an operand used twice expects two partials.
            *counts.entry(operand.id).or_insert(0) += 1;
            stack.push(operand);
        }
        members.push(node);
    }

    for member in &members {
        let count = counts.get(&member.id).copied().unwrap_or(0);
        member
            .as_operator()
            .expect("pass member is always an operator")
            .set_pending(count);
    }
    members
}

/// Worker loop: pop ready operators and run their backward until the pass
/// is complete.
fn drain<T: Element>(pass: &PassState<T>) {
    let _guard = WorkerGuard { pass };
    while let Some(node) = pass.next() {
        node.as_operator()
            .expect("worklist holds only operators")
            .run_backward();
        pass.complete_one();
    }
}

/// Aborts the pass when a worker dies mid-drain, so its siblings exit
/// instead of waiting for a completion that will never come.
struct WorkerGuard<'a, T: Element> {
    pass: &'a PassState<T>,
}

impl<T: Element> Drop for WorkerGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.pass.abort();
        }
    }
}
