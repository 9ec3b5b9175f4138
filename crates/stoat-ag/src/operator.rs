use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Condvar, Mutex, RwLock};

use stoat_core::{Element, Matrix};

use crate::fns::Function;
use crate::node::Node;

// Operator — The computing node variant
//
// An operator wraps a catalog function. Its forward value is computed on a
// background task started at construction and published exactly once into
// a one-shot latch; readers block until publication and are wait-free
// afterwards. During backward, partial gradients accumulate under the
// accumulator mutex until the pending-grads counter reaches zero, at which
// point the operator's own backward runs exactly once.
//
// State machine:
//
//   Constructed → Computing → Ready → (AwaitingGrads → Backpropagating) → Released
//
// The latch encodes Constructed/Computing as Empty, Ready as Ready, and
// Released as Released. Poisoned marks a forward task that died before
// publishing, so readers fail loudly instead of blocking forever.

pub(crate) enum Slot<T: Element> {
    Empty,
    Ready(Matrix<T>),
    Poisoned,
    Released,
}

/// One-shot publication latch for the forward value.
pub(crate) struct ValueCell<T: Element> {
    published: AtomicBool,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T: Element> ValueCell<T> {
    fn new() -> Self {
        ValueCell {
            published: AtomicBool::new(false),
            slot: Mutex::new(Slot::Empty),
            ready: Condvar::new(),
        }
    }

    /// Store the forward result and wake all readers. Must be called at
    /// most once.
    fn publish(&self, value: Matrix<T>) {
        let mut slot = self.slot.lock().unwrap();
        debug_assert!(matches!(*slot, Slot::Empty), "value published twice");
        *slot = Slot::Ready(value);
        self.published.store(true, Ordering::Release);
        self.ready.notify_all();
    }

    /// Mark the forward task as dead without a value.
    fn poison(&self) {
        let mut slot = self.slot.lock().unwrap();
        if matches!(*slot, Slot::Empty) {
            *slot = Slot::Poisoned;
            self.published.store(true, Ordering::Release);
            self.ready.notify_all();
        }
    }

    /// Read the value, blocking until it is published. Reads after
    /// publication do not wait.
    fn get(&self) -> Matrix<T> {
        let mut slot = self.slot.lock().unwrap();
        if !self.published.load(Ordering::Acquire) {
            while matches!(*slot, Slot::Empty) {
                slot = self.ready.wait(slot).unwrap();
            }
        }
        match &*slot {
            Slot::Ready(m) => m.clone(),
            Slot::Released => panic!("operator: value read after release"),
            Slot::Poisoned => panic!("operator: forward computation failed"),
            Slot::Empty => unreachable!(),
        }
    }

    fn release(&self) {
        let mut slot = self.slot.lock().unwrap();
        if let Slot::Ready(m) = std::mem::replace(&mut *slot, Slot::Released) {
            m.release();
        }
        self.published.store(true, Ordering::Release);
        self.ready.notify_all();
    }

    fn is_released(&self) -> bool {
        matches!(*self.slot.lock().unwrap(), Slot::Released)
    }
}

/// Data of an operator node.
pub(crate) struct Operator<T: Element> {
    pub(crate) time_step: i64,
    pub(crate) requires_grad: bool,
    /// The catalog function; dropped on release, which also drops the
    /// operand handles.
    pub(crate) fun: RwLock<Option<Function<T>>>,
    value: ValueCell<T>,
    grad: Mutex<Option<Matrix<T>>>,
    /// Outstanding gradient contributions in the current backward pass.
    /// Signed: contributions flowing into operators excluded from the pass
    /// (truncated BPTT) push it below zero, which never triggers a
    /// backward.
    pending_grads: AtomicI64,
}

impl<T: Element> Operator<T> {
    pub(crate) fn new(time_step: i64, requires_grad: bool, fun: Function<T>) -> Self {
        Operator {
            time_step,
            requires_grad,
            fun: RwLock::new(Some(fun)),
            value: ValueCell::new(),
            grad: Mutex::new(None),
            pending_grads: AtomicI64::new(0),
        }
    }

    /// Run the wrapped function and publish its result. Called once, from
    /// the forward task.
    pub(crate) fn run_forward(&self) {
        let y = {
            let fun = self.fun.read().unwrap();
            let fun = fun.as_ref().expect("operator: forward after release");
            fun.forward()
        };
        self.value.publish(y);
    }

    /// Mark a forward task that terminated without publishing.
    pub(crate) fn poison(&self) {
        self.value.poison();
    }

    pub(crate) fn value(&self) -> Matrix<T> {
        self.value.get()
    }

    pub(crate) fn grad(&self) -> Option<Matrix<T>> {
        assert!(
            !self.is_released(),
            "operator: grad read after release"
        );
        self.grad.lock().unwrap().clone()
    }

    pub(crate) fn name(&self) -> &'static str {
        match self.fun.read().unwrap().as_ref() {
            Some(f) => f.name(),
            None => "released",
        }
    }

    pub(crate) fn operands(&self) -> Vec<Node<T>> {
        self.fun
            .read()
            .unwrap()
            .as_ref()
            .expect("operator: operands read after release")
            .operands()
    }

    /// Add a partial gradient under the accumulator mutex.
    pub(crate) fn accumulate_grad(&self, partial: Matrix<T>) {
        let mut grad = self.grad.lock().unwrap();
        match grad.as_mut() {
            None => *grad = Some(partial),
            Some(g) => {
                g.add_assign(&partial);
                partial.release();
            }
        }
    }

    /// Decrement the pending-grads counter. Returns true when this call
    /// observed the transition to zero, i.e. all expected contributions
    /// have arrived and the operator's backward may now be scheduled.
    pub(crate) fn note_contribution(&self) -> bool {
        self.pending_grads.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Install the expected contribution count for a backward pass.
    pub(crate) fn set_pending(&self, count: i64) {
        self.pending_grads.store(count, Ordering::Release);
    }

    pub(crate) fn pending(&self) -> i64 {
        self.pending_grads.load(Ordering::Acquire)
    }

    /// Run the function's backward with the fully accumulated gradient.
    /// Blocks on the operator's own value first: backward must not outrun
    /// a forward that is still in flight.
    pub(crate) fn run_backward(&self) {
        if !self.requires_grad {
            return;
        }
        let _ = self.value();
        let Some(gy) = self.grad() else { return };
        let fun = self.fun.read().unwrap();
        if let Some(f) = fun.as_ref() {
            f.backward(&gy);
        }
    }

    pub(crate) fn zero_grad(&self) {
        if let Some(g) = self.grad.lock().unwrap().take() {
            g.release();
        }
        self.pending_grads.store(0, Ordering::Release);
    }

    /// Free the value, the gradient, and the function (including its
    /// operand handles). Safe to call more than once.
    pub(crate) fn release(&self) {
        self.value.release();
        self.zero_grad();
        *self.fun.write().unwrap() = None;
    }

    pub(crate) fn is_released(&self) -> bool {
        self.value.is_released()
    }
}
