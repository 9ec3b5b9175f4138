use std::sync::{Condvar, Mutex, OnceLock};

// Process-wide accounting of in-flight computations.
//
// Every forward task and every scheduled backward increments the counter
// when it starts and decrements it when it finishes. wait_for_all() blocks
// until the counter drains. The counter is shared by all graphs: a barrier
// in one graph also waits for operators it consumes from another graph
// through wraps.

struct TrackState {
    count: Mutex<u64>,
    drained: Condvar,
}

fn state() -> &'static TrackState {
    static STATE: OnceLock<TrackState> = OnceLock::new();
    STATE.get_or_init(|| TrackState {
        count: Mutex::new(0),
        drained: Condvar::new(),
    })
}

/// Register the start of a computation task.
pub(crate) fn begin() {
    let s = state();
    *s.count.lock().unwrap() += 1;
}

/// Register the completion of a computation task.
pub(crate) fn finish() {
    let s = state();
    let mut count = s.count.lock().unwrap();
    *count -= 1;
    if *count == 0 {
        s.drained.notify_all();
    }
}

/// Block until every in-flight computation (in any graph) has completed.
pub fn wait_for_all() {
    let s = state();
    let mut count = s.count.lock().unwrap();
    while *count > 0 {
        count = s.drained.wait(count).unwrap();
    }
}
