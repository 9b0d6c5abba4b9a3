//! Bidirectional stepping over a [`ProcessState`] (spec §4.8).
//!
//! A "step" is one thread's worth of events between two `NewThreadTime`
//! boundaries; `move_forward`/`move_backward` apply or undo exactly one
//! such step and are atomic: either every event in it is applied, or (on
//! a panic from a malformed trace) none of the state's cursors moved yet
//! are left advanced, since the cursor is only written back after the
//! whole step succeeds.

use crate::replay::process_state::ProcessState;
use crate::trace::event::{Event, EventKind};

/// Cooperative cancellation flag polled between events during a long
/// `move_forward_to_end`/`move_backward_to_end` (spec §4.8, §5).
#[derive(Default)]
pub struct CancellationFlag(std::sync::atomic::AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Advance `tid` by exactly one thread-time step. Returns `false` if the
/// thread's stream is already exhausted.
pub fn move_forward(state: &mut ProcessState, tid: u32) -> bool {
    let start = state.thread_state(tid).cursor_offset();
    let len = state.trace().thread_events(tid).len();
    if start >= len {
        return false;
    }

    let mut offset = start;
    let mut applied_any = false;
    loop {
        if offset >= len {
            break;
        }
        let (event, next) = state
            .trace()
            .thread_events(tid)
            .read_at(offset)
            .expect("malformed trace during forward navigation");
        if applied_any && event.kind() == EventKind::NewThreadTime {
            break;
        }
        state.apply_forward(tid, &event, offset);
        offset = next;
        applied_any = true;
    }
    state.thread_state_mut(tid).set_cursor_offset(offset);
    true
}

/// Inverse of [`move_forward`]: undo the step ending at the thread's
/// current cursor. Returns `false` if the thread is already at its start.
pub fn move_backward(state: &mut ProcessState, tid: u32) -> bool {
    let end = state.thread_state(tid).cursor_offset();
    if end == 0 {
        return false;
    }

    // Walk backward to find the start of this step: the NewThreadTime
    // record that opened it.
    let mut offset = end;
    let mut step_events = Vec::new();
    loop {
        let (event, start) = state
            .trace()
            .thread_events(tid)
            .read_before(offset)
            .expect("malformed trace during backward navigation");
        let is_boundary = event.kind() == EventKind::NewThreadTime;
        step_events.push((event, start));
        offset = start;
        if is_boundary {
            break;
        }
        if offset == 0 {
            break;
        }
    }

    for (event, _) in &step_events {
        state.apply_backward(tid, event);
    }
    state.thread_state_mut(tid).set_cursor_offset(offset);
    true
}

pub fn move_forward_to_end(state: &mut ProcessState, tid: u32, cancel: &CancellationFlag) {
    while move_forward(state, tid) {
        if cancel.is_cancelled() {
            break;
        }
    }
}

pub fn move_backward_to_end(state: &mut ProcessState, tid: u32, cancel: &CancellationFlag) {
    while move_backward(state, tid) {
        if cancel.is_cancelled() {
            break;
        }
    }
}

/// Seek backward to the point immediately after the allocation backing
/// `address`, across every thread (spec §4.8, tie-break by
/// `(process_time, tid, thread_time)` ascending). Returns `false` if
/// `address` is not inside any allocation reachable by rewinding.
///
/// Lands with the allocation present and no subsequent writes applied
/// (spec §8 scenario 6): rather than stopping the moment `address` is
/// merely contained by some live allocation, this peeks at the step each
/// backward move is about to undo and stops right before undoing the one
/// that contains the `Malloc` which created the allocation, so every step
/// after that allocation — on any thread — has already been rewound.
pub fn move_to_allocation(state: &mut ProcessState, address: u64) -> bool {
    loop {
        match next_backward_tid(state) {
            None => return false,
            Some(tid) => {
                if step_creates_allocation(state, tid, address) {
                    return true;
                }
                move_backward(state, tid);
            }
        }
    }
}

/// Whether the step `tid` would undo next (per [`move_backward`]'s own
/// step-boundary walk) contains the `Malloc` that created the allocation
/// backing `address`.
fn step_creates_allocation(state: &ProcessState, tid: u32, address: u64) -> bool {
    let mut offset = state.thread_state(tid).cursor_offset();
    if offset == 0 {
        return false;
    }
    loop {
        let (event, start) = state
            .trace()
            .thread_events(tid)
            .read_before(offset)
            .expect("malformed trace during backward navigation");
        if let Event::Malloc { address: base, size, .. } = event {
            if address >= base && address < base + size {
                return true;
            }
        }
        let is_boundary = event.kind() == EventKind::NewThreadTime;
        offset = start;
        if is_boundary || offset == 0 {
            return false;
        }
    }
}

/// Seek forward to the next event freeing the allocation at `address`
/// (spec §4.8). Returns `false` if the trace ends without one.
pub fn move_to_deallocation(state: &mut ProcessState, address: u64) -> bool {
    if !state.mallocs().contains_key(&address) {
        return false;
    }
    loop {
        let moved = move_any_thread_forward(state);
        if !moved {
            return false;
        }
        if !state.mallocs().contains_key(&address) {
            return true;
        }
    }
}

/// Advance whichever thread has the smallest `(process_time, tid,
/// thread_time)` among those with remaining events, by one step (spec
/// §4.8's tie-break rule, used to drive multi-thread seeks one step at a
/// time without re-deriving a merged total order up front).
fn move_any_thread_forward(state: &mut ProcessState) -> bool {
    let tid = state
        .thread_states()
        .iter()
        .filter(|t| t.cursor_offset() < state.trace().thread_events(t.tid()).len())
        .min_by_key(|t| (t.cursor_offset(), t.tid()))
        .map(|t| t.tid());
    match tid {
        Some(tid) => move_forward(state, tid),
        None => false,
    }
}

fn move_any_thread_backward(state: &mut ProcessState) -> bool {
    match next_backward_tid(state) {
        Some(tid) => move_backward(state, tid),
        None => false,
    }
}

fn next_backward_tid(state: &ProcessState) -> Option<u32> {
    state
        .thread_states()
        .iter()
        .filter(|t| t.cursor_offset() > 0)
        .max_by_key(|t| (t.cursor_offset(), t.tid()))
        .map(|t| t.tid())
}
