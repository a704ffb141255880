//! Update Queue
//!
//! Pending state transitions for one fiber (or one state hook). Updates are
//! appended in O(1) and consumed with priority-aware replay:
//!
//! 1. Updates whose lane is covered by the render lane are applied in
//!    insertion order.
//! 2. Updates whose lane is *not* covered are skipped whole: cloned into a
//!    base queue to be retried at their own lane later. The state at the
//!    moment of the first skip becomes the new base state.
//! 3. Once anything has been skipped, every *later* applied update is also
//!    cloned into the base queue tagged with the empty lane set (covered by
//!    every render), so a future replay reproduces the original relative
//!    order exactly.
//!
//! This is what lets a low-priority update be deferred without losing
//! higher-priority updates enqueued after it.
//!
//! The pending list lives behind an `Rc<RefCell<..>>` shared by the current
//! and work-in-progress buffers, so a dispatch reaches both and a discarded
//! render pass cannot strand updates.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::lanes::{Lane, Lanes};

/// Erased state value stored by the queue machinery. State hooks and the
/// host root share this machinery; each downcasts at its own boundary.
pub(crate) type StateValue = Rc<dyn Any>;

/// A state transition: either a replacement value or a pure function of the
/// previous state.
#[derive(Clone)]
pub(crate) enum Action {
    /// Replace the state outright.
    Replace(StateValue),
    /// Compute the next state from the previous one.
    Compute(Rc<dyn Fn(&StateValue) -> StateValue>),
}

impl Action {
    fn apply(&self, prev: &StateValue) -> StateValue {
        match self {
            Action::Replace(value) => Rc::clone(value),
            Action::Compute(f) => f(prev),
        }
    }
}

/// One pending state transition.
#[derive(Clone)]
pub(crate) struct Update {
    /// The transition to apply.
    pub action: Action,
    /// The priority lane the update was created at.
    pub lane: Lane,
}

impl Update {
    pub fn new(action: Action, lane: Lane) -> Self {
        Self { action, lane }
    }
}

/// The pending list shared between the two fiber buffers.
#[derive(Default)]
pub(crate) struct PendingQueue {
    pending: Vec<Update>,
}

/// Shared handle to a pending queue.
#[derive(Clone, Default)]
pub(crate) struct SharedQueue {
    inner: Rc<RefCell<PendingQueue>>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update. O(1); insertion order is replay order.
    pub fn enqueue(&self, update: Update) {
        self.inner.borrow_mut().pending.push(update);
    }

    /// Take every pending update, leaving the queue empty.
    pub fn take_pending(&self) -> Vec<Update> {
        std::mem::take(&mut self.inner.borrow_mut().pending)
    }

    /// Whether two handles share one queue.
    #[cfg(test)]
    pub fn same_queue(&self, other: &SharedQueue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Result of consuming a queue at a render lane.
pub(crate) struct ProcessedQueue {
    /// The state after applying every covered update.
    pub memoized_state: StateValue,
    /// The state to replay the base queue on top of.
    pub base_state: StateValue,
    /// Skipped updates (and order-preserving clones of later applied ones).
    pub base_queue: Vec<Update>,
}

/// Replay `updates` (base queue already merged ahead of fresh pending
/// updates by the caller) on top of `base_state`, applying only updates
/// whose lane is covered by `render_lane`.
pub(crate) fn process_update_queue(
    base_state: StateValue,
    updates: &[Update],
    render_lane: Lanes,
) -> ProcessedQueue {
    let mut new_state = Rc::clone(&base_state);
    let mut new_base_state = base_state;
    let mut new_base_queue: Vec<Update> = Vec::new();

    for update in updates {
        if !render_lane.contains(update.lane) {
            // Skipped: freeze the base state at the first skip and keep the
            // update verbatim for a later render at its own lane.
            if new_base_queue.is_empty() {
                new_base_state = Rc::clone(&new_state);
            }
            new_base_queue.push(update.clone());
        } else {
            if !new_base_queue.is_empty() {
                // An earlier update was skipped; keep this one in the base
                // queue too so relative order survives the replay. The
                // empty lane set is covered by every render.
                new_base_queue.push(Update::new(update.action.clone(), Lanes::NONE));
            }
            new_state = update.action.apply(&new_state);
        }
    }

    if new_base_queue.is_empty() {
        new_base_state = Rc::clone(&new_state);
    }

    ProcessedQueue {
        memoized_state: new_state,
        base_state: new_base_state,
        base_queue: new_base_queue,
    }
}
