//! Cooperative Scheduler Capability
//!
//! The runtime never owns an event loop. Deciding *when* a chunk of render
//! work runs is delegated to an external cooperative scheduler through this
//! capability: the runtime registers work requests at a priority, the
//! embedder executes them by calling
//! [`crate::Runtime::perform_scheduled_work`], and the runtime polls
//! `should_yield` between units of work to decide whether to suspend.
//!
//! Scheduled callbacks are plain data ([`RootWork`]) rather than closures,
//! so a scheduler implementation has no type-level coupling to the runtime.

use std::cell::RefCell;
use std::rc::Rc;

use crate::reconciler::RootId;

/// Priority levels the external scheduler understands, highest first.
///
/// The lane model maps lanes to and from these levels; both mappings are
/// total and order-preserving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    /// Runs before anything else; the sync lane maps here.
    Immediate,
    /// Input-driven continuous work (drag, scroll).
    UserBlocking,
    /// Default priority for ordinary updates.
    Normal,
    /// Runs only when nothing else is pending.
    Idle,
}

/// Token identifying a scheduled callback, for cancellation and for
/// detecting that a callback was superseded while yielded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// What a scheduled callback should do when the embedder runs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkKind {
    /// Render (and, on completion, commit) the root's highest pending lane.
    Render,
    /// Flush the root's queued passive effects.
    FlushPassive,
}

/// A unit of root-level work registered with the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootWork {
    /// The root the work belongs to.
    pub root: RootId,
    /// What to do.
    pub kind: WorkKind,
}

impl RootWork {
    /// Render work for `root`.
    pub fn render(root: RootId) -> Self {
        Self {
            root,
            kind: WorkKind::Render,
        }
    }

    /// Passive-effect flush work for `root`.
    pub fn flush_passive(root: RootId) -> Self {
        Self {
            root,
            kind: WorkKind::FlushPassive,
        }
    }
}

/// Result of executing a scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkStatus {
    /// The render pass suspended at a yield point; invoke the same callback
    /// again later to resume.
    Yielded,
    /// The callback is finished (work completed, superseded, or stale);
    /// discard it.
    Done,
}

/// External cooperative scheduler capability consumed by the runtime.
pub trait TaskScheduler {
    /// Register a callback at a priority; returns a cancellation token.
    fn schedule_callback(&mut self, priority: SchedulerPriority, work: RootWork) -> CallbackId;

    /// Cancel a callback that has not started running.
    fn cancel_callback(&mut self, id: CallbackId);

    /// Whether the current time slice is exhausted and render work should
    /// suspend. Polled between units of work, never mid-fiber.
    fn should_yield(&self) -> bool;

    /// The ambient priority of the task currently executing. Updates
    /// created now derive their lane from this.
    fn current_priority(&self) -> SchedulerPriority;
}

/// Shared-handle adapter so an embedder can keep a handle to its scheduler
/// while the runtime owns another.
impl<S: TaskScheduler> TaskScheduler for Rc<RefCell<S>> {
    fn schedule_callback(&mut self, priority: SchedulerPriority, work: RootWork) -> CallbackId {
        self.borrow_mut().schedule_callback(priority, work)
    }

    fn cancel_callback(&mut self, id: CallbackId) {
        self.borrow_mut().cancel_callback(id);
    }

    fn should_yield(&self) -> bool {
        self.borrow().should_yield()
    }

    fn current_priority(&self) -> SchedulerPriority {
        self.borrow().current_priority()
    }
}

pub mod manual;
