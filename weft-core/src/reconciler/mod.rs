//! Reconciler Core
//!
//! The runtime state machine behind [`Runtime`]: a fiber arena, the mounted
//! roots, and the capability objects (host adapter, task scheduler) that
//! everything else is driven through.
//!
//! # How It Works
//!
//! The whole reconciler lives in one `Rc<RefCell<Reconciler>>` cell.
//! [`Runtime`] is the owning public handle; [`Root`] and
//! [`hooks::Dispatch`] hold weak references so user-held handles never keep
//! a dropped runtime alive. Entry points borrow the cell mutably for the
//! duration of a render/commit/flush; re-entrant state dispatches made
//! while the cell is borrowed park themselves in a deferred inbox instead
//! of blocking, and the work loop drains that inbox at its safe points.
//!
//! Render work is split across the submodules the way the phases split:
//! [`begin`]/[`complete`] build work-in-progress trees out of fibers
//! ([`fiber`]) using the child differ ([`child`]) and hook runtime
//! ([`hooks`]), the work loop ([`work_loop`]) schedules and slices that
//! work by lane ([`lanes`]), and [`commit`] applies finished trees to the
//! host.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::element::Children;
use crate::host::{HostAdapter, HostHandle};
use crate::scheduler::{CallbackId, RootWork, TaskScheduler, WorkStatus};

mod begin;
mod child;
mod commit;
mod complete;
pub(crate) mod fiber;
pub(crate) mod flags;
pub(crate) mod hooks;
pub(crate) mod lanes;
pub(crate) mod update_queue;
mod work_loop;

pub use fiber::{FiberId, RootId};

use fiber::{Fiber, FiberRoot, StateNode, UpdateQueueSlot, WorkTag};
use hooks::{DeferredDispatch, DeferredInbox};
use lanes::Lanes;
use update_queue::{Action, SharedQueue, StateValue, Update};

/// The reconciler state machine. One per [`Runtime`], always accessed
/// through the runtime's cell.
pub(crate) struct Reconciler {
    pub(crate) fibers: SlotMap<FiberId, Fiber>,
    pub(crate) roots: SlotMap<RootId, FiberRoot>,
    pub(crate) host: Box<dyn HostAdapter>,
    pub(crate) scheduler: Box<dyn TaskScheduler>,

    /// The fiber the render phase works on next, when a pass is suspended.
    pub(crate) work_in_progress: Option<FiberId>,
    /// The root the saved work-in-progress belongs to.
    pub(crate) wip_root: Option<RootId>,
    /// The lane the saved work-in-progress renders at.
    pub(crate) wip_render_lane: Lanes,
    /// Fibers allocated by the in-flight render pass. Cleared when the pass
    /// completes; freed back to the arena when it is discarded or aborted,
    /// so dropped passes cannot grow the arena.
    pub(crate) pass_allocated: Vec<FiberId>,

    /// Roots with sync-lane work awaiting the next microtask flush.
    pub(crate) sync_queue: Vec<RootId>,
    /// Re-entrancy guard for the sync flush.
    pub(crate) flushing_sync: bool,

    /// Weak self-reference handed to dispatchers.
    pub(crate) self_weak: Weak<RefCell<Reconciler>>,
    /// Dispatches parked while the cell was borrowed.
    pub(crate) deferred: DeferredInbox,
}

impl Reconciler {
    /// Mount a new root over a host container. The host-root fiber and its
    /// root record point at each other; the element queue starts empty.
    pub(crate) fn create_container(&mut self, container: HostHandle) -> RootId {
        let mut fiber = Fiber::new(WorkTag::HostRoot, fiber::FiberProps::None, None);
        let initial: StateValue = Rc::new(Children::None);
        fiber.update_queue = UpdateQueueSlot::Root {
            shared: SharedQueue::new(),
            base: Vec::new(),
            base_state: initial,
        };
        let fiber_id = self.fibers.insert(fiber);

        let root_id = self.roots.insert(FiberRoot {
            container,
            current: fiber_id,
            finished_work: None,
            finished_lane: Lanes::NONE,
            pending_lanes: Lanes::NONE,
            callback_node: None,
            callback_priority: Lanes::NONE,
            pending_passive_effects: Default::default(),
            passive_flush_scheduled: false,
        });
        self.fibers[fiber_id].state_node = Some(StateNode::Root(root_id));
        root_id
    }

    /// Enqueue a new element tree on the root at the ambient lane and
    /// schedule it. `Children::None` unmounts everything below the root.
    pub(crate) fn update_container(&mut self, root: RootId, children: Children) {
        let Some(record) = self.roots.get(root) else {
            return;
        };
        let fiber = record.current;
        let lane = self.request_update_lane();
        if let UpdateQueueSlot::Root { shared, .. } = &self.fibers[fiber].update_queue {
            shared.enqueue(Update::new(Action::Replace(Rc::new(children)), lane));
        }
        self.schedule_update_on_fiber(fiber, lane);
    }

    fn root_queue(&self, root: RootId) -> Option<(FiberId, SharedQueue)> {
        let fiber = self.roots.get(root)?.current;
        match &self.fibers[fiber].update_queue {
            UpdateQueueSlot::Root { shared, .. } => Some((fiber, shared.clone())),
            _ => None,
        }
    }
}

/// The public runtime handle: owns the reconciler cell.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RefCell<Reconciler>>,
}

impl Runtime {
    /// Build a runtime over a host adapter and a task scheduler. Pass
    /// `Rc<RefCell<..>>` clones to keep embedder-side handles to either.
    pub fn new(host: impl HostAdapter + 'static, scheduler: impl TaskScheduler + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak| {
            RefCell::new(Reconciler {
                fibers: SlotMap::with_key(),
                roots: SlotMap::with_key(),
                host: Box::new(host),
                scheduler: Box::new(scheduler),
                work_in_progress: None,
                wip_root: None,
                wip_render_lane: Lanes::NONE,
                pass_allocated: Vec::new(),
                sync_queue: Vec::new(),
                flushing_sync: false,
                self_weak: Weak::clone(weak),
                deferred: Rc::new(RefCell::new(Vec::new())),
            })
        });
        Self { inner }
    }

    /// Mount a root over `container` and return its render handle.
    pub fn create_root(&self, container: HostHandle) -> Root {
        let mut inner = self.inner.borrow_mut();
        let id = inner.create_container(container);
        let (fiber, queue) = match inner.root_queue(id) {
            Some(pair) => pair,
            // Unreachable for a root created two lines up; keep the handle
            // well-formed anyway.
            None => (inner.roots[id].current, SharedQueue::new()),
        };
        let deferred = Rc::clone(&inner.deferred);
        drop(inner);
        Root {
            runtime: Rc::downgrade(&self.inner),
            id,
            fiber,
            queue,
            deferred,
        }
    }

    /// Flush all queued sync-lane renders. The embedder calls this at its
    /// microtask-equivalent boundary after the host adapter's
    /// `schedule_microtask` was invoked.
    pub fn flush_sync_work(&self) {
        self.inner.borrow_mut().flush_sync_callbacks();
    }

    /// Execute one callback previously registered with the task scheduler.
    /// `did_timeout` disables time-slicing for this invocation. A
    /// [`WorkStatus::Yielded`] result means the same callback should be
    /// invoked again to resume.
    pub fn perform_scheduled_work(
        &self,
        callback: CallbackId,
        work: RootWork,
        did_timeout: bool,
    ) -> WorkStatus {
        self.inner
            .borrow_mut()
            .perform_scheduled_work(callback, work, did_timeout)
    }
}

/// Render handle for one mounted root.
pub struct Root {
    runtime: Weak<RefCell<Reconciler>>,
    id: RootId,
    fiber: FiberId,
    queue: SharedQueue,
    deferred: DeferredInbox,
}

impl Root {
    /// Replace the root's element tree. `Children::None` unmounts
    /// everything. Safe to call from inside effects and renders: the
    /// request is parked and applied at the next safe point.
    pub fn render(&self, children: impl Into<Children>) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let children = children.into();
        // Statement, not tail expression: the borrow temporary must drop
        // before `runtime` does.
        match runtime.try_borrow_mut() {
            Ok(mut inner) => inner.update_container(self.id, children),
            Err(_) => {
                self.deferred.borrow_mut().push(DeferredDispatch {
                    fiber: self.fiber,
                    queue: self.queue.clone(),
                    action: Action::Replace(Rc::new(children)),
                });
            }
        };
    }
}
