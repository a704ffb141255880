//! Work Loop & Root Scheduling
//!
//! Drives the render phase. Each root keeps a `pending_lanes` bitset; the
//! highest-priority lane decides how its next render runs:
//!
//! - **Sync lane**: the root joins a sync queue and the host is asked for a
//!   microtask, so the embedder calls [`crate::Runtime::flush_sync_work`]
//!   before yielding to the environment. Sync renders never time-slice.
//! - **Anything else**: a `RootWork` callback is registered with the
//!   external scheduler at the mapped priority. Concurrent renders check
//!   `should_yield()` between fibers and report [`WorkStatus::Yielded`] so
//!   the embedder re-invokes the same callback to resume.
//!
//! A resumed render continues from the saved work-in-progress only when
//! both the root and the lane still match; otherwise the partial tree is
//! discarded and the pass restarts. Nothing is lost by discarding: pending
//! updates live in queues shared with the current buffer.
//!
//! A `RenderError` surfacing from begin/complete aborts the pass and
//! retires its lane without committing. The violation is deterministic, so
//! an automatic retry would just loop; the committed tree stays intact.

use tracing::{debug, warn};

use super::fiber::{FiberId, FiberProps, RootId, StateNode, WorkTag};
use super::hooks::DeferredDispatch;
use super::lanes::{lanes_to_scheduler_priority, scheduler_priority_to_lane, Lane, Lanes};
use super::update_queue::Update;
use super::Reconciler;
use crate::scheduler::{CallbackId, RootWork, SchedulerPriority, WorkKind, WorkStatus};

/// How a render pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderStatus {
    /// Whole tree rendered; ready to commit.
    Completed,
    /// Time slice exhausted with work remaining.
    Yielded,
    /// Render error; lane retired, nothing to commit.
    Aborted,
}

impl Reconciler {
    /// The lane an update created right now should carry, from the ambient
    /// scheduler priority.
    pub(crate) fn request_update_lane(&mut self) -> Lane {
        scheduler_priority_to_lane(self.scheduler.current_priority())
    }

    /// Record `lane` as pending on the fiber's root and make sure the root
    /// is scheduled to handle it.
    pub(crate) fn schedule_update_on_fiber(&mut self, fiber: FiberId, lane: Lane) {
        let Some(root) = self.root_of_fiber(fiber) else {
            // Dispatch against an unmounted fiber; nothing to do.
            return;
        };
        let pending = self.roots[root].pending_lanes.merge(lane);
        self.roots[root].pending_lanes = pending;
        self.ensure_root_is_scheduled(root);
    }

    fn root_of_fiber(&self, fiber: FiberId) -> Option<RootId> {
        let mut node = fiber;
        loop {
            let f = self.fibers.get(node)?;
            if f.tag == WorkTag::HostRoot {
                return match f.state_node {
                    Some(StateNode::Root(root)) => Some(root),
                    _ => None,
                };
            }
            node = f.parent?;
        }
    }

    /// Reconcile the root's registered callback with its highest pending
    /// lane: cancel when idle, reuse on unchanged priority, re-register on
    /// change. The sync lane bypasses the external scheduler entirely.
    pub(crate) fn ensure_root_is_scheduled(&mut self, root: RootId) {
        let update_lane = self.roots[root].pending_lanes.highest_priority();
        let existing = self.roots[root].callback_node;

        if update_lane.is_none() {
            if let Some(id) = existing {
                self.scheduler.cancel_callback(id);
            }
            let record = &mut self.roots[root];
            record.callback_node = None;
            record.callback_priority = Lanes::NONE;
            return;
        }

        if update_lane == self.roots[root].callback_priority {
            // Same priority already scheduled (or already in the sync
            // queue); the existing callback will pick the work up.
            return;
        }

        if let Some(id) = existing {
            self.scheduler.cancel_callback(id);
        }

        if update_lane == Lanes::SYNC {
            debug!(?root, "scheduling sync render on microtask");
            self.sync_queue.push(root);
            self.host.schedule_microtask();
            self.roots[root].callback_node = None;
        } else {
            let priority = lanes_to_scheduler_priority(update_lane);
            debug!(?root, ?priority, "scheduling concurrent render");
            let id = self
                .scheduler
                .schedule_callback(priority, RootWork::render(root));
            self.roots[root].callback_node = Some(id);
        }
        self.roots[root].callback_priority = update_lane;
    }

    /// Drain the sync queue to exhaustion, including roots queued by work
    /// running inside the flush. Re-entrant calls are no-ops.
    pub(crate) fn flush_sync_callbacks(&mut self) {
        if self.flushing_sync {
            return;
        }
        self.flushing_sync = true;
        while !self.sync_queue.is_empty() {
            let batch = std::mem::take(&mut self.sync_queue);
            for root in batch {
                self.perform_sync_work_on_root(root);
            }
        }
        self.flushing_sync = false;
    }

    /// Scheduler-to-runtime entry for one registered callback.
    pub(crate) fn perform_scheduled_work(
        &mut self,
        callback: CallbackId,
        work: RootWork,
        did_timeout: bool,
    ) -> WorkStatus {
        match work.kind {
            WorkKind::Render => {
                self.perform_concurrent_work_on_root(work.root, callback, did_timeout)
            }
            WorkKind::FlushPassive => {
                self.flush_passive_effects(work.root);
                WorkStatus::Done
            }
        }
    }

    fn perform_concurrent_work_on_root(
        &mut self,
        root: RootId,
        callback: CallbackId,
        did_timeout: bool,
    ) -> WorkStatus {
        // Pending passive effects run before new render work; they may
        // dispatch updates that reprioritize this root, in which case this
        // callback is stale and the newly registered one takes over.
        let flushed = self.flush_passive_effects(root);
        if flushed && self.roots[root].callback_node != Some(callback) {
            return WorkStatus::Done;
        }

        let lane = self.roots[root].pending_lanes.highest_priority();
        if lane.is_none() {
            return WorkStatus::Done;
        }

        // A timed-out callback stops time-slicing: starvation escape.
        let time_slice = lane != Lanes::SYNC && !did_timeout;
        let status = self.render_root(root, lane, time_slice);
        self.ensure_root_is_scheduled(root);

        let status = match status {
            RenderStatus::Yielded => {
                if self.roots[root].callback_node != Some(callback) {
                    // Higher-priority work arrived; this resume is stale.
                    WorkStatus::Done
                } else {
                    WorkStatus::Yielded
                }
            }
            RenderStatus::Completed => {
                self.finish_and_commit(root, lane);
                self.ensure_root_is_scheduled(root);
                WorkStatus::Done
            }
            RenderStatus::Aborted => WorkStatus::Done,
        };
        self.drain_deferred_dispatches();
        status
    }

    fn perform_sync_work_on_root(&mut self, root: RootId) {
        let lane = self.roots[root].pending_lanes.highest_priority();
        if lane != Lanes::SYNC {
            // The sync work was already flushed (or superseded); fall back
            // to normal scheduling for whatever remains.
            self.ensure_root_is_scheduled(root);
            return;
        }

        match self.render_root(root, Lanes::SYNC, false) {
            RenderStatus::Completed => {
                self.finish_and_commit(root, Lanes::SYNC);
                self.ensure_root_is_scheduled(root);
            }
            RenderStatus::Aborted => {
                self.ensure_root_is_scheduled(root);
            }
            // A sync pass never yields.
            RenderStatus::Yielded => {
                warn!(?root, "sync render pass yielded unexpectedly");
            }
        }
        self.drain_deferred_dispatches();
    }

    /// Record the finished tree on the root and commit it.
    fn finish_and_commit(&mut self, root: RootId, lane: Lanes) {
        let finished = self.fibers[self.roots[root].current].alternate;
        {
            let record = &mut self.roots[root];
            record.finished_work = finished;
            record.finished_lane = lane;
        }
        self.wip_render_lane = Lanes::NONE;
        self.commit_root(root);
    }

    /// Run the render phase for `root` at `lane`, resuming saved progress
    /// when it matches and restarting from scratch when it does not.
    fn render_root(&mut self, root: RootId, lane: Lanes, time_slice: bool) -> RenderStatus {
        if self.wip_root != Some(root) || self.wip_render_lane != lane {
            self.prepare_fresh_stack(root, lane);
        }

        let outcome = if time_slice {
            self.work_loop_concurrent()
        } else {
            self.work_loop_sync()
        };

        match outcome {
            Ok(()) => {
                if time_slice && self.work_in_progress.is_some() {
                    return RenderStatus::Yielded;
                }
                // The pass is committing; its allocations become the tree.
                self.pass_allocated.clear();
                self.wip_root = None;
                RenderStatus::Completed
            }
            Err(err) => {
                warn!(?root, error = %err, "render pass aborted");
                self.work_in_progress = None;
                self.wip_root = None;
                self.wip_render_lane = Lanes::NONE;
                self.release_pass_allocations();
                let record = &mut self.roots[root];
                record.pending_lanes = record.pending_lanes.remove(lane);
                RenderStatus::Aborted
            }
        }
    }

    fn prepare_fresh_stack(&mut self, root: RootId, lane: Lanes) {
        // Any partial tree from a discarded pass is dead; free its fibers
        // before allocating the new work-in-progress.
        self.release_pass_allocations();
        let current = self.roots[root].current;
        let wip = self.create_work_in_progress(current, FiberProps::None);
        self.work_in_progress = Some(wip);
        self.wip_root = Some(root);
        self.wip_render_lane = lane;
        let record = &mut self.roots[root];
        record.finished_work = None;
        record.finished_lane = Lanes::NONE;
    }

    fn work_loop_sync(&mut self) -> Result<(), crate::error::RenderError> {
        while let Some(wip) = self.work_in_progress {
            self.perform_unit_of_work(wip)?;
        }
        Ok(())
    }

    fn work_loop_concurrent(&mut self) -> Result<(), crate::error::RenderError> {
        while let Some(wip) = self.work_in_progress {
            if self.scheduler.should_yield() {
                return Ok(());
            }
            self.perform_unit_of_work(wip)?;
        }
        Ok(())
    }

    fn perform_unit_of_work(&mut self, wip: FiberId) -> Result<(), crate::error::RenderError> {
        let next = self.begin_work(wip, self.wip_render_lane)?;
        {
            let fiber = &mut self.fibers[wip];
            fiber.memoized_props = Some(fiber.pending_props.clone());
        }
        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(wip)?,
        }
        Ok(())
    }

    fn complete_unit_of_work(&mut self, from: FiberId) -> Result<(), crate::error::RenderError> {
        let mut node = from;
        loop {
            self.complete_work(node)?;
            if let Some(sibling) = self.fibers[node].sibling {
                self.work_in_progress = Some(sibling);
                return Ok(());
            }
            match self.fibers[node].parent {
                Some(parent) => node = parent,
                None => {
                    self.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }

    /// Drain dispatches parked while the runtime was busy. Each gets its
    /// lane from the ambient priority at drain time. Scheduling a drained
    /// update may itself park more work, so loop until the inbox is empty.
    pub(crate) fn drain_deferred_dispatches(&mut self) {
        loop {
            let batch: Vec<DeferredDispatch> = std::mem::take(&mut *self.deferred.borrow_mut());
            if batch.is_empty() {
                return;
            }
            for parked in batch {
                let lane = self.request_update_lane();
                parked.queue.enqueue(Update::new(parked.action, lane));
                self.schedule_update_on_fiber(parked.fiber, lane);
            }
        }
    }
}

impl SchedulerPriority {
    /// The lane work scheduled at this priority renders at. Convenience for
    /// embedders mirroring the mapping the runtime uses internally.
    pub fn lane(self) -> Lane {
        scheduler_priority_to_lane(self)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::element::{host, text, Child, Children, Component};
    use crate::host::memory::MemoryHost;
    use crate::scheduler::manual::ManualScheduler;
    use crate::scheduler::{CallbackId, RootWork, SchedulerPriority, TaskScheduler, WorkStatus};
    use crate::Runtime;

    fn drive(runtime: &Runtime, scheduler: &Rc<RefCell<ManualScheduler>>) {
        loop {
            let task = { scheduler.borrow_mut().take_next_task() };
            let Some((id, work)) = task else { break };
            while runtime.perform_scheduled_work(id, work, false) == WorkStatus::Yielded {}
        }
    }

    fn fiber_count(runtime: &Runtime) -> usize {
        runtime.inner.borrow().fibers.len()
    }

    #[test]
    fn aborted_render_pass_frees_its_fibers() {
        let host_env = Rc::new(RefCell::new(MemoryHost::new()));
        let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
        let container = host_env.borrow_mut().create_container();
        let runtime = Runtime::new(Rc::clone(&host_env), Rc::clone(&scheduler));
        let root = runtime.create_root(container);

        let extra_hook = Rc::new(Cell::new(false));
        let extra = Rc::clone(&extra_hook);
        let component = Component::new(move |cx, _props| {
            let (value, _set) = cx.use_state(|| 1i32)?;
            if extra.get() {
                let _ = cx.use_state(|| 2i32)?;
            }
            Ok(text(value.to_string()).into())
        });

        root.render(component.el());
        drive(&runtime, &scheduler);
        let baseline = fiber_count(&runtime);

        // Each failing pass allocates a work-in-progress pairing for the
        // component before the error surfaces; the abort must give it back.
        extra_hook.set(true);
        for _ in 0..3 {
            root.render(component.el());
            drive(&runtime, &scheduler);
            assert_eq!(fiber_count(&runtime), baseline);
        }

        extra_hook.set(false);
        root.render(component.el());
        drive(&runtime, &scheduler);
        assert_eq!(host_env.borrow().render_to_string(container), "1");
    }

    /// Scheduler whose time slice runs out after a fixed number of yield
    /// checks, like a deadline-based scheduler partway through a frame.
    struct SlicedScheduler {
        inner: ManualScheduler,
        budget: Cell<u32>,
    }

    impl SlicedScheduler {
        fn new() -> Self {
            Self {
                inner: ManualScheduler::new(),
                budget: Cell::new(0),
            }
        }
    }

    impl TaskScheduler for SlicedScheduler {
        fn schedule_callback(&mut self, priority: SchedulerPriority, work: RootWork) -> CallbackId {
            self.inner.schedule_callback(priority, work)
        }

        fn cancel_callback(&mut self, id: CallbackId) {
            self.inner.cancel_callback(id);
        }

        fn should_yield(&self) -> bool {
            let left = self.budget.get();
            if left == 0 {
                return true;
            }
            self.budget.set(left - 1);
            false
        }

        fn current_priority(&self) -> SchedulerPriority {
            self.inner.current_priority()
        }
    }

    fn drive_sliced(runtime: &Runtime, scheduler: &Rc<RefCell<SlicedScheduler>>) {
        loop {
            let task = { scheduler.borrow_mut().inner.take_next_task() };
            let Some((id, work)) = task else { break };
            while runtime.perform_scheduled_work(id, work, false) == WorkStatus::Yielded {
                scheduler.borrow().budget.set(1000);
            }
        }
    }

    fn keyed_list(items: &[&str]) -> Children {
        Children::One(Box::new(Child::from(
            host("ul").children(
                items
                    .iter()
                    .map(|item| host("li").key(*item).child(text(*item)).into())
                    .collect(),
            ),
        )))
    }

    #[test]
    fn discarded_render_pass_frees_its_fibers() {
        let host_env = Rc::new(RefCell::new(MemoryHost::new()));
        let scheduler = Rc::new(RefCell::new(SlicedScheduler::new()));
        let container = host_env.borrow_mut().create_container();
        let runtime = Runtime::new(Rc::clone(&host_env), Rc::clone(&scheduler));
        let root = runtime.create_root(container);

        scheduler.borrow().budget.set(1000);
        root.render(keyed_list(&["a"]));
        drive_sliced(&runtime, &scheduler);

        let mut steady = 0usize;
        for i in 0..5 {
            // A default-lane render that introduces a new keyed item yields
            // two units in, right after the fresh item's fiber is allocated.
            scheduler
                .borrow_mut()
                .inner
                .set_current_priority(SchedulerPriority::Normal);
            scheduler.borrow().budget.set(2);
            let fresh = format!("x{i}");
            root.render(keyed_list(&["a", fresh.as_str()]));
            let task = { scheduler.borrow_mut().inner.take_next_task() };
            let (id, work) = task.expect("render task scheduled");
            let status = runtime.perform_scheduled_work(id, work, false);
            assert_eq!(status, WorkStatus::Yielded);

            // Sync work preempts; the partial pass is discarded on restart.
            scheduler
                .borrow_mut()
                .inner
                .set_current_priority(SchedulerPriority::Immediate);
            root.render(keyed_list(&["a"]));
            runtime.flush_sync_work();

            // Let the deferred default lane replay to quiescence.
            scheduler
                .borrow_mut()
                .inner
                .set_current_priority(SchedulerPriority::Normal);
            scheduler.borrow().budget.set(1000);
            drive_sliced(&runtime, &scheduler);

            if i == 0 {
                steady = fiber_count(&runtime);
            } else {
                assert_eq!(fiber_count(&runtime), steady);
            }
        }

        assert_eq!(
            host_env.borrow().render_to_string(container),
            "<ul><li>a</li></ul>"
        );
    }
}

