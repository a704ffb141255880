//! Manual Scheduler
//!
//! A deterministic [`TaskScheduler`] driven entirely by the embedder: tasks
//! queue up in priority order and run only when the embedder pops them and
//! hands them to [`crate::Runtime::perform_scheduled_work`]. The yield flag
//! and ambient priority are plain setters, which makes time-slicing and
//! lane selection fully scriptable in tests and simple embeddings.

use super::{CallbackId, RootWork, SchedulerPriority, TaskScheduler};

#[derive(Clone, Copy, Debug)]
struct Task {
    id: CallbackId,
    priority: SchedulerPriority,
    work: RootWork,
}

/// Embedder-driven scheduler with a priority-ordered task queue.
pub struct ManualScheduler {
    tasks: Vec<Task>,
    next_id: u64,
    yield_requested: bool,
    current_priority: SchedulerPriority,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
            yield_requested: false,
            current_priority: SchedulerPriority::Normal,
        }
    }
}

impl ManualScheduler {
    /// Create an empty scheduler with `Normal` ambient priority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether `should_yield` reports an exhausted time slice.
    pub fn set_should_yield(&mut self, yield_requested: bool) {
        self.yield_requested = yield_requested;
    }

    /// Set the ambient priority reported to `current_priority`. Updates
    /// created while a priority is set derive their lane from it.
    pub fn set_current_priority(&mut self, priority: SchedulerPriority) {
        self.current_priority = priority;
    }

    /// Pop the highest-priority pending task. Ties run in registration
    /// order.
    pub fn take_next_task(&mut self) -> Option<(CallbackId, RootWork)> {
        let best = self
            .tasks
            .iter()
            .enumerate()
            .min_by_key(|(index, task)| (task.priority, *index))
            .map(|(index, _)| index)?;
        let task = self.tasks.remove(best);
        Some((task.id, task.work))
    }

    /// Whether any tasks are queued.
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Number of queued tasks.
    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule_callback(&mut self, priority: SchedulerPriority, work: RootWork) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.tasks.push(Task { id, priority, work });
        id
    }

    fn cancel_callback(&mut self, id: CallbackId) {
        self.tasks.retain(|task| task.id != id);
    }

    fn should_yield(&self) -> bool {
        self.yield_requested
    }

    fn current_priority(&self) -> SchedulerPriority {
        self.current_priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::WorkKind;
    use slotmap::SlotMap;

    fn dummy_work() -> RootWork {
        // A RootId needs a live slotmap to come from; any key works for
        // queue-ordering tests.
        let mut keys: SlotMap<crate::reconciler::RootId, ()> = SlotMap::with_key();
        RootWork {
            root: keys.insert(()),
            kind: WorkKind::Render,
        }
    }

    #[test]
    fn tasks_pop_in_priority_order() {
        let mut scheduler = ManualScheduler::new();
        let work = dummy_work();

        let normal = scheduler.schedule_callback(SchedulerPriority::Normal, work);
        let immediate = scheduler.schedule_callback(SchedulerPriority::Immediate, work);
        let idle = scheduler.schedule_callback(SchedulerPriority::Idle, work);

        assert_eq!(scheduler.take_next_task().map(|(id, _)| id), Some(immediate));
        assert_eq!(scheduler.take_next_task().map(|(id, _)| id), Some(normal));
        assert_eq!(scheduler.take_next_task().map(|(id, _)| id), Some(idle));
        assert!(scheduler.take_next_task().is_none());
    }

    #[test]
    fn equal_priorities_run_in_registration_order() {
        let mut scheduler = ManualScheduler::new();
        let work = dummy_work();

        let first = scheduler.schedule_callback(SchedulerPriority::Normal, work);
        let second = scheduler.schedule_callback(SchedulerPriority::Normal, work);

        assert_eq!(scheduler.take_next_task().map(|(id, _)| id), Some(first));
        assert_eq!(scheduler.take_next_task().map(|(id, _)| id), Some(second));
    }

    #[test]
    fn cancel_removes_the_task() {
        let mut scheduler = ManualScheduler::new();
        let work = dummy_work();

        let id = scheduler.schedule_callback(SchedulerPriority::Normal, work);
        assert!(scheduler.has_pending_tasks());

        scheduler.cancel_callback(id);
        assert!(!scheduler.has_pending_tasks());
        assert!(scheduler.take_next_task().is_none());
    }
}
