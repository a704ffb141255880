//! Begin Work
//!
//! The descending half of the render phase: given one work-in-progress
//! fiber, compute its next children (from the root queue, a component
//! render, or host props) and reconcile them against the current buffer,
//! returning the first child to descend into. Host text has no children
//! and terminates the descent.

use std::rc::Rc;

use crate::element::Children;
use crate::error::RenderError;

use super::fiber::{FiberId, UpdateQueueSlot, WorkTag};
use super::flags::Flags;
use super::lanes::Lanes;
use super::update_queue::process_update_queue;
use super::Reconciler;

impl Reconciler {
    /// Compute and reconcile `wip`'s children. Returns the first child to
    /// work on next, or `None` when the descent bottoms out here.
    pub(crate) fn begin_work(
        &mut self,
        wip: FiberId,
        render_lane: Lanes,
    ) -> Result<Option<FiberId>, RenderError> {
        match self.fibers[wip].tag {
            WorkTag::HostRoot => self.update_host_root(wip, render_lane),
            WorkTag::HostComponent => {
                self.mark_ref_if_changed(wip);
                let children = self.fibers[wip].pending_props.children();
                Ok(self.reconcile(wip, children))
            }
            WorkTag::HostText => Ok(None),
            WorkTag::FunctionComponent => {
                let children = self.render_with_hooks(wip, render_lane)?;
                Ok(self.reconcile(wip, children))
            }
            WorkTag::Fragment => {
                let children = self.fibers[wip].pending_props.children();
                Ok(self.reconcile(wip, children))
            }
        }
    }

    /// Fold the root's element queue at this render lane and reconcile the
    /// resulting top-level children.
    fn update_host_root(
        &mut self,
        wip: FiberId,
        render_lane: Lanes,
    ) -> Result<Option<FiberId>, RenderError> {
        let alternate = self.fibers[wip].alternate;

        // Merge pending renders into the base queue *on the current buffer*
        // before processing: if this pass is discarded by higher-priority
        // work, the next pass re-reads the merged queue from there.
        let holder = alternate.unwrap_or(wip);
        let (shared, merged, base_state) = match &mut self.fibers[holder].update_queue {
            UpdateQueueSlot::Root {
                shared,
                base,
                base_state,
            } => {
                let pending = shared.take_pending();
                base.extend(pending);
                (shared.clone(), base.clone(), Rc::clone(base_state))
            }
            _ => {
                return Err(RenderError::Component(
                    "host root fiber has no root update queue".into(),
                ))
            }
        };

        let processed = process_update_queue(base_state, &merged, render_lane);
        let next_children = processed
            .memoized_state
            .downcast_ref::<Children>()
            .cloned()
            .ok_or_else(|| {
                RenderError::Component("host root state is not an element tree".into())
            })?;

        self.fibers[wip].update_queue = UpdateQueueSlot::Root {
            shared,
            base: processed.base_queue,
            base_state: processed.base_state,
        };

        Ok(self.reconcile(wip, next_children))
    }

    /// Diff `next_children` against the current buffer's children and
    /// install the result. Effect tracking is off when there is no current
    /// counterpart: a freshly mounting subtree gets one placement at its
    /// root rather than one per node.
    fn reconcile(&mut self, wip: FiberId, next_children: Children) -> Option<FiberId> {
        let alternate = self.fibers[wip].alternate;
        let current_first = alternate.and_then(|alt| self.fibers[alt].child);
        let first =
            self.reconcile_children(wip, current_first, next_children, alternate.is_some());
        self.fibers[wip].child = first;
        first
    }

    /// Set the `REF` flag when a host component mounts with a ref or its
    /// ref identity changed since the last render.
    fn mark_ref_if_changed(&mut self, wip: FiberId) {
        let needs_ref = {
            let fiber = &self.fibers[wip];
            match fiber.alternate {
                None => !fiber.node_ref.is_none(),
                Some(alt) => !self.fibers[alt].node_ref.same_identity(&fiber.node_ref),
            }
        };
        if needs_ref {
            self.fibers[wip].flags |= Flags::REF;
        }
    }
}
