//! Commit Pipeline
//!
//! Applies a finished work-in-progress tree to the host in one synchronous,
//! non-yielding pass, so the host never observes a half-applied update.
//!
//! # Phases
//!
//! 1. **Mutation**: walk the tree pruned by `subtree_flags`, and on each
//!    flagged fiber apply effects in a fixed order: placement, update,
//!    child deletion, passive-effect collection, ref detach.
//! 2. **Buffer swap**: `root.current` now points at the finished tree. Refs
//!    and effects observe post-mutation host state from here on.
//! 3. **Layout**: attach refs from the final host nodes.
//!
//! Passive effects are only *collected* during commit; they run later in a
//! scheduled flush task ([`Reconciler::flush_passive_effects`]), batched
//! strictly as all unmount cleanups, then all update cleanups, then all
//! update bodies.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::element::RefObject;
use crate::host::HostHandle;
use crate::scheduler::{RootWork, SchedulerPriority};

use super::fiber::{FiberId, FiberProps, RootId, UpdateQueueSlot, WorkTag};
use super::flags::{Flags, HookEffectTags};
use super::lanes::Lanes;
use super::Reconciler;

impl Reconciler {
    /// Apply the root's finished tree to the host and swap buffers.
    pub(crate) fn commit_root(&mut self, root: RootId) {
        let Some(finished) = self.roots[root].finished_work else {
            return;
        };
        let lane = self.roots[root].finished_lane;
        debug!(?root, ?lane, "commit");
        if lane.is_none() {
            warn!(?root, "committing without a finished lane");
        }

        {
            let record = &mut self.roots[root];
            record.finished_work = None;
            record.finished_lane = Lanes::NONE;
            record.pending_lanes = record.pending_lanes.remove(lane);
        }

        let flags = {
            let fiber = &self.fibers[finished];
            fiber.flags | fiber.subtree_flags
        };

        // One flush task per root at a time, whatever the number of commits
        // feeding it.
        if flags.intersects(Flags::PASSIVE_MASK) && !self.roots[root].passive_flush_scheduled {
            self.roots[root].passive_flush_scheduled = true;
            self.scheduler
                .schedule_callback(SchedulerPriority::Normal, RootWork::flush_passive(root));
        }

        if flags.intersects(Flags::MUTATION_MASK | Flags::PASSIVE_MASK) {
            self.commit_mutation_effects(finished, root);
            self.roots[root].current = finished;
            self.commit_layout_effects(finished);
        } else {
            self.roots[root].current = finished;
        }
    }

    /// Depth-first effect walk: descend only into subtrees whose summary
    /// intersects `mask`, visiting each fiber on the way back up.
    fn commit_mutation_effects(&mut self, finished: FiberId, root: RootId) {
        let mask = Flags::MUTATION_MASK | Flags::PASSIVE_MASK;
        let mut next = Some(finished);

        while let Some(id) = next {
            let (subtree, child) = {
                let fiber = &self.fibers[id];
                (fiber.subtree_flags, fiber.child)
            };

            if subtree.intersects(mask) && child.is_some() {
                next = child;
                continue;
            }

            let mut node = id;
            loop {
                self.commit_mutation_on_fiber(node, root);
                if let Some(sibling) = self.fibers[node].sibling {
                    next = Some(sibling);
                    break;
                }
                match self.fibers[node].parent {
                    Some(parent) => node = parent,
                    None => {
                        next = None;
                        break;
                    }
                }
            }
        }
    }

    fn commit_mutation_on_fiber(&mut self, fiber: FiberId, root: RootId) {
        let flags = self.fibers[fiber].flags;

        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(fiber, root);
            self.fibers[fiber].flags -= Flags::PLACEMENT;
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_host_update(fiber);
            self.fibers[fiber].flags -= Flags::UPDATE;
        }
        if flags.contains(Flags::CHILD_DELETION) {
            let deletions: Vec<FiberId> =
                std::mem::take(&mut self.fibers[fiber].deletions).into_vec();
            for doomed in deletions {
                self.commit_deletion(doomed, root);
            }
            self.fibers[fiber].flags -= Flags::CHILD_DELETION;
        }
        if flags.contains(Flags::PASSIVE_EFFECT) {
            self.collect_passive_effects(fiber, root);
            self.fibers[fiber].flags -= Flags::PASSIVE_EFFECT;
        }
        if flags.contains(Flags::REF) && self.fibers[fiber].tag == WorkTag::HostComponent {
            // Detach the previous incarnation's ref; layout re-attaches the
            // new one from post-mutation host state.
            if let Some(alternate) = self.fibers[fiber].alternate {
                let old_ref = self.fibers[alternate].node_ref.clone();
                detach_ref(&old_ref);
            }
        }
    }

    /// Queue a function component's effect records for the deferred flush.
    fn collect_passive_effects(&mut self, fiber: FiberId, root: RootId) {
        if let UpdateQueueSlot::Effects(effects) = &self.fibers[fiber].update_queue {
            let effects = effects.clone();
            self.roots[root]
                .pending_passive_effects
                .update
                .extend(effects);
        }
    }

    fn commit_host_update(&mut self, fiber: FiberId) {
        let (tag, handle, props) = {
            let f = &self.fibers[fiber];
            (f.tag, f.host_handle(), f.memoized_props.clone())
        };
        let Some(handle) = handle else {
            warn!("update effect on a fiber without a host node");
            return;
        };
        match (tag, props) {
            (WorkTag::HostText, Some(FiberProps::Text(content))) => {
                self.host.commit_text_update(handle, &content);
            }
            (WorkTag::HostComponent, Some(FiberProps::Element(props))) => {
                self.host.commit_update(handle, &props);
            }
            _ => warn!(?tag, "update effect on an unexpected fiber"),
        }
    }

    // ---- placement -------------------------------------------------------

    fn commit_placement(&mut self, fiber: FiberId, root: RootId) {
        let Some(parent) = self.host_parent_of(fiber, root) else {
            warn!("placement without a host parent");
            return;
        };
        let before = self.host_sibling_of(fiber);
        self.insert_or_append_placement_node(fiber, parent, before);
    }

    /// Nearest host container above `fiber`: a host component's instance or
    /// the root's container.
    fn host_parent_of(&self, fiber: FiberId, root: RootId) -> Option<HostHandle> {
        let mut parent = self.fibers[fiber].parent;
        while let Some(id) = parent {
            let f = &self.fibers[id];
            match f.tag {
                WorkTag::HostComponent => return f.host_handle(),
                WorkTag::HostRoot => return Some(self.roots[root].container),
                _ => parent = f.parent,
            }
        }
        None
    }

    /// The first *stable* host node after `fiber` in host order, to insert
    /// before. Skips placement-flagged nodes (their final position is not
    /// settled yet) and descends through non-host layers.
    fn host_sibling_of(&self, fiber: FiberId) -> Option<HostHandle> {
        let mut node = fiber;
        'sibling: loop {
            // Climb until some sibling exists; crossing a host boundary
            // means there is no sibling inside this container.
            loop {
                match self.fibers[node].sibling {
                    Some(sibling) => {
                        node = sibling;
                        break;
                    }
                    None => {
                        let parent = self.fibers[node].parent?;
                        if matches!(
                            self.fibers[parent].tag,
                            WorkTag::HostComponent | WorkTag::HostRoot
                        ) {
                            return None;
                        }
                        node = parent;
                    }
                }
            }

            // Descend through components/fragments to a host node.
            loop {
                let f = &self.fibers[node];
                if f.is_host() {
                    break;
                }
                if f.flags.contains(Flags::PLACEMENT) {
                    continue 'sibling;
                }
                match f.child {
                    Some(child) => node = child,
                    None => continue 'sibling,
                }
            }

            let f = &self.fibers[node];
            if !f.flags.contains(Flags::PLACEMENT) {
                return f.host_handle();
            }
        }
    }

    /// Attach the placed fiber's topmost host nodes under `parent`,
    /// descending through non-host layers (a placed fragment or component
    /// can expose several host roots).
    fn insert_or_append_placement_node(
        &mut self,
        fiber: FiberId,
        parent: HostHandle,
        before: Option<HostHandle>,
    ) {
        let (is_host, handle, first_child) = {
            let f = &self.fibers[fiber];
            (f.is_host(), f.host_handle(), f.child)
        };

        if is_host {
            if let Some(handle) = handle {
                match before {
                    Some(before) => self.host.insert_child_to_container(handle, parent, before),
                    None => self.host.append_child_to_container(parent, handle),
                }
            }
            return;
        }

        let mut child = first_child;
        while let Some(id) = child {
            self.insert_or_append_placement_node(id, parent, before);
            child = self.fibers[id].sibling;
        }
    }

    // ---- deletion --------------------------------------------------------

    /// Unmount a doomed subtree: detach refs, queue passive unmount
    /// cleanups, remove exactly the topmost host nodes from their host
    /// parent, and return the fiber slots to the arena.
    fn commit_deletion(&mut self, doomed: FiberId, root: RootId) {
        let host_parent = self.host_parent_of(doomed, root);
        let mut top_hosts: Vec<HostHandle> = Vec::new();
        self.commit_unmount(doomed, root, &mut top_hosts, 0);

        match host_parent {
            Some(parent) => {
                for handle in top_hosts {
                    self.host.remove_child(handle, parent);
                }
            }
            None => {
                if !top_hosts.is_empty() {
                    warn!("deletion of host nodes without a host parent");
                }
            }
        }

        self.release_subtree(doomed);
    }

    /// Depth-first unmount visit. `host_depth` counts enclosing host nodes
    /// inside the doomed subtree; only depth-zero host nodes are collected
    /// for removal, their descendants go with them.
    fn commit_unmount(
        &mut self,
        fiber: FiberId,
        root: RootId,
        top_hosts: &mut Vec<HostHandle>,
        host_depth: usize,
    ) {
        let (tag, handle, node_ref, first_child) = {
            let f = &self.fibers[fiber];
            (f.tag, f.host_handle(), f.node_ref.clone(), f.child)
        };

        let mut child_depth = host_depth;
        match tag {
            WorkTag::HostComponent | WorkTag::HostText => {
                if host_depth == 0 {
                    if let Some(handle) = handle {
                        top_hosts.push(handle);
                    }
                }
                child_depth += 1;
                if tag == WorkTag::HostComponent {
                    detach_ref(&node_ref);
                }
            }
            WorkTag::FunctionComponent => {
                if let UpdateQueueSlot::Effects(effects) = &self.fibers[fiber].update_queue {
                    let effects = effects.clone();
                    self.roots[root]
                        .pending_passive_effects
                        .unmount
                        .extend(effects);
                }
            }
            WorkTag::Fragment | WorkTag::HostRoot => {}
        }

        let mut child = first_child;
        while let Some(id) = child {
            self.commit_unmount(id, root, top_hosts, child_depth);
            child = self.fibers[id].sibling;
        }
    }

    // ---- layout ----------------------------------------------------------

    /// Post-swap walk attaching refs from final host state.
    fn commit_layout_effects(&mut self, finished: FiberId) {
        let mask = Flags::LAYOUT_MASK;
        let root_subtree = self.fibers[finished].subtree_flags | self.fibers[finished].flags;
        if !root_subtree.intersects(mask) {
            return;
        }

        let mut next = Some(finished);
        while let Some(id) = next {
            let (subtree, child) = {
                let fiber = &self.fibers[id];
                (fiber.subtree_flags, fiber.child)
            };

            if subtree.intersects(mask) && child.is_some() {
                next = child;
                continue;
            }

            let mut node = id;
            loop {
                self.commit_layout_on_fiber(node);
                if let Some(sibling) = self.fibers[node].sibling {
                    next = Some(sibling);
                    break;
                }
                match self.fibers[node].parent {
                    Some(parent) => node = parent,
                    None => {
                        next = None;
                        break;
                    }
                }
            }
        }
    }

    fn commit_layout_on_fiber(&mut self, fiber: FiberId) {
        let f = &self.fibers[fiber];
        if f.flags.contains(Flags::REF) && f.tag == WorkTag::HostComponent {
            let handle = f.host_handle();
            let node_ref = f.node_ref.clone();
            attach_ref(&node_ref, handle);
            self.fibers[fiber].flags -= Flags::REF;
        }
    }

    // ---- passive flush ---------------------------------------------------

    /// Run queued passive effects: all unmount cleanups, then all update
    /// cleanups, then all update bodies. Returns whether anything ran.
    /// Updates dispatched by effect bodies drain afterwards and any sync
    /// work they produced flushes before returning.
    pub(crate) fn flush_passive_effects(&mut self, root: RootId) -> bool {
        let Some(record) = self.roots.get_mut(root) else {
            return false;
        };
        record.passive_flush_scheduled = false;
        let pending = std::mem::take(&mut record.pending_passive_effects);
        let mut did_flush = false;

        for effect in &pending.unmount {
            did_flush = true;
            let destroy = {
                let mut e = effect.borrow_mut();
                // The component is gone; the effect must never fire again.
                e.tag -= HookEffectTags::HAS_EFFECT;
                e.destroy.take()
            };
            if let Some(destroy) = destroy {
                destroy();
            }
        }

        let fired = HookEffectTags::PASSIVE | HookEffectTags::HAS_EFFECT;
        for effect in &pending.update {
            if !effect.borrow().tag.contains(fired) {
                continue;
            }
            did_flush = true;
            let destroy = effect.borrow().destroy.clone();
            if let Some(destroy) = destroy {
                destroy();
            }
        }
        for effect in &pending.update {
            if !effect.borrow().tag.contains(fired) {
                continue;
            }
            did_flush = true;
            let create = Rc::clone(&effect.borrow().create);
            let destroy = create();
            effect.borrow_mut().destroy = destroy;
        }

        self.drain_deferred_dispatches();
        self.flush_sync_callbacks();
        did_flush
    }
}

fn detach_ref(node_ref: &RefObject) {
    match node_ref {
        RefObject::None => {}
        RefObject::Cell(cell) => cell.set(None),
        RefObject::Callback(callback) => callback(None),
    }
}

fn attach_ref(node_ref: &RefObject, handle: Option<HostHandle>) {
    match node_ref {
        RefObject::None => {}
        RefObject::Cell(cell) => cell.set(handle),
        RefObject::Callback(callback) => callback(handle),
    }
}
