//! Child Reconciliation
//!
//! Diffs one fiber's current children against the fresh element children
//! and produces the work-in-progress child list, marking placement and
//! deletion effects along the way.
//!
//! # How It Works
//!
//! Three shapes, three strategies:
//!
//! - **Single element / single text**: scan the old children for a key
//!   match. Key and type both matching means reuse; a key match with a type
//!   mismatch dooms the whole old list (keys are unique, nothing later can
//!   match); a key mismatch deletes just that candidate and keeps scanning.
//! - **A list**: index the old children in a map by explicit key (falling
//!   back to position), walk the new list claiming reusable fibers out of
//!   the map, and mark moves with the last-placed-index heuristic: a reused
//!   fiber whose old index precedes the last one that stayed put must move.
//!   Whatever is left in the map afterwards is deleted.
//! - **Nothing**: delete all remaining old children.
//!
//! Every mutation marker is gated on `should_track`: the mount path
//! reconciles with tracking off so a freshly built subtree carries a single
//! placement at its root instead of one per node.
//!
//! An unkeyed fragment at the top level is transparent: its children are
//! reconciled as if they appeared directly.

use indexmap::IndexMap;

use crate::element::{Child, Children, Element, ElementType, Key};

use super::fiber::{FiberId, FiberProps, WorkTag};
use super::flags::Flags;
use super::Reconciler;

/// Map key for list reconciliation: explicit key, or position for the rest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SlotKey {
    Keyed(Key),
    Index(usize),
}

impl Reconciler {
    /// Diff `children` against the current child list headed by
    /// `current_first` and install the result under `wip`. Returns the
    /// first work-in-progress child.
    pub(crate) fn reconcile_children(
        &mut self,
        wip: FiberId,
        current_first: Option<FiberId>,
        children: Children,
        should_track: bool,
    ) -> Option<FiberId> {
        // An unkeyed top-level fragment is transparent.
        let children = match children {
            Children::One(boxed) => match *boxed {
                Child::Element(el)
                    if matches!(el.ty, ElementType::Fragment) && el.key.is_none() =>
                {
                    el.props.children
                }
                other => Children::One(Box::new(other)),
            },
            other => other,
        };

        match children {
            Children::None => {
                self.delete_remaining_children(wip, current_first, should_track);
                None
            }
            Children::One(boxed) => match *boxed {
                Child::Element(element) => {
                    let fiber =
                        self.reconcile_single_element(wip, current_first, &element, should_track);
                    Some(self.place_single_child(fiber, should_track))
                }
                Child::Text(content) => {
                    let fiber =
                        self.reconcile_single_text(wip, current_first, content, should_track);
                    Some(self.place_single_child(fiber, should_track))
                }
                Child::List(list) => {
                    self.reconcile_children_array(wip, current_first, &list, should_track)
                }
            },
            Children::Many(list) => {
                self.reconcile_children_array(wip, current_first, &list, should_track)
            }
        }
    }

    /// Reuse `current` for this pass: pair it with a work-in-progress fiber
    /// carrying the new props, detached from its old siblings.
    fn use_fiber(&mut self, current: FiberId, pending_props: FiberProps) -> FiberId {
        let wip = self.create_work_in_progress(current, pending_props);
        let fiber = &mut self.fibers[wip];
        fiber.index = 0;
        fiber.sibling = None;
        wip
    }

    /// Mark one current child for deletion at commit.
    fn delete_child(&mut self, wip: FiberId, child: FiberId, should_track: bool) {
        if !should_track {
            return;
        }
        let parent = &mut self.fibers[wip];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    /// Mark `first` and all its following siblings for deletion.
    fn delete_remaining_children(
        &mut self,
        wip: FiberId,
        first: Option<FiberId>,
        should_track: bool,
    ) {
        if !should_track {
            return;
        }
        let mut cursor = first;
        while let Some(child) = cursor {
            cursor = self.fibers[child].sibling;
            self.delete_child(wip, child, should_track);
        }
    }

    fn reconcile_single_element(
        &mut self,
        wip: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
        should_track: bool,
    ) -> FiberId {
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let (key, elem_type, sibling) = {
                let fiber = &self.fibers[current];
                (fiber.key.clone(), fiber.elem_type.clone(), fiber.sibling)
            };

            if key == element.key {
                let same_type = elem_type
                    .as_ref()
                    .is_some_and(|ty| ty.same_type(&element.ty));
                if same_type {
                    let props = match &element.ty {
                        ElementType::Fragment => {
                            FiberProps::Children(children_vec(&element.props.children))
                        }
                        _ => FiberProps::Element(element.props.clone()),
                    };
                    let existing = self.use_fiber(current, props);
                    {
                        let fiber = &mut self.fibers[existing];
                        fiber.parent = Some(wip);
                        fiber.node_ref = element.node_ref.clone();
                    }
                    // Everything after the reused child is dead.
                    self.delete_remaining_children(wip, sibling, should_track);
                    return existing;
                }
                // Same key, different type: keys are unique among siblings,
                // so no later candidate can match either.
                self.delete_remaining_children(wip, Some(current), should_track);
                break;
            }

            self.delete_child(wip, current, should_track);
            cursor = sibling;
        }

        let fresh = self.create_fiber_from_element(element);
        self.fibers[fresh].parent = Some(wip);
        fresh
    }

    fn reconcile_single_text(
        &mut self,
        wip: FiberId,
        current_first: Option<FiberId>,
        content: String,
        should_track: bool,
    ) -> FiberId {
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let (tag, sibling) = {
                let fiber = &self.fibers[current];
                (fiber.tag, fiber.sibling)
            };

            if tag == WorkTag::HostText {
                let existing = self.use_fiber(current, FiberProps::Text(content));
                self.fibers[existing].parent = Some(wip);
                self.delete_remaining_children(wip, sibling, should_track);
                return existing;
            }

            self.delete_child(wip, current, should_track);
            cursor = sibling;
        }

        let fresh = self.create_fiber_from_text(content);
        self.fibers[fresh].parent = Some(wip);
        fresh
    }

    /// Mark a freshly mounted single child for placement. Reused fibers
    /// (ones with an alternate) already sit where they belong.
    fn place_single_child(&mut self, fiber: FiberId, should_track: bool) -> FiberId {
        if should_track && self.fibers[fiber].alternate.is_none() {
            self.fibers[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn reconcile_children_array(
        &mut self,
        wip: FiberId,
        current_first: Option<FiberId>,
        new_children: &[Child],
        should_track: bool,
    ) -> Option<FiberId> {
        // Index the old children; explicit key wins, position otherwise.
        let mut existing: IndexMap<SlotKey, FiberId> = IndexMap::new();
        let mut cursor = current_first;
        while let Some(current) = cursor {
            let fiber = &self.fibers[current];
            let slot = match &fiber.key {
                Some(key) => SlotKey::Keyed(key.clone()),
                None => SlotKey::Index(fiber.index),
            };
            existing.insert(slot, current);
            cursor = fiber.sibling;
        }

        let mut first_new: Option<FiberId> = None;
        let mut last_new: Option<FiberId> = None;
        // Old index of the last reused child that did not move. A reused
        // child whose old index precedes it crossed over something and must
        // be re-placed.
        let mut last_placed_index: usize = 0;

        for (i, child) in new_children.iter().enumerate() {
            let new_fiber = self.update_from_map(wip, &mut existing, i, child);

            {
                let fiber = &mut self.fibers[new_fiber];
                fiber.index = i;
                fiber.parent = Some(wip);
                fiber.sibling = None;
            }

            match last_new {
                None => first_new = Some(new_fiber),
                Some(prev) => self.fibers[prev].sibling = Some(new_fiber),
            }
            last_new = Some(new_fiber);

            if !should_track {
                continue;
            }

            match self.fibers[new_fiber].alternate {
                Some(alternate) => {
                    let old_index = self.fibers[alternate].index;
                    if old_index < last_placed_index {
                        self.fibers[new_fiber].flags |= Flags::PLACEMENT;
                    } else {
                        last_placed_index = old_index;
                    }
                }
                None => {
                    self.fibers[new_fiber].flags |= Flags::PLACEMENT;
                    last_placed_index = i;
                }
            }
        }

        // Whatever the new list never claimed is gone.
        let leftovers: Vec<FiberId> = existing.values().copied().collect();
        for child in leftovers {
            self.delete_child(wip, child, should_track);
        }

        first_new
    }

    /// Claim a reusable fiber out of the map for slot `index`, or allocate
    /// a fresh one. Unclaimable candidates stay in the map and are swept as
    /// deletions after the walk.
    fn update_from_map(
        &mut self,
        _wip: FiberId,
        existing: &mut IndexMap<SlotKey, FiberId>,
        index: usize,
        child: &Child,
    ) -> FiberId {
        match child {
            Child::Text(content) => {
                let slot = SlotKey::Index(index);
                if let Some(&before) = existing.get(&slot) {
                    if self.fibers[before].tag == WorkTag::HostText {
                        existing.shift_remove(&slot);
                        return self.use_fiber(before, FiberProps::Text(content.clone()));
                    }
                }
                self.create_fiber_from_text(content.clone())
            }
            Child::Element(element) => {
                let slot = match &element.key {
                    Some(key) => SlotKey::Keyed(key.clone()),
                    None => SlotKey::Index(index),
                };
                if let Some(&before) = existing.get(&slot) {
                    let reusable = self.fibers[before]
                        .elem_type
                        .as_ref()
                        .is_some_and(|ty| ty.same_type(&element.ty));
                    if reusable {
                        existing.shift_remove(&slot);
                        let props = match &element.ty {
                            ElementType::Fragment => {
                                FiberProps::Children(children_vec(&element.props.children))
                            }
                            _ => FiberProps::Element(element.props.clone()),
                        };
                        let reused = self.use_fiber(before, props);
                        self.fibers[reused].node_ref = element.node_ref.clone();
                        return reused;
                    }
                }
                self.create_fiber_from_element(element)
            }
            // A nested list reconciles as a fragment keyed by position.
            Child::List(list) => {
                let slot = SlotKey::Index(index);
                if let Some(&before) = existing.get(&slot) {
                    if self.fibers[before].tag == WorkTag::Fragment {
                        existing.shift_remove(&slot);
                        return self.use_fiber(before, FiberProps::Children(list.clone()));
                    }
                }
                self.create_fiber_from_fragment(list.clone(), None)
            }
        }
    }
}

fn children_vec(children: &Children) -> Vec<Child> {
    match children {
        Children::None => Vec::new(),
        Children::One(child) => vec![(**child).clone()],
        Children::Many(list) => list.clone(),
    }
}
