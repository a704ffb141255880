//! Work-Unit Model
//!
//! A fiber is one mutable unit of work: one node of the rendered tree,
//! persistent across updates. Fibers live in a slotmap arena and reference
//! each other by key (`FiberId`) rather than by pointer, which sidesteps
//! the ownership cycle a parent↔child back-reference would otherwise
//! create.
//!
//! # Double buffering
//!
//! Each logical tree position has at most two live fibers, paired through
//! `alternate`: the *current* one (mounted, reflecting the live host tree)
//! and the *work-in-progress* one being built by the render phase. Render
//! only ever mutates the work-in-progress buffer; the commit phase swaps
//! buffers atomically by repointing `FiberRoot::current`. A fresh visit
//! reuses the alternate when one exists, so allocation never exceeds two
//! fibers per position.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::element::{Child, Children, Element, ElementType, Key, Props, RefObject};
use crate::host::HostHandle;
use crate::scheduler::CallbackId;

use super::hooks::{Effect, Hook};
use super::lanes::Lanes;
use super::update_queue::{SharedQueue, StateValue, Update};
use super::Reconciler;

new_key_type! {
    /// Arena key of a fiber.
    pub struct FiberId;

    /// Key of a mounted root.
    pub struct RootId;
}

/// The kind of work a fiber represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkTag {
    /// A user component driven by the hook runtime.
    FunctionComponent,
    /// The fiber at the top of a mounted tree.
    HostRoot,
    /// A host-primitive node.
    HostComponent,
    /// A host text node.
    HostText,
    /// A grouping node with no host representation.
    Fragment,
}

/// Per-tag props. The original models all of these as one loose props
/// object; the tags carry genuinely different payloads, so they are split.
#[derive(Clone, Debug, Default)]
pub(crate) enum FiberProps {
    /// No props (host root).
    #[default]
    None,
    /// Attributes + children (host components and function components).
    Element(Props),
    /// Text content (host text).
    Text(String),
    /// A bare child list (fragments).
    Children(Vec<Child>),
}

impl FiberProps {
    /// The children to reconcile below a fiber carrying these props.
    pub fn children(&self) -> Children {
        match self {
            FiberProps::None | FiberProps::Text(_) => Children::None,
            FiberProps::Element(props) => props.children.clone(),
            FiberProps::Children(list) => Children::Many(list.clone()),
        }
    }
}

/// What a fiber has memoized from its last completed render.
#[derive(Clone, Default)]
pub(crate) enum MemoizedState {
    /// Nothing yet.
    #[default]
    None,
    /// A function component's hook list, in call order.
    Hooks(Vec<Hook>),
}

/// The opaque instance behind a fiber.
#[derive(Clone, Copy, Debug)]
pub(crate) enum StateNode {
    /// Host-adapter handle (host components and text).
    Host(HostHandle),
    /// Back-pointer to the owning root record (host root only).
    Root(RootId),
}

/// Update storage attached to a fiber.
#[derive(Clone, Default)]
pub(crate) enum UpdateQueueSlot {
    /// No queue.
    #[default]
    None,
    /// The host root's element updates. `shared` is the dispatch target
    /// common to both buffers; `base`/`base_state` persist skipped updates
    /// on whichever buffer processed them last (see `update_queue`).
    Root {
        /// Pending element updates, shared across buffers.
        shared: SharedQueue,
        /// Updates deferred to a future render at their own lane.
        base: Vec<Update>,
        /// State to replay `base` on top of (an `Rc<Children>`).
        base_state: StateValue,
    },
    /// A function component's effect list for its latest render.
    Effects(Vec<Rc<RefCell<Effect>>>),
}

/// One unit of work: a mutable, double-buffered tree node.
pub(crate) struct Fiber {
    /// What kind of node this is.
    pub tag: WorkTag,
    /// The element type that produced this fiber, for reuse decisions.
    pub elem_type: Option<ElementType>,
    /// Reconciliation key.
    pub key: Option<Key>,
    /// Host handle or root record.
    pub state_node: Option<StateNode>,
    /// Ref to populate at commit (host components only).
    pub node_ref: RefObject,

    // Tree links. `parent` describes the completion order (the original
    // calls it `return`, a keyword here).
    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among siblings; the move heuristic compares old positions.
    pub index: usize,

    /// Props for the pass being rendered.
    pub pending_props: FiberProps,
    /// Props as of the last completed pass.
    pub memoized_props: Option<FiberProps>,
    /// State as of the last completed pass.
    pub memoized_state: MemoizedState,
    /// Pending update storage.
    pub update_queue: UpdateQueueSlot,

    /// The paired fiber in the other buffer.
    pub alternate: Option<FiberId>,

    /// Pending effects on this fiber.
    pub flags: super::flags::Flags,
    /// OR of all descendant flags; lets commit skip clean subtrees.
    pub subtree_flags: super::flags::Flags,
    /// Children removed this pass, owned by this (parent) fiber.
    pub deletions: SmallVec<[FiberId; 4]>,
}

impl Fiber {
    pub fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            elem_type: None,
            key,
            state_node: None,
            node_ref: RefObject::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            update_queue: UpdateQueueSlot::None,
            alternate: None,
            flags: super::flags::Flags::empty(),
            subtree_flags: super::flags::Flags::empty(),
            deletions: SmallVec::new(),
        }
    }

    /// The host handle behind this fiber, if it is a host node.
    pub fn host_handle(&self) -> Option<HostHandle> {
        match self.state_node {
            Some(StateNode::Host(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Whether this fiber has a direct host representation.
    pub fn is_host(&self) -> bool {
        matches!(self.tag, WorkTag::HostComponent | WorkTag::HostText)
    }
}

/// One mounted tree: scheduling state plus the two fiber buffers' anchor.
pub(crate) struct FiberRoot {
    /// Host container the tree renders into.
    pub container: HostHandle,
    /// The current (committed) host-root fiber.
    pub current: FiberId,
    /// A completed work-in-progress tree awaiting commit.
    pub finished_work: Option<FiberId>,
    /// The lane `finished_work` was rendered at.
    pub finished_lane: Lanes,
    /// Lanes with work outstanding.
    pub pending_lanes: Lanes,
    /// The callback registered with the external scheduler, if any.
    pub callback_node: Option<CallbackId>,
    /// The lane priority that callback was registered at.
    pub callback_priority: Lanes,
    /// Passive effects queued by the last commit, awaiting flush.
    pub pending_passive_effects: PendingPassiveEffects,
    /// Whether a passive flush task is already scheduled (coalescing).
    pub passive_flush_scheduled: bool,
}

/// Passive effects split by origin: unmount cleanups run before any update
/// effect in the same flush.
#[derive(Default)]
pub(crate) struct PendingPassiveEffects {
    /// Effects of deleted function components (destroy only).
    pub unmount: Vec<Rc<RefCell<Effect>>>,
    /// Effects of updated/mounted function components.
    pub update: Vec<Rc<RefCell<Effect>>>,
}

impl Reconciler {
    /// Fetch or allocate the work-in-progress pairing of `current`,
    /// carrying state over and clearing stale effect bookkeeping.
    pub(crate) fn create_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let (alternate, tag, key) = {
            let cur = &self.fibers[current];
            (cur.alternate, cur.tag, cur.key.clone())
        };

        let wip = match alternate {
            None => {
                let mut fresh = Fiber::new(tag, pending_props, key);
                fresh.alternate = Some(current);
                let state_node = self.fibers[current].state_node;
                fresh.state_node = state_node;
                let wip = self.fibers.insert(fresh);
                self.fibers[current].alternate = Some(wip);
                self.pass_allocated.push(wip);
                wip
            }
            Some(wip) => {
                let fiber = &mut self.fibers[wip];
                fiber.pending_props = pending_props;
                // Effects here are leftovers from the pass that built this
                // buffer; they were consumed when it was committed.
                fiber.flags = super::flags::Flags::empty();
                fiber.subtree_flags = super::flags::Flags::empty();
                fiber.deletions.clear();
                wip
            }
        };

        let (elem_type, update_queue, child, memoized_props, memoized_state, node_ref, state_node) = {
            let cur = &self.fibers[current];
            (
                cur.elem_type.clone(),
                cur.update_queue.clone(),
                cur.child,
                cur.memoized_props.clone(),
                cur.memoized_state.clone(),
                cur.node_ref.clone(),
                cur.state_node,
            )
        };
        let fiber = &mut self.fibers[wip];
        fiber.elem_type = elem_type;
        fiber.update_queue = update_queue;
        fiber.child = child;
        fiber.memoized_props = memoized_props;
        fiber.memoized_state = memoized_state;
        fiber.node_ref = node_ref;
        fiber.state_node = state_node;
        wip
    }

    /// Allocate a fresh fiber for an element descriptor.
    pub(crate) fn create_fiber_from_element(&mut self, element: &Element) -> FiberId {
        match &element.ty {
            ElementType::Fragment => self.create_fiber_from_fragment(
                match &element.props.children {
                    Children::None => Vec::new(),
                    Children::One(child) => vec![(**child).clone()],
                    Children::Many(list) => list.clone(),
                },
                element.key.clone(),
            ),
            ty => {
                let tag = match ty {
                    ElementType::Host(_) => WorkTag::HostComponent,
                    _ => WorkTag::FunctionComponent,
                };
                let mut fiber = Fiber::new(
                    tag,
                    FiberProps::Element(element.props.clone()),
                    element.key.clone(),
                );
                fiber.elem_type = Some(ty.clone());
                fiber.node_ref = element.node_ref.clone();
                let id = self.fibers.insert(fiber);
                self.pass_allocated.push(id);
                id
            }
        }
    }

    /// Allocate a fresh fragment fiber over a bare child list.
    pub(crate) fn create_fiber_from_fragment(
        &mut self,
        children: Vec<Child>,
        key: Option<Key>,
    ) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::Fragment, FiberProps::Children(children), key);
        fiber.elem_type = Some(ElementType::Fragment);
        let id = self.fibers.insert(fiber);
        self.pass_allocated.push(id);
        id
    }

    /// Allocate a fresh host-text fiber.
    pub(crate) fn create_fiber_from_text(&mut self, content: String) -> FiberId {
        let id = self
            .fibers
            .insert(Fiber::new(WorkTag::HostText, FiberProps::Text(content), None));
        self.pass_allocated.push(id);
        id
    }

    /// Free every fiber allocated by a render pass that will never commit,
    /// unpairing the alternates they were attached to. The next pass
    /// re-derives its work-in-progress tree from the current buffer, so
    /// nothing else references these slots.
    pub(crate) fn release_pass_allocations(&mut self) {
        for id in std::mem::take(&mut self.pass_allocated) {
            let partner = self.fibers.get(id).and_then(|fiber| fiber.alternate);
            if let Some(partner) = partner {
                if let Some(fiber) = self.fibers.get_mut(partner) {
                    if fiber.alternate == Some(id) {
                        fiber.alternate = None;
                    }
                }
            }
            self.fibers.remove(id);
        }
    }

    /// Return a deleted subtree's fiber slots (and their alternates) to the
    /// arena. Called after the host nodes are removed at commit.
    pub(crate) fn release_subtree(&mut self, root: FiberId) {
        let mut stack = vec![root];
        let mut doomed: Vec<FiberId> = Vec::new();

        while let Some(id) = stack.pop() {
            let Some(fiber) = self.fibers.get(id) else {
                continue;
            };
            doomed.push(id);
            if let Some(alt) = fiber.alternate {
                if !doomed.contains(&alt) {
                    doomed.push(alt);
                }
            }
            let mut child = fiber.child;
            while let Some(c) = child {
                stack.push(c);
                child = self.fibers.get(c).and_then(|f| f.sibling);
            }
        }

        for id in doomed {
            self.fibers.remove(id);
        }
    }
}
