//! Hook Runtime
//!
//! Per-component persistent state, addressed positionally: the Nth hook
//! call of a render pass reads and writes the Nth slot of the fiber's hook
//! list. That makes hook identity purely a function of call order, which is
//! why call order must be stable across renders; drift is detected against
//! the previous render's list and fails the pass with a [`RenderError`].
//!
//! # How It Works
//!
//! Components receive a [`HookCx`] for exactly the duration of their render
//! call. There is no ambient "currently rendering" global: the context is
//! threaded explicitly, so calling a hook outside a render is simply not
//! expressible. During the pass the context builds this render's hook list
//! while walking the previous one with a cursor.
//!
//! State updates dispatched from event handlers land in a queue shared by
//! both fiber buffers and are folded in lane order by
//! [`super::update_queue::process_update_queue`]; the merged queue is
//! persisted on the *current* buffer before processing, so a render pass
//! that gets discarded by higher-priority work never strands an update.
//!
//! A [`Dispatch`] outlives the render that created it. Invoked while the
//! runtime is idle, it enqueues and schedules immediately; invoked while
//! the runtime cell is already borrowed (inside render, commit, or an
//! effect), it parks the update in a deferred inbox that the work loop
//! drains at its next safe point.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::element::{Children, ElementType, Props};
use crate::error::RenderError;

use super::fiber::{FiberId, FiberProps, MemoizedState, UpdateQueueSlot};
use super::flags::{Flags, HookEffectTags};
use super::lanes::Lanes;
use super::update_queue::{process_update_queue, Action, SharedQueue, StateValue, Update};
use super::Reconciler;

/// An effect cleanup function. `Rc` so the previous cleanup can be carried
/// into the next render's effect record without being consumed.
pub type EffectCleanup = Rc<dyn Fn()>;

/// An effect body: runs after commit, optionally returning a cleanup.
pub type EffectCreate = Rc<dyn Fn() -> Option<EffectCleanup>>;

/// One effect record. A fresh record is created per render; the previous
/// cleanup is carried forward so it can run before the next body does.
pub(crate) struct Effect {
    /// `PASSIVE`, plus `HAS_EFFECT` when deps changed this render.
    pub tag: HookEffectTags,
    /// Effect body.
    pub create: EffectCreate,
    /// Cleanup returned by the last body run, if any.
    pub destroy: Option<EffectCleanup>,
    /// Dependency snapshot. `None` means re-run every render.
    pub deps: Option<Vec<Dep>>,
}

/// The per-kind payload of a hook slot.
#[derive(Clone)]
pub(crate) enum HookState {
    /// State hook. The value lives in `base_state`/`base_queue`, which
    /// always reproduce the memoized value when the base queue is empty.
    State,
    /// Effect hook: this render's effect record.
    Effect(Rc<RefCell<Effect>>),
}

/// One hook slot in a fiber's hook list.
#[derive(Clone)]
pub(crate) struct Hook {
    pub memoized_state: HookState,
    /// State the base queue replays on top of (state hooks).
    pub base_state: StateValue,
    /// Updates skipped at a previous render lane (state hooks).
    pub base_queue: Vec<Update>,
    /// The shared dispatch target (state hooks).
    pub queue: Option<SharedQueue>,
}

/// A dependency value erased together with its `PartialEq` comparator.
/// Build one with [`dep`].
#[derive(Clone)]
pub struct Dep {
    value: Rc<dyn Any>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
}

/// Erase a comparable value for an effect dependency list.
pub fn dep<T: PartialEq + 'static>(value: T) -> Dep {
    Dep {
        value: Rc::new(value),
        eq: |a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

impl Dep {
    fn same(&self, other: &Dep) -> bool {
        (self.eq)(self.value.as_ref(), other.value.as_ref())
    }
}

/// Shallow dependency comparison. Absent deps never compare equal, so an
/// effect without a dependency list re-runs on every render.
fn deps_equal(prev: Option<&[Dep]>, next: Option<&[Dep]>) -> bool {
    match (prev, next) {
        (Some(prev), Some(next)) => {
            prev.len() == next.len() && prev.iter().zip(next).all(|(a, b)| a.same(b))
        }
        _ => false,
    }
}

/// A state update parked while the runtime was busy; drained at the work
/// loop's next safe point with the lane sampled at drain time.
pub(crate) struct DeferredDispatch {
    pub fiber: FiberId,
    pub queue: SharedQueue,
    pub action: Action,
}

/// Shared inbox for [`DeferredDispatch`] records.
pub(crate) type DeferredInbox = Rc<RefCell<Vec<DeferredDispatch>>>;

/// Setter handle returned by [`HookCx::use_state`]. Cloneable and callable
/// from anywhere, including inside effects and other components' renders.
pub struct Dispatch<T> {
    runtime: Weak<RefCell<Reconciler>>,
    deferred: DeferredInbox,
    fiber: FiberId,
    queue: SharedQueue,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: Weak::clone(&self.runtime),
            deferred: Rc::clone(&self.deferred),
            fiber: self.fiber,
            queue: self.queue.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Dispatch<T> {
    /// Replace the state with `value`.
    pub fn set(&self, value: T) {
        self.dispatch(Action::Replace(Rc::new(value)));
    }

    /// Compute the next state from the previous one. The function runs
    /// during queue processing, after every earlier update has applied.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) {
        self.dispatch(Action::Compute(Rc::new(move |prev: &StateValue| {
            match prev.downcast_ref::<T>() {
                Some(prev) => Rc::new(f(prev)) as StateValue,
                None => Rc::clone(prev),
            }
        })));
    }

    fn dispatch(&self, action: Action) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        // Statement, not tail expression: the borrow temporary must drop
        // before `runtime` does.
        match runtime.try_borrow_mut() {
            Ok(mut inner) => {
                let lane = inner.request_update_lane();
                self.queue.enqueue(Update::new(action, lane));
                inner.schedule_update_on_fiber(self.fiber, lane);
            }
            // Mid-render or mid-commit: park it, the work loop drains the
            // inbox at its next safe point.
            Err(_) => {
                self.deferred.borrow_mut().push(DeferredDispatch {
                    fiber: self.fiber,
                    queue: self.queue.clone(),
                    action,
                });
            }
        };
    }
}

/// The render context handed to a component for the duration of one render
/// call. All hook state flows through it.
pub struct HookCx<'a> {
    fiber: FiberId,
    render_lane: Lanes,
    is_mount: bool,
    /// The previous render's hooks, owned by the current buffer. Mutated in
    /// place so merged base queues survive a discarded pass.
    prev_hooks: &'a mut Vec<Hook>,
    cursor: usize,
    /// This render's hooks, in call order.
    hooks: &'a mut Vec<Hook>,
    /// This render's effect records, in call order.
    effects: &'a mut Vec<Rc<RefCell<Effect>>>,
    /// Flags to OR onto the fiber after the render call returns.
    added_flags: Flags,
    runtime: Weak<RefCell<Reconciler>>,
    deferred: DeferredInbox,
}

impl HookCx<'_> {
    /// Declare a state slot. Returns the current value and a setter handle.
    ///
    /// `initial` runs only on mount. The value type is fixed at mount; a
    /// different `T` at the same position on a later render is an error.
    pub fn use_state<T: 'static>(
        &mut self,
        initial: impl FnOnce() -> T,
    ) -> Result<(Rc<T>, Dispatch<T>), RenderError> {
        let index = self.advance()?;

        if self.is_mount {
            let value = Rc::new(initial());
            let erased: StateValue = value.clone();
            let queue = SharedQueue::new();
            self.hooks.push(Hook {
                memoized_state: HookState::State,
                base_state: erased,
                base_queue: Vec::new(),
                queue: Some(queue.clone()),
            });
            return Ok((value, self.dispatcher(queue)));
        }

        let prev = &mut self.prev_hooks[index];
        if !matches!(prev.memoized_state, HookState::State) {
            return Err(RenderError::HookKindMismatch { index });
        }
        let queue = prev
            .queue
            .clone()
            .ok_or(RenderError::HookKindMismatch { index })?;

        // Fresh dispatches line up behind previously skipped updates; the
        // merged queue is saved on the current buffer before processing so
        // a discarded pass cannot lose it.
        let pending = queue.take_pending();
        prev.base_queue.extend(pending);

        let processed = process_update_queue(
            Rc::clone(&prev.base_state),
            &prev.base_queue,
            self.render_lane,
        );
        let value = Rc::downcast::<T>(processed.memoized_state)
            .map_err(|_| RenderError::StateTypeMismatch { index })?;

        self.hooks.push(Hook {
            memoized_state: HookState::State,
            base_state: processed.base_state,
            base_queue: processed.base_queue,
            queue: Some(queue.clone()),
        });
        Ok((value, self.dispatcher(queue)))
    }

    /// Declare a passive effect. The body runs after commit, in a deferred
    /// flush task, whenever `deps` differ from the previous render (`None`
    /// deps re-run every render; an empty list runs on mount only). The
    /// cleanup returned by the previous run fires before the next body and
    /// on unmount.
    pub fn use_effect(
        &mut self,
        deps: Option<Vec<Dep>>,
        create: impl Fn() -> Option<EffectCleanup> + 'static,
    ) -> Result<(), RenderError> {
        let index = self.advance()?;

        if self.is_mount {
            self.push_effect(
                HookEffectTags::PASSIVE | HookEffectTags::HAS_EFFECT,
                Rc::new(create),
                None,
                deps,
            );
            self.added_flags |= Flags::PASSIVE_EFFECT;
            return Ok(());
        }

        let prev = &self.prev_hooks[index];
        let HookState::Effect(prev_effect) = &prev.memoized_state else {
            return Err(RenderError::HookKindMismatch { index });
        };
        let (prev_destroy, unchanged) = {
            let prev_effect = prev_effect.borrow();
            (
                prev_effect.destroy.clone(),
                deps_equal(prev_effect.deps.as_deref(), deps.as_deref()),
            )
        };

        let tag = if unchanged {
            HookEffectTags::PASSIVE
        } else {
            self.added_flags |= Flags::PASSIVE_EFFECT;
            HookEffectTags::PASSIVE | HookEffectTags::HAS_EFFECT
        };
        self.push_effect(tag, Rc::new(create), prev_destroy, deps);
        Ok(())
    }

    fn push_effect(
        &mut self,
        tag: HookEffectTags,
        create: EffectCreate,
        destroy: Option<EffectCleanup>,
        deps: Option<Vec<Dep>>,
    ) {
        let effect = Rc::new(RefCell::new(Effect {
            tag,
            create,
            destroy,
            deps,
        }));
        self.effects.push(Rc::clone(&effect));
        self.hooks.push(Hook {
            memoized_state: HookState::Effect(effect),
            base_state: Rc::new(()),
            base_queue: Vec::new(),
            queue: None,
        });
    }

    /// Claim the next hook slot, enforcing the call-order invariant against
    /// the previous render.
    fn advance(&mut self) -> Result<usize, RenderError> {
        let index = self.cursor;
        if !self.is_mount && index >= self.prev_hooks.len() {
            return Err(RenderError::MoreHooksThanPreviousRender);
        }
        self.cursor += 1;
        Ok(index)
    }

    fn dispatcher<T>(&self, queue: SharedQueue) -> Dispatch<T> {
        Dispatch {
            runtime: Weak::clone(&self.runtime),
            deferred: Rc::clone(&self.deferred),
            fiber: self.fiber,
            queue,
            _marker: PhantomData,
        }
    }
}

impl Reconciler {
    /// Run a function component's render with a fresh hook context and
    /// install the resulting hook list, effect list, and flags on `wip`.
    pub(crate) fn render_with_hooks(
        &mut self,
        wip: FiberId,
        render_lane: Lanes,
    ) -> Result<Children, RenderError> {
        let (alternate, component, props) = {
            let fiber = &self.fibers[wip];
            let component = match &fiber.elem_type {
                Some(ElementType::Component(component)) => component.clone(),
                _ => {
                    return Err(RenderError::Component(
                        "render_with_hooks on a non-component fiber".into(),
                    ))
                }
            };
            let props = match &fiber.pending_props {
                FiberProps::Element(props) => props.clone(),
                _ => Props::default(),
            };
            (fiber.alternate, component, props)
        };

        let is_mount = alternate.is_none();
        let mut prev_hooks = match alternate {
            Some(alt) => match std::mem::take(&mut self.fibers[alt].memoized_state) {
                MemoizedState::Hooks(hooks) => hooks,
                other => {
                    self.fibers[alt].memoized_state = other;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let expected = prev_hooks.len();

        let mut hooks: Vec<Hook> = Vec::with_capacity(expected.max(4));
        let mut effects: Vec<Rc<RefCell<Effect>>> = Vec::new();
        let mut cx = HookCx {
            fiber: wip,
            render_lane,
            is_mount,
            prev_hooks: &mut prev_hooks,
            cursor: 0,
            hooks: &mut hooks,
            effects: &mut effects,
            added_flags: Flags::empty(),
            runtime: Weak::clone(&self.self_weak),
            deferred: Rc::clone(&self.deferred),
        };

        let render = component.render_fn();
        let result = render(&mut cx, &props);
        let used = cx.cursor;
        let added_flags = cx.added_flags;

        // Whatever happened, the previous hooks (with merged base queues)
        // go back to the current buffer.
        if let Some(alt) = alternate {
            self.fibers[alt].memoized_state = MemoizedState::Hooks(prev_hooks);
        }

        let children = result?;
        if !is_mount && used < expected {
            return Err(RenderError::FewerHooksThanPreviousRender);
        }

        let fiber = &mut self.fibers[wip];
        fiber.memoized_state = MemoizedState::Hooks(hooks);
        fiber.update_queue = UpdateQueueSlot::Effects(effects);
        fiber.flags |= added_flags;
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dep_compares_by_value_within_a_type() {
        assert!(dep(3i32).same(&dep(3i32)));
        assert!(!dep(3i32).same(&dep(4i32)));
        assert!(dep("a".to_owned()).same(&dep("a".to_owned())));
    }

    #[test]
    fn dep_of_different_types_never_compares_equal() {
        assert!(!dep(3i32).same(&dep(3i64)));
        assert!(!dep(1i32).same(&dep("1".to_owned())));
    }

    #[test]
    fn deps_equal_requires_both_lists_same_length_same_values() {
        assert!(deps_equal(
            Some(&[dep(1), dep(2)]),
            Some(&[dep(1), dep(2)])
        ));
        assert!(!deps_equal(Some(&[dep(1)]), Some(&[dep(1), dep(2)])));
        assert!(!deps_equal(Some(&[dep(1)]), Some(&[dep(2)])));
        // Absent deps mean "re-run every render".
        assert!(!deps_equal(None, None));
        assert!(!deps_equal(Some(&[]), None));
        // Empty lists are equal: the mount-only idiom.
        assert!(deps_equal(Some(&[]), Some(&[])));
    }
}
