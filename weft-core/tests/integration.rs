//! Integration Tests for the Reconciliation Runtime
//!
//! These tests drive the full pipeline end to end: authoring API → render
//! phase → commit → host mutations, using the in-memory host and the manual
//! scheduler so every step is deterministic and observable.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft_core::{
    dep, fragment, host, text, Child, Children, Component, Dispatch, HostHandle, HostOp,
    ManualScheduler, MemoryHost, NodeRef, Root, Runtime, SchedulerPriority, WorkStatus,
};

/// A runtime wired to the in-memory host and manual scheduler.
struct Fixture {
    host: Rc<RefCell<MemoryHost>>,
    scheduler: Rc<RefCell<ManualScheduler>>,
    runtime: Runtime,
    container: HostHandle,
}

impl Fixture {
    fn new() -> Self {
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
        let container = host.borrow_mut().create_container();
        let runtime = Runtime::new(Rc::clone(&host), Rc::clone(&scheduler));
        Self {
            host,
            scheduler,
            runtime,
            container,
        }
    }

    fn root(&self) -> Root {
        self.runtime.create_root(self.container)
    }

    /// Run scheduled work to quiescence, resuming yielded callbacks.
    fn drive(&self) {
        loop {
            let task = { self.scheduler.borrow_mut().take_next_task() };
            let Some((id, work)) = task else { break };
            while self.runtime.perform_scheduled_work(id, work, false) == WorkStatus::Yielded {}
        }
    }

    fn html(&self) -> String {
        self.host.borrow().render_to_string(self.container)
    }

    fn ops(&self) -> Vec<HostOp> {
        self.host.borrow().ops().to_vec()
    }

    fn clear_ops(&self) {
        self.host.borrow_mut().clear_ops();
    }

    fn set_priority(&self, priority: SchedulerPriority) {
        self.scheduler.borrow_mut().set_current_priority(priority);
    }
}

fn keyed_list(items: &[&str]) -> Child {
    host("ul")
        .children(
            items
                .iter()
                .map(|item| host("li").key(*item).child(text(*item)).into())
                .collect(),
        )
        .into()
}

/// Test that mounting builds the host tree in one batch.
#[test]
fn mount_renders_host_tree() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(host("div").attr("id", "a").child(text("hello")));
    fx.drive();

    assert_eq!(fx.html(), "<div id=\"a\">hello</div>");
}

/// Test that re-rendering an identical tree produces zero host mutations.
#[test]
fn identical_rerender_is_host_silent() {
    let fx = Fixture::new();
    let root = fx.root();
    let tree = || host("div").attr("id", "a").child(text("hello"));

    root.render(tree());
    fx.drive();
    fx.clear_ops();

    root.render(tree());
    fx.drive();

    assert_eq!(fx.html(), "<div id=\"a\">hello</div>");
    assert!(fx.ops().is_empty(), "unexpected host ops: {:?}", fx.ops());
}

/// Test that a keyed reversal moves existing nodes instead of recreating
/// them, and moves only the nodes the last-placed-index heuristic requires.
#[test]
fn keyed_reversal_reuses_host_nodes() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(Children::One(Box::new(keyed_list(&["a", "b", "c"]))));
    fx.drive();
    fx.clear_ops();

    root.render(Children::One(Box::new(keyed_list(&["c", "b", "a"]))));
    fx.drive();

    assert_eq!(fx.html(), "<ul><li>c</li><li>b</li><li>a</li></ul>");
    let ops = fx.ops();
    let creations = ops
        .iter()
        .filter(|op| matches!(op, HostOp::CreateInstance(..) | HostOp::CreateText(..)))
        .count();
    let placements = ops
        .iter()
        .filter(|op| matches!(op, HostOp::Append(..) | HostOp::Insert(..)))
        .count();
    assert_eq!(creations, 0, "reversal must not allocate host nodes");
    // "c" keeps its position; "b" and "a" move.
    assert_eq!(placements, 2);
}

/// Test that removing one keyed item removes exactly its subtree.
#[test]
fn keyed_removal_deletes_exactly_one_subtree() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(Children::One(Box::new(keyed_list(&["a", "b", "c"]))));
    fx.drive();
    fx.clear_ops();

    root.render(Children::One(Box::new(keyed_list(&["a", "c"]))));
    fx.drive();

    assert_eq!(fx.html(), "<ul><li>a</li><li>c</li></ul>");
    let removes = fx
        .ops()
        .iter()
        .filter(|op| matches!(op, HostOp::Remove(..)))
        .count();
    assert_eq!(removes, 1);
    // container + ul + 2 li + 2 texts
    assert_eq!(fx.host.borrow().node_count(), 6);
}

/// Test that a text change patches the existing text node in place.
#[test]
fn text_change_updates_in_place() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(host("div").child(text("1")));
    fx.drive();
    fx.clear_ops();

    root.render(host("div").child(text("2")));
    fx.drive();

    assert_eq!(fx.html(), "<div>2</div>");
    let ops = fx.ops();
    assert!(ops
        .iter()
        .any(|op| matches!(op, HostOp::TextUpdate(_, content) if content == "2")));
    assert!(!ops
        .iter()
        .any(|op| matches!(op, HostOp::CreateText(..) | HostOp::Remove(..))));
}

/// Test that an attribute change patches the element without re-creating it.
#[test]
fn attr_change_updates_in_place() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(host("div").attr("id", "a"));
    fx.drive();
    fx.clear_ops();

    root.render(host("div").attr("id", "b"));
    fx.drive();

    assert_eq!(fx.html(), "<div id=\"b\"></div>");
    let ops = fx.ops();
    assert!(ops.iter().any(|op| matches!(op, HostOp::Update(_))));
    assert!(!ops.iter().any(|op| matches!(op, HostOp::CreateInstance(..))));
}

/// Test that an unkeyed top-level fragment is transparent.
#[test]
fn top_level_fragment_flattens() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(fragment(vec![
        host("p").child(text("a")).into(),
        host("p").child(text("b")).into(),
    ]));
    fx.drive();

    assert_eq!(fx.html(), "<p>a</p><p>b</p>");
}

/// Test that a nested child list reconciles as an implicit fragment.
#[test]
fn nested_list_renders_as_fragment() {
    let fx = Fixture::new();
    let root = fx.root();

    root.render(host("div").children(vec![
        text("a"),
        Child::List(vec![text("b"), text("c")]),
    ]));
    fx.drive();

    assert_eq!(fx.html(), "<div>abc</div>");
}

/// Test that component state round-trips through a dispatch made outside
/// any render.
#[test]
fn dispatch_outside_render_rerenders_component() {
    let fx = Fixture::new();
    let root = fx.root();

    let setter: Rc<RefCell<Option<Dispatch<i32>>>> = Rc::new(RefCell::new(None));
    let setter_slot = Rc::clone(&setter);
    let counter = Component::new(move |cx, _props| {
        let (count, set) = cx.use_state(|| 0i32)?;
        *setter_slot.borrow_mut() = Some(set);
        Ok(host("div").child(text(count.to_string())).into())
    });

    root.render(counter.el());
    fx.drive();
    assert_eq!(fx.html(), "<div>0</div>");

    setter
        .borrow()
        .as_ref()
        .expect("setter captured during render")
        .set(5);
    fx.drive();
    assert_eq!(fx.html(), "<div>5</div>");
}

/// Test that functional updates observe the running state, so a burst of
/// dispatches folds in insertion order.
#[test]
fn functional_updates_fold_in_order() {
    let fx = Fixture::new();
    let root = fx.root();

    let setter: Rc<RefCell<Option<Dispatch<i32>>>> = Rc::new(RefCell::new(None));
    let setter_slot = Rc::clone(&setter);
    let counter = Component::new(move |cx, _props| {
        let (count, set) = cx.use_state(|| 0i32)?;
        *setter_slot.borrow_mut() = Some(set);
        Ok(text(count.to_string()).into())
    });

    root.render(counter.el());
    fx.drive();

    {
        let setter = setter.borrow();
        let setter = setter.as_ref().expect("setter captured");
        setter.update(|n| n + 1);
        setter.update(|n| n + 1);
        setter.update(|n| n * 10);
    }
    fx.drive();

    assert_eq!(fx.html(), "20");
}

/// Test that a hook-order violation aborts the render pass and leaves the
/// committed tree untouched, without wedging the runtime.
#[test]
fn hook_order_violation_keeps_committed_tree() {
    let fx = Fixture::new();
    let root = fx.root();

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
    fx.drive();
    assert_eq!(fx.html(), "1");

    extra_hook.set(true);
    root.render(component.el());
    fx.drive();
    // Aborted pass: nothing committed.
    assert_eq!(fx.html(), "1");

    // The runtime still accepts and commits valid work afterwards.
    extra_hook.set(false);
    root.render(component.el());
    fx.drive();
    assert_eq!(fx.html(), "1");
}

/// Test that rendering with fewer hooks than the previous pass aborts the
/// pass after the render body returns, leaving the committed tree intact.
#[test]
fn fewer_hooks_than_previous_render_aborts_pass() {
    let fx = Fixture::new();
    let root = fx.root();

    let second_hook = Rc::new(Cell::new(true));
    let renders = Rc::new(Cell::new(0u32));
    let flag = Rc::clone(&second_hook);
    let counter = Rc::clone(&renders);
    let component = Component::new(move |cx, _props| {
        counter.set(counter.get() + 1);
        let _ = cx.use_state(|| 1i32)?;
        if flag.get() {
            let _ = cx.use_state(|| 2i32)?;
        }
        Ok(text(counter.get().to_string()).into())
    });

    root.render(component.el());
    fx.drive();
    assert_eq!(fx.html(), "1");

    // Skipping the second hook is only detectable once the body has
    // finished; the pass still must not commit.
    second_hook.set(false);
    root.render(component.el());
    fx.drive();
    assert_eq!(renders.get(), 2, "render body ran");
    assert_eq!(fx.html(), "1", "aborted pass must not commit");

    second_hook.set(true);
    root.render(component.el());
    fx.drive();
    assert_eq!(fx.html(), "3");
}

/// Test that swapping hook kinds at one position aborts the pass and keeps
/// the committed tree.
#[test]
fn hook_kind_swap_aborts_pass() {
    let fx = Fixture::new();
    let root = fx.root();

    let swap = Rc::new(Cell::new(false));
    let renders = Rc::new(Cell::new(0u32));
    let flag = Rc::clone(&swap);
    let counter = Rc::clone(&renders);
    let component = Component::new(move |cx, _props| {
        counter.set(counter.get() + 1);
        if flag.get() {
            cx.use_effect(Some(vec![]), || None)?;
        } else {
            let _ = cx.use_state(|| 1i32)?;
        }
        Ok(text(counter.get().to_string()).into())
    });

    root.render(component.el());
    fx.drive();
    assert_eq!(fx.html(), "1");

    // An effect where a state hook used to be fails the slot check.
    swap.set(true);
    root.render(component.el());
    fx.drive();
    assert_eq!(renders.get(), 2, "render body ran");
    assert_eq!(fx.html(), "1", "aborted pass must not commit");

    swap.set(false);
    root.render(component.el());
    fx.drive();
    assert_eq!(fx.html(), "3");
}

/// Test that an effect without a dependency list re-fires on every render,
/// running the previous cleanup first.
#[test]
fn effect_without_deps_reruns_every_render() {
    let fx = Fixture::new();
    let root = fx.root();

    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let log_slot = Rc::clone(&log);
    let component = Component::new(move |cx, _props| {
        let log = Rc::clone(&log_slot);
        cx.use_effect(None, move || {
            log.borrow_mut().push("run");
            let log = Rc::clone(&log);
            Some(Rc::new(move || {
                log.borrow_mut().push("cleanup");
            }) as Rc<dyn Fn()>)
        })?;
        Ok(text("x").into())
    });

    root.render(component.el());
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["run"]);

    root.render(component.el());
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["run", "cleanup", "run"]);

    root.render(component.el());
    fx.drive();
    assert_eq!(
        log.borrow().as_slice(),
        ["run", "cleanup", "run", "cleanup", "run"]
    );
}

/// Test that passive effects run after commit and re-fire only when their
/// deps change, with the previous cleanup running first.
#[test]
fn effects_gate_on_deps_and_run_cleanup_first() {
    let fx = Fixture::new();
    let root = fx.root();

    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let log_slot = Rc::clone(&log);
    let component = Component::new(move |cx, props| {
        let n = match props.attrs.get("n") {
            Some(weft_core::AttrValue::Num(n)) => *n as i64,
            _ => 0,
        };
        let log = Rc::clone(&log_slot);
        cx.use_effect(Some(vec![dep(n)]), move || {
            log.borrow_mut().push(format!("run {n}"));
            let log = Rc::clone(&log);
            Some(Rc::new(move || {
                log.borrow_mut().push(format!("cleanup {n}"));
            }) as Rc<dyn Fn()>)
        })?;
        Ok(text(n.to_string()).into())
    });

    root.render(component.el().attr("n", 1i64));
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["run 1"]);

    // Same deps: the effect does not re-fire.
    root.render(component.el().attr("n", 1i64));
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["run 1"]);

    // Changed deps: previous cleanup, then the new body.
    root.render(component.el().attr("n", 2i64));
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["run 1", "cleanup 1", "run 2"]);
}

/// Test that unmounting a component runs its pending effect cleanup.
#[test]
fn unmount_runs_effect_cleanup() {
    let fx = Fixture::new();
    let root = fx.root();

    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let log_slot = Rc::clone(&log);
    let component = Component::new(move |cx, _props| {
        let log = Rc::clone(&log_slot);
        cx.use_effect(Some(vec![]), move || {
            log.borrow_mut().push("mount");
            let log = Rc::clone(&log);
            Some(Rc::new(move || {
                log.borrow_mut().push("cleanup");
            }) as Rc<dyn Fn()>)
        })?;
        Ok(host("div").child(text("x")).into())
    });

    root.render(component.el());
    fx.drive();
    assert_eq!(log.borrow().as_slice(), ["mount"]);

    root.render(Children::None);
    fx.drive();
    assert_eq!(fx.html(), "");
    assert_eq!(log.borrow().as_slice(), ["mount", "cleanup"]);
}

/// Test that a dispatch made inside an effect body is deferred, applied,
/// and committed without re-entering the runtime.
#[test]
fn dispatch_inside_effect_is_deferred_and_applied() {
    let fx = Fixture::new();
    let root = fx.root();

    let component = Component::new(move |cx, _props| {
        let (count, set) = cx.use_state(|| 0i32)?;
        let value = *count;
        cx.use_effect(Some(vec![]), move || {
            // Runs once on mount, while the runtime cell is borrowed.
            set.set(7);
            None
        })?;
        Ok(text(value.to_string()).into())
    });

    root.render(component.el());
    fx.drive();

    assert_eq!(fx.html(), "7");
}

/// Test that refs attach after commit and detach on unmount.
#[test]
fn node_ref_attaches_and_detaches() {
    let fx = Fixture::new();
    let root = fx.root();
    let r = NodeRef::new();

    root.render(host("div").node_ref(&r));
    fx.drive();
    let handle = r.get().expect("ref attached after commit");
    assert!(fx.host.borrow().node(handle).is_some());

    root.render(Children::None);
    fx.drive();
    assert!(r.get().is_none(), "ref detached on unmount");
}

/// Test that sync-lane work preempts a yielded concurrent render and that
/// the preempted update replays afterwards in its original order.
#[test]
fn sync_update_preempts_yielded_render_and_replays() {
    let fx = Fixture::new();
    let root = fx.root();

    fx.scheduler.borrow_mut().set_should_yield(true);
    root.render(host("div").child(text("low")));

    let (id, work) = {
        let task = fx.scheduler.borrow_mut().take_next_task();
        task.expect("render task scheduled")
    };
    let status = fx.runtime.perform_scheduled_work(id, work, false);
    assert_eq!(status, WorkStatus::Yielded);
    assert_eq!(fx.html(), "", "yielded render must not commit");

    // A sync update arrives mid-flight and wins.
    fx.set_priority(SchedulerPriority::Immediate);
    root.render(host("div").child(text("high")));
    assert!(fx.host.borrow().microtasks_requested() > 0);
    fx.runtime.flush_sync_work();
    assert_eq!(fx.html(), "<div>high</div>");

    // The skipped default-lane update replays behind the sync one, so the
    // final state still reflects insertion order.
    fx.set_priority(SchedulerPriority::Normal);
    fx.scheduler.borrow_mut().set_should_yield(false);
    let status = fx.runtime.perform_scheduled_work(id, work, false);
    assert_eq!(status, WorkStatus::Done);
    fx.drive();
    assert_eq!(fx.html(), "<div>high</div>");
}

/// Test that an update skipped for lane reasons replays on top of the
/// frozen base state, preserving the original dispatch order.
#[test]
fn skipped_update_replays_in_original_order() {
    let fx = Fixture::new();
    let root = fx.root();

    let setter: Rc<RefCell<Option<Dispatch<i32>>>> = Rc::new(RefCell::new(None));
    let setter_slot = Rc::clone(&setter);
    let counter = Component::new(move |cx, _props| {
        let (count, set) = cx.use_state(|| 1i32)?;
        *setter_slot.borrow_mut() = Some(set);
        Ok(text(count.to_string()).into())
    });

    root.render(counter.el());
    fx.drive();
    assert_eq!(fx.html(), "1");

    // Default-lane +10, then sync-lane *3.
    {
        let setter = setter.borrow();
        let setter = setter.as_ref().expect("setter captured");
        setter.update(|n| n + 10);
        fx.set_priority(SchedulerPriority::Immediate);
        setter.update(|n| n * 3);
    }

    // The sync render skips the default update: 1 * 3.
    fx.runtime.flush_sync_work();
    assert_eq!(fx.html(), "3");

    // The default render replays both in dispatch order: (1 + 10) * 3.
    fx.set_priority(SchedulerPriority::Normal);
    fx.drive();
    assert_eq!(fx.html(), "33");
}

/// Test that two roots on one runtime stay independent.
#[test]
fn multiple_roots_are_independent() {
    let fx = Fixture::new();
    let container_b = fx.host.borrow_mut().create_container();
    let root_a = fx.root();
    let root_b = fx.runtime.create_root(container_b);

    root_a.render(host("p").child(text("a")));
    root_b.render(host("p").child(text("b")));
    fx.drive();

    assert_eq!(fx.html(), "<p>a</p>");
    assert_eq!(
        fx.host.borrow().render_to_string(container_b),
        "<p>b</p>"
    );
}
