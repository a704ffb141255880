//! Weft Core
//!
//! This crate provides the core runtime for the Weft UI framework: a
//! fiber-based reconciliation engine that turns declarative element trees
//! into minimal mutations against a pluggable host environment. It
//! implements:
//!
//! - An immutable element model with a builder-style authoring API
//! - A double-buffered fiber tree diffed with keyed child reconciliation
//! - Lane-based priority scheduling with time-sliced, interruptible renders
//! - A positional hook runtime (state and passive effects)
//! - A synchronous commit pipeline with deferred passive-effect flushes
//!
//! The runtime owns no event loop and touches no concrete UI technology:
//! hosts implement [`HostAdapter`], schedulers implement [`TaskScheduler`],
//! and the embedder drives both.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `element`: immutable element descriptors and the authoring API
//! - `host`: the host adapter capability, plus an in-memory reference host
//! - `scheduler`: the cooperative scheduler capability, plus a manual
//!   scheduler for tests and simple embeddings
//! - `reconciler`: the engine itself (fibers, lanes, work loop, commit)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use weft_core::{host, text, ManualScheduler, MemoryHost, Runtime};
//!
//! let host_env = Rc::new(RefCell::new(MemoryHost::new()));
//! let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
//! let container = host_env.borrow_mut().create_container();
//!
//! let runtime = Runtime::new(Rc::clone(&host_env), Rc::clone(&scheduler));
//! let root = runtime.create_root(container);
//! root.render(host("div").child(text("hello")));
//!
//! // Drive scheduled work until quiescent.
//! loop {
//!     let task = scheduler.borrow_mut().take_next_task();
//!     let Some((id, work)) = task else { break };
//!     runtime.perform_scheduled_work(id, work, false);
//! }
//!
//! assert_eq!(
//!     host_env.borrow().render_to_string(container),
//!     "<div>hello</div>",
//! );
//! ```

pub mod element;
pub mod error;
pub mod host;
pub mod reconciler;
pub mod scheduler;

pub use element::{
    fragment, host, text, AttrValue, Child, Children, Component, Element, ElementType, Key,
    NodeRef, Props, RefCallback, RefObject,
};
pub use error::RenderError;
pub use host::memory::{HostOp, MemoryHost, MemoryNode};
pub use host::{HostAdapter, HostHandle};
pub use reconciler::hooks::{dep, Dep, Dispatch, EffectCleanup, HookCx};
pub use reconciler::lanes::{Lane, Lanes};
pub use reconciler::{Root, RootId, Runtime};
pub use scheduler::manual::ManualScheduler;
pub use scheduler::{
    CallbackId, RootWork, SchedulerPriority, TaskScheduler, WorkKind, WorkStatus,
};
