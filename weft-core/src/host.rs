//! Host Adapter Capability
//!
//! The reconciler never touches a concrete target environment directly.
//! Everything host-visible goes through this small capability set; a host
//! implements it for whatever a "node" means in that environment, whether a
//! display surface or a plain serialization tree.
//!
//! # Handle model
//!
//! Handles are opaque `HostHandle` values minted by the host. The core
//! stores them on fibers (`state_node`) and passes them back verbatim; it
//! never inspects them.
//!
//! # Ordering contract
//!
//! `append_initial_child` is only called while a subtree is being built
//! offscreen during complete-work; no host-visible ordering is required.
//! The remaining mutation methods are called during the commit phase, which
//! never yields, so a host observes each commit as one atomic batch.

use std::cell::RefCell;
use std::rc::Rc;

use crate::element::Props;

pub mod memory;

/// Opaque handle to a host node or container, minted by the host adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// Capability set a target environment implements to be rendered into.
pub trait HostAdapter {
    /// Allocate an offscreen node for a host-primitive element.
    fn create_instance(&mut self, tag: &str, props: &Props) -> HostHandle;

    /// Allocate an offscreen text node.
    fn create_text_instance(&mut self, content: &str) -> HostHandle;

    /// Attach a child during offscreen construction.
    fn append_initial_child(&mut self, parent: HostHandle, child: HostHandle);

    /// Append a child at the end of a committed parent.
    fn append_child_to_container(&mut self, container: HostHandle, child: HostHandle);

    /// Insert a child before an existing sibling of a committed parent.
    fn insert_child_to_container(
        &mut self,
        child: HostHandle,
        container: HostHandle,
        before: HostHandle,
    );

    /// Remove a direct child from a committed parent.
    fn remove_child(&mut self, child: HostHandle, container: HostHandle);

    /// Apply a text-content diff.
    fn commit_text_update(&mut self, node: HostHandle, content: &str);

    /// Apply an attribute diff to a host-primitive node.
    fn commit_update(&mut self, node: HostHandle, next: &Props);

    /// Request that [`crate::Runtime::flush_sync_work`] be called at the
    /// next microtask-equivalent boundary. Used to coalesce sync-lane work.
    /// Hosts without a microtask queue may leave this as the default no-op
    /// and flush explicitly.
    fn schedule_microtask(&mut self) {}
}

/// Shared-handle adapter so an embedder can keep a handle to its host while
/// the runtime owns another.
impl<H: HostAdapter> HostAdapter for Rc<RefCell<H>> {
    fn create_instance(&mut self, tag: &str, props: &Props) -> HostHandle {
        self.borrow_mut().create_instance(tag, props)
    }

    fn create_text_instance(&mut self, content: &str) -> HostHandle {
        self.borrow_mut().create_text_instance(content)
    }

    fn append_initial_child(&mut self, parent: HostHandle, child: HostHandle) {
        self.borrow_mut().append_initial_child(parent, child);
    }

    fn append_child_to_container(&mut self, container: HostHandle, child: HostHandle) {
        self.borrow_mut().append_child_to_container(container, child);
    }

    fn insert_child_to_container(
        &mut self,
        child: HostHandle,
        container: HostHandle,
        before: HostHandle,
    ) {
        self.borrow_mut()
            .insert_child_to_container(child, container, before);
    }

    fn remove_child(&mut self, child: HostHandle, container: HostHandle) {
        self.borrow_mut().remove_child(child, container);
    }

    fn commit_text_update(&mut self, node: HostHandle, content: &str) {
        self.borrow_mut().commit_text_update(node, content);
    }

    fn commit_update(&mut self, node: HostHandle, next: &Props) {
        self.borrow_mut().commit_update(node, next);
    }

    fn schedule_microtask(&mut self) {
        self.borrow_mut().schedule_microtask();
    }
}
