//! In-Memory Host
//!
//! A complete [`HostAdapter`] over a plain in-memory node store. It serves
//! two purposes:
//!
//! - a reference target showing what a host implementation looks like
//!   (nodes here form a serialization tree rather than a display surface);
//! - a test double: every mutation is appended to an operation log so tests
//!   can assert not just the final tree but exactly which host mutations a
//!   commit produced.

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::element::{AttrValue, Props};

use super::{HostAdapter, HostHandle};

/// One node in the in-memory tree.
#[derive(Clone, Debug)]
pub enum MemoryNode {
    /// A tagged element node.
    Element {
        /// Host tag.
        tag: String,
        /// Committed attributes.
        attrs: IndexMap<String, AttrValue>,
        /// Direct children, in document order.
        children: Vec<HostHandle>,
    },
    /// A text node.
    Text {
        /// Committed content.
        content: String,
    },
}

/// A host mutation recorded in the operation log.
#[derive(Clone, Debug, PartialEq)]
pub enum HostOp {
    /// `create_instance` was called.
    CreateInstance(HostHandle, String),
    /// `create_text_instance` was called.
    CreateText(HostHandle, String),
    /// `append_initial_child` was called.
    AppendInitial(HostHandle, HostHandle),
    /// `append_child_to_container` was called.
    Append(HostHandle, HostHandle),
    /// `insert_child_to_container` was called (child, container, before).
    Insert(HostHandle, HostHandle, HostHandle),
    /// `remove_child` was called (child, container).
    Remove(HostHandle, HostHandle),
    /// `commit_text_update` was called.
    TextUpdate(HostHandle, String),
    /// `commit_update` was called.
    Update(HostHandle),
}

/// In-memory host adapter with an operation log.
#[derive(Default)]
pub struct MemoryHost {
    nodes: HashMap<HostHandle, MemoryNode>,
    next_handle: u64,
    ops: Vec<HostOp>,
    microtasks_requested: usize,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a container node to mount a root into.
    pub fn create_container(&mut self) -> HostHandle {
        let handle = self.mint();
        self.nodes.insert(
            handle,
            MemoryNode::Element {
                tag: "#container".to_owned(),
                attrs: IndexMap::new(),
                children: Vec::new(),
            },
        );
        handle
    }

    /// Direct children of a node, in order.
    pub fn children_of(&self, handle: HostHandle) -> Vec<HostHandle> {
        match self.nodes.get(&handle) {
            Some(MemoryNode::Element { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Look up a node.
    pub fn node(&self, handle: HostHandle) -> Option<&MemoryNode> {
        self.nodes.get(&handle)
    }

    /// Number of live nodes, containers included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The operation log so far.
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Drop the accumulated operation log.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// How many microtask flushes have been requested.
    pub fn microtasks_requested(&self) -> usize {
        self.microtasks_requested
    }

    /// Render the subtree under `handle` as a compact string, e.g.
    /// `<div id="a"><span>hi</span></div>`. Containers render only their
    /// children.
    pub fn render_to_string(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.write_node(handle, &mut out);
        out
    }

    fn write_node(&self, handle: HostHandle, out: &mut String) {
        match self.nodes.get(&handle) {
            Some(MemoryNode::Text { content }) => out.push_str(content),
            Some(MemoryNode::Element {
                tag,
                attrs,
                children,
            }) => {
                let is_container = tag == "#container";
                if !is_container {
                    let _ = write!(out, "<{tag}");
                    for (name, value) in attrs {
                        match value {
                            AttrValue::Str(s) => {
                                let _ = write!(out, " {name}={s:?}");
                            }
                            AttrValue::Num(n) => {
                                let _ = write!(out, " {name}={n}");
                            }
                            AttrValue::Bool(b) => {
                                let _ = write!(out, " {name}={b}");
                            }
                        }
                    }
                    out.push('>');
                }
                for child in children {
                    self.write_node(*child, out);
                }
                if !is_container {
                    let _ = write!(out, "</{tag}>");
                }
            }
            None => out.push_str("<#dangling>"),
        }
    }

    fn mint(&mut self) -> HostHandle {
        self.next_handle += 1;
        HostHandle(self.next_handle)
    }

    fn children_mut(&mut self, handle: HostHandle) -> Option<&mut Vec<HostHandle>> {
        match self.nodes.get_mut(&handle) {
            Some(MemoryNode::Element { children, .. }) => Some(children),
            _ => None,
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_instance(&mut self, tag: &str, props: &Props) -> HostHandle {
        let handle = self.mint();
        self.nodes.insert(
            handle,
            MemoryNode::Element {
                tag: tag.to_owned(),
                attrs: props.attrs.clone(),
                children: Vec::new(),
            },
        );
        self.ops.push(HostOp::CreateInstance(handle, tag.to_owned()));
        handle
    }

    fn create_text_instance(&mut self, content: &str) -> HostHandle {
        let handle = self.mint();
        self.nodes.insert(
            handle,
            MemoryNode::Text {
                content: content.to_owned(),
            },
        );
        self.ops.push(HostOp::CreateText(handle, content.to_owned()));
        handle
    }

    fn append_initial_child(&mut self, parent: HostHandle, child: HostHandle) {
        if let Some(children) = self.children_mut(parent) {
            children.push(child);
        }
        self.ops.push(HostOp::AppendInitial(parent, child));
    }

    fn append_child_to_container(&mut self, container: HostHandle, child: HostHandle) {
        if let Some(children) = self.children_mut(container) {
            // A move within the same parent arrives as a plain append.
            children.retain(|c| *c != child);
            children.push(child);
        }
        self.ops.push(HostOp::Append(container, child));
    }

    fn insert_child_to_container(
        &mut self,
        child: HostHandle,
        container: HostHandle,
        before: HostHandle,
    ) {
        if let Some(children) = self.children_mut(container) {
            children.retain(|c| *c != child);
            let at = children
                .iter()
                .position(|c| *c == before)
                .unwrap_or(children.len());
            children.insert(at, child);
        }
        self.ops.push(HostOp::Insert(child, container, before));
    }

    fn remove_child(&mut self, child: HostHandle, container: HostHandle) {
        if let Some(children) = self.children_mut(container) {
            children.retain(|c| *c != child);
        }
        self.remove_subtree(child);
        self.ops.push(HostOp::Remove(child, container));
    }

    fn commit_text_update(&mut self, node: HostHandle, content: &str) {
        if let Some(MemoryNode::Text { content: slot }) = self.nodes.get_mut(&node) {
            *slot = content.to_owned();
        }
        self.ops.push(HostOp::TextUpdate(node, content.to_owned()));
    }

    fn commit_update(&mut self, node: HostHandle, next: &Props) {
        if let Some(MemoryNode::Element { attrs, .. }) = self.nodes.get_mut(&node) {
            *attrs = next.attrs.clone();
        }
        self.ops.push(HostOp::Update(node));
    }

    fn schedule_microtask(&mut self) {
        self.microtasks_requested += 1;
    }
}

impl MemoryHost {
    fn remove_subtree(&mut self, handle: HostHandle) {
        if let Some(MemoryNode::Element { children, .. }) = self.nodes.remove(&handle) {
            for child in children {
                self.remove_subtree(child);
            }
        } else {
            self.nodes.remove(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_render() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let div = host.create_instance("div", &Props::default());
        let hello = host.create_text_instance("hello");

        host.append_initial_child(div, hello);
        host.append_child_to_container(container, div);

        assert_eq!(host.render_to_string(container), "<div>hello</div>");
    }

    #[test]
    fn insert_before_positions_child() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");

        host.append_child_to_container(container, b);
        host.insert_child_to_container(a, container, b);

        assert_eq!(host.children_of(container), vec![a, b]);
    }

    #[test]
    fn reappend_moves_instead_of_duplicating() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let a = host.create_text_instance("a");
        let b = host.create_text_instance("b");

        host.append_child_to_container(container, a);
        host.append_child_to_container(container, b);
        host.append_child_to_container(container, a);

        assert_eq!(host.children_of(container), vec![b, a]);
    }

    #[test]
    fn remove_frees_the_subtree() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let div = host.create_instance("div", &Props::default());
        let inner = host.create_text_instance("x");

        host.append_initial_child(div, inner);
        host.append_child_to_container(container, div);
        assert_eq!(host.node_count(), 3);

        host.remove_child(div, container);
        assert_eq!(host.node_count(), 1);
        assert_eq!(host.render_to_string(container), "");
    }
}
