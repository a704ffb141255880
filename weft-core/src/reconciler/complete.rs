//! Complete Work
//!
//! The ascending half of the render phase. On the way back up the tree,
//! host fibers materialize: a mounting host component creates its instance
//! offscreen and adopts every already-built host descendant, so by the time
//! the root completes the new subtree exists fully formed and commit only
//! has to splice its top into place. Updating host fibers diff their
//! memoized props against the pending ones and mark `UPDATE` on change.
//!
//! Every completion also bubbles effect flags: a parent's `subtree_flags`
//! absorbs each child's `flags | subtree_flags`, so the commit walk can
//! skip entire clean subtrees with one bit test.

use crate::element::ElementType;
use crate::error::RenderError;

use super::fiber::{FiberId, FiberProps, StateNode, WorkTag};
use super::flags::Flags;
use super::Reconciler;

impl Reconciler {
    pub(crate) fn complete_work(&mut self, wip: FiberId) -> Result<(), RenderError> {
        match self.fibers[wip].tag {
            WorkTag::HostComponent => self.complete_host_component(wip)?,
            WorkTag::HostText => self.complete_host_text(wip)?,
            WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => {}
        }
        self.bubble_properties(wip);
        Ok(())
    }

    fn complete_host_component(&mut self, wip: FiberId) -> Result<(), RenderError> {
        let has_instance = {
            let fiber = &self.fibers[wip];
            fiber.alternate.is_some() && fiber.host_handle().is_some()
        };

        if has_instance {
            // Update path: the instance exists, diff attrs only. Children
            // are handled by their own fibers.
            let changed = {
                let fiber = &self.fibers[wip];
                let old_attrs = fiber.alternate.and_then(|alt| {
                    match &self.fibers[alt].memoized_props {
                        Some(FiberProps::Element(props)) => Some(props.attrs.clone()),
                        _ => None,
                    }
                });
                let new_attrs = match &fiber.pending_props {
                    FiberProps::Element(props) => Some(props.attrs.clone()),
                    _ => None,
                };
                old_attrs != new_attrs
            };
            if changed {
                self.fibers[wip].flags |= Flags::UPDATE;
            }
            return Ok(());
        }

        // Mount path: create the instance offscreen and adopt the host
        // descendants built below it.
        let (tag, props) = {
            let fiber = &self.fibers[wip];
            let tag = match &fiber.elem_type {
                Some(ElementType::Host(tag)) => tag.clone(),
                _ => {
                    return Err(RenderError::Component(
                        "host component fiber without a host tag".into(),
                    ))
                }
            };
            let props = match &fiber.pending_props {
                FiberProps::Element(props) => props.clone(),
                _ => {
                    return Err(RenderError::Component(
                        "host component fiber without element props".into(),
                    ))
                }
            };
            (tag, props)
        };
        let handle = self.host.create_instance(&tag, &props);
        self.fibers[wip].state_node = Some(StateNode::Host(handle));
        self.append_all_children(handle, wip);
        Ok(())
    }

    fn complete_host_text(&mut self, wip: FiberId) -> Result<(), RenderError> {
        let has_instance = {
            let fiber = &self.fibers[wip];
            fiber.alternate.is_some() && fiber.host_handle().is_some()
        };

        if has_instance {
            let changed = {
                let fiber = &self.fibers[wip];
                let old = fiber
                    .alternate
                    .and_then(|alt| match &self.fibers[alt].memoized_props {
                        Some(FiberProps::Text(content)) => Some(content.clone()),
                        _ => None,
                    });
                let new = match &fiber.pending_props {
                    FiberProps::Text(content) => Some(content.clone()),
                    _ => None,
                };
                old != new
            };
            if changed {
                self.fibers[wip].flags |= Flags::UPDATE;
            }
            return Ok(());
        }

        let content = match &self.fibers[wip].pending_props {
            FiberProps::Text(content) => content.clone(),
            _ => {
                return Err(RenderError::Component(
                    "host text fiber without text props".into(),
                ))
            }
        };
        let handle = self.host.create_text_instance(&content);
        self.fibers[wip].state_node = Some(StateNode::Host(handle));
        Ok(())
    }

    /// Attach every host descendant of `wip` to `parent`, descending
    /// through non-host layers (components, fragments) but never *into* a
    /// host node, whose own subtree is already attached beneath it.
    fn append_all_children(&mut self, parent: crate::host::HostHandle, wip: FiberId) {
        let mut node = match self.fibers[wip].child {
            Some(child) => child,
            None => return,
        };

        loop {
            let (is_host, handle, child) = {
                let fiber = &self.fibers[node];
                (fiber.is_host(), fiber.host_handle(), fiber.child)
            };

            if is_host {
                if let Some(handle) = handle {
                    self.host.append_initial_child(parent, handle);
                }
            } else if let Some(child) = child {
                node = child;
                continue;
            }

            if node == wip {
                return;
            }
            loop {
                match self.fibers[node].sibling {
                    Some(sibling) => {
                        node = sibling;
                        break;
                    }
                    None => match self.fibers[node].parent {
                        Some(parent_id) if parent_id != wip => node = parent_id,
                        _ => return,
                    },
                }
            }
        }
    }

    /// Absorb the children's flags into this fiber's subtree summary and
    /// repair their `parent` links.
    fn bubble_properties(&mut self, wip: FiberId) {
        let mut subtree = Flags::empty();
        let mut child = self.fibers[wip].child;
        while let Some(id) = child {
            let fiber = &mut self.fibers[id];
            subtree |= fiber.subtree_flags | fiber.flags;
            fiber.parent = Some(wip);
            child = fiber.sibling;
        }
        self.fibers[wip].subtree_flags |= subtree;
    }
}
