//! Error Types
//!
//! Errors surfaced by the render phase. A `RenderError` aborts the current
//! render pass; the previously committed tree stays authoritative because
//! render only ever mutates the work-in-progress buffer.

use thiserror::Error;

/// Fatal conditions raised while building a work-in-progress tree.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A component called more hooks than it did on its previous render.
    #[error("rendered more hooks than during the previous render")]
    MoreHooksThanPreviousRender,

    /// A component called fewer hooks than it did on its previous render.
    #[error("rendered fewer hooks than during the previous render")]
    FewerHooksThanPreviousRender,

    /// The hook at a given position changed kind between renders
    /// (e.g. a state hook where an effect hook used to be).
    #[error("hook at position {index} changed kind between renders")]
    HookKindMismatch {
        /// Zero-based position in the component's hook sequence.
        index: usize,
    },

    /// A state hook's stored value could not be downcast to the requested
    /// type. This means two `use_state` calls with different types swapped
    /// positions between renders.
    #[error("state hook at position {index} holds a different type than requested")]
    StateTypeMismatch {
        /// Zero-based position in the component's hook sequence.
        index: usize,
    },

    /// A failure raised by user component code itself.
    #[error("component error: {0}")]
    Component(String),
}
