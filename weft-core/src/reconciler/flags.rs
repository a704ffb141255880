//! Effect Flags
//!
//! Pending effects are represented as disjoint bits so a parent can absorb
//! its children's flags with a single OR (`subtree_flags`), giving the
//! commit walk O(1) "does this subtree need a visit" pruning.

use bitflags::bitflags;

bitflags! {
    /// Per-fiber pending-effect bits, OR-combined into subtree summaries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Insert or move this fiber's host node.
        const PLACEMENT = 1 << 0;
        /// Apply a content/attribute diff to this fiber's host node.
        const UPDATE = 1 << 1;
        /// One or more children were removed this pass (see
        /// `Fiber::deletions`).
        const CHILD_DELETION = 1 << 2;
        /// A passive effect must run after this commit.
        const PASSIVE_EFFECT = 1 << 3;
        /// A ref must be (re)attached after mutation.
        const REF = 1 << 4;

        /// Bits handled during the commit mutation phase.
        const MUTATION_MASK = Self::PLACEMENT.bits()
            | Self::UPDATE.bits()
            | Self::CHILD_DELETION.bits()
            | Self::REF.bits();

        /// Bits handled during the commit layout phase.
        const LAYOUT_MASK = Self::REF.bits();

        /// Bits that require scheduling a passive-effect flush. Deletions
        /// are included because unmounting queues cleanup effects.
        const PASSIVE_MASK = Self::PASSIVE_EFFECT.bits() | Self::CHILD_DELETION.bits();
    }
}

bitflags! {
    /// Tags on a single hook effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookEffectTags: u8 {
        /// The effect is a passive (post-commit, deferred) effect.
        const PASSIVE = 1 << 0;
        /// The effect's deps changed this render; it fires at the next
        /// flush. Cleared once consumed.
        const HAS_EFFECT = 1 << 1;
    }
}
