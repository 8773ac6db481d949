#![forbid(unsafe_code)]

//! Fiber effect flags and hook effect tags.
//!
//! A fiber's `flags` records what commit must do at that position;
//! `subtree_flags` is the OR of everything below it, bubbled during
//! completion so commit can skip effect-free subtrees in O(1).

bitflags::bitflags! {
    /// Commit-phase work recorded on a fiber during render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FiberFlags: u8 {
        /// Host node must be inserted or moved.
        const PLACEMENT      = 1 << 0;
        /// Host props or text must be patched.
        const UPDATE         = 1 << 1;
        /// One or more children were deleted; see the fiber's deletions
        /// list.
        const CHILD_DELETION = 1 << 2;
        /// The fiber has passive effects that need the async flush.
        const PASSIVE_EFFECT = 1 << 3;
    }
}

impl FiberFlags {
    /// Flags handled during the synchronous mutation phase.
    pub const MUTATION_MASK: FiberFlags = FiberFlags::PLACEMENT
        .union(FiberFlags::UPDATE)
        .union(FiberFlags::CHILD_DELETION);

    /// Flags that require scheduling the asynchronous passive flush.
    /// Deletions participate because unmounting runs effect cleanup.
    pub const PASSIVE_MASK: FiberFlags =
        FiberFlags::PASSIVE_EFFECT.union(FiberFlags::CHILD_DELETION);
}

bitflags::bitflags! {
    /// Kind bits on a hook effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EffectTag: u8 {
        /// The record is a passive effect.
        const PASSIVE    = 1 << 0;
        /// The effect must run in the next passive flush (mounted, or deps
        /// absent/changed).
        const HAS_EFFECT = 1 << 1;
    }
}
