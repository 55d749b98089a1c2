use bitflags::bitflags;

bitflags! {
    /// Side effects recorded on a fiber during render and applied at commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// Host nodes must be inserted or moved.
        const PLACEMENT = 1;
        /// Host props or text changed.
        const UPDATE = 1 << 1;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 2;
        /// Passive effects must run after commit.
        const PASSIVE_EFFECT = 1 << 3;
        /// A node ref must be attached or detached.
        const REF = 1 << 4;
        /// An offscreen subtree toggled between hidden and visible.
        const VISIBILITY = 1 << 5;
        /// A suspense boundary restarted to show its fallback.
        const DID_CAPTURE = 1 << 6;
        /// A suspense boundary was selected to catch a suspension.
        const SHOULD_CAPTURE = 1 << 7;
    }
}

impl Flags {
    /// Flags handled by the mutation pass.
    pub const MUTATION: Self = Self::PLACEMENT
        .union(Self::UPDATE)
        .union(Self::CHILD_DELETION)
        .union(Self::REF)
        .union(Self::VISIBILITY);
    /// Flags handled by the layout pass.
    pub const LAYOUT: Self = Self::REF;
    /// Flags that produce passive effect work.
    pub const PASSIVE: Self = Self::PASSIVE_EFFECT.union(Self::CHILD_DELETION);
    /// Flags kept on a fiber that is unwound to its boundary.
    pub const HOST_EFFECT: Self = Self::MUTATION
        .union(Self::PASSIVE)
        .union(Self::DID_CAPTURE);
}

impl Default for Flags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Tags on an effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct HookFlags: u8 {
        /// The effect must fire during this commit.
        const HAS_EFFECT = 1;
        /// The effect runs in the passive phase.
        const PASSIVE = 1 << 1;
    }
}
