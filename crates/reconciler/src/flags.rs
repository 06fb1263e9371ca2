//! Effect flags carried by fibers and hook effects.

use bitflags::bitflags;

bitflags! {
    /// Pending host operations and render-phase markers on a fiber.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// Node must be inserted (or moved) into its host parent.
        const PLACEMENT = 1 << 0;
        /// Host props or text content changed.
        const UPDATE = 1 << 1;
        /// `deletions` holds child subtrees to remove.
        const CHILD_DELETION = 1 << 2;
        /// Committed effect list has passive work.
        const PASSIVE_EFFECT = 1 << 3;
        /// Ref must be detached and reattached.
        const REF = 1 << 4;
        /// Offscreen container flipped between hidden and visible.
        const VISIBILITY = 1 << 5;
        /// Suspense boundary is rendering its fallback after a capture.
        const DID_CAPTURE = 1 << 6;
        /// Suspense boundary has been asked to capture a suspended child.
        const SHOULD_CAPTURE = 1 << 7;
    }
}

impl Flags {
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF)
        .union(Flags::VISIBILITY);
    pub const LAYOUT_MASK: Flags = Flags::REF;
    pub const PASSIVE_MASK: Flags = Flags::PASSIVE_EFFECT.union(Flags::CHILD_DELETION);
}

bitflags! {
    /// Tag of a hook effect record.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HookFlags: u8 {
        /// Effect runs in the passive phase.
        const PASSIVE = 1 << 0;
        /// Setup (and the carried teardown) must run on this commit.
        const HAS_EFFECT = 1 << 1;
    }
}
