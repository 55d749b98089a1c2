//! Lane priorities.
//!
//! A lane is a single bit; a set of lanes is a bitmask. Lower bits carry
//! higher priority, so the highest-priority lane of a set is its lowest set
//! bit.

use bitflags::bitflags;

use crate::scheduler::Priority;

bitflags! {
    /// A set of priority lanes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Lanes: u32 {
        /// Discrete input and the first render of a root.
        const SYNC = 1;
        /// Continuous input such as drags and scrolls.
        const INPUT_CONTINUOUS = 1 << 1;
        /// Ordinary updates.
        const DEFAULT = 1 << 2;
        /// Updates issued inside a transition.
        const TRANSITION = 1 << 3;
        /// Work that may wait until nothing else is pending.
        const IDLE = 1 << 4;
    }
}

/// A single lane. Same representation as [`Lanes`], used where exactly one
/// bit is expected.
pub type Lane = Lanes;

impl Default for Lanes {
    fn default() -> Self {
        Self::empty()
    }
}

impl Lanes {
    /// Returns the highest-priority lane in the set, or an empty set.
    #[must_use]
    pub const fn highest(self) -> Lane {
        let bits = self.bits();
        Self::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// Whether every lane of `subset` is part of this set.
    #[must_use]
    pub const fn includes(self, subset: Self) -> bool {
        self.bits() & subset.bits() == subset.bits()
    }

    /// Scheduler priority used when work at this lane is handed to a scheduler.
    #[must_use]
    pub fn to_priority(self) -> Priority {
        let lane = self.highest();
        if lane == Self::SYNC {
            Priority::Immediate
        } else if lane == Self::INPUT_CONTINUOUS {
            Priority::UserBlocking
        } else if lane == Self::IDLE {
            Priority::Idle
        } else {
            Priority::Normal
        }
    }

    /// Lane assigned to updates issued while the scheduler runs at `priority`.
    #[must_use]
    pub const fn from_priority(priority: Priority) -> Lane {
        match priority {
            Priority::Immediate => Self::SYNC,
            Priority::UserBlocking => Self::INPUT_CONTINUOUS,
            Priority::Normal | Priority::Low => Self::DEFAULT,
            Priority::Idle => Self::IDLE,
        }
    }
}

/// Lane bookkeeping kept on a root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootLanes {
    /// Lanes with outstanding work.
    pub pending: Lanes,
    /// Lanes whose last attempt suspended without a boundary.
    pub suspended: Lanes,
    /// Suspended lanes whose resource has since settled.
    pub pinged: Lanes,
}

impl RootLanes {
    /// Records an update at `lane`.
    ///
    /// Any update other than an idle one may unblock suspended work, so the
    /// suspended and pinged sets are reset.
    pub fn mark_updated(&mut self, lane: Lane) {
        self.pending |= lane;
        if lane != Lanes::IDLE {
            self.suspended = Lanes::empty();
            self.pinged = Lanes::empty();
        }
    }

    /// Marks `lanes` as suspended.
    pub fn mark_suspended(&mut self, lanes: Lanes) {
        self.suspended |= lanes;
        self.pinged &= !lanes;
    }

    /// Marks the suspended subset of `lanes` as pinged.
    pub fn mark_pinged(&mut self, lanes: Lanes) {
        self.pinged |= self.suspended & lanes;
    }

    /// Records a settled resource: `lanes` become pending again and the
    /// suspended ones among them are pinged.
    pub fn ping(&mut self, lanes: Lanes) {
        self.pending |= lanes;
        self.mark_pinged(lanes);
    }

    /// Called after a commit with the lanes still owned by the finished tree.
    pub fn mark_finished(&mut self, remaining: Lanes) {
        self.pending = remaining;
        self.suspended = Lanes::empty();
        self.pinged = Lanes::empty();
    }

    /// Picks the lane to render next.
    #[must_use]
    pub fn next_lane(&self) -> Lane {
        let unblocked = self.pending & !self.suspended;
        if !unblocked.is_empty() {
            return unblocked.highest();
        }
        (self.pending & self.pinged).highest()
    }
}
