//! Lane Model
//!
//! A lane is a single-bit priority/identity tag attached to an update;
//! lanes combine into a bitset so several pending priorities coexist on one
//! root. Smaller bit value means higher priority, and the highest-priority
//! lane in a set is simply the lowest set bit. Zero is reserved for "none".
//!
//! Lanes exist so that an update created from a click and an update created
//! by background work get different treatment without explicit priority
//! arguments: `request_update_lane` samples the ambient scheduler priority
//! at the moment the update is created.

use crate::scheduler::SchedulerPriority;

/// A set of lanes. A single lane is the degenerate one-bit set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Lanes(pub u32);

/// Alias used where exactly one lane is expected.
pub type Lane = Lanes;

impl Lanes {
    /// No lanes.
    pub const NONE: Lanes = Lanes(0);
    /// Synchronous, non-interruptible work. Highest priority.
    pub const SYNC: Lanes = Lanes(1 << 0);
    /// Continuous input-driven work.
    pub const INPUT_CONTINUOUS: Lanes = Lanes(1 << 1);
    /// Ordinary updates.
    pub const DEFAULT: Lanes = Lanes(1 << 2);
    /// Runs only when nothing else is pending. Lowest priority.
    pub const IDLE: Lanes = Lanes(1 << 3);

    /// Whether the set is empty.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Union of two lane sets.
    pub fn merge(self, other: Lanes) -> Lanes {
        Lanes(self.0 | other.0)
    }

    /// Remove `other`'s lanes from this set.
    pub fn remove(self, other: Lanes) -> Lanes {
        Lanes(self.0 & !other.0)
    }

    /// Whether every lane in `subset` is present in this set.
    pub fn contains(self, subset: Lanes) -> bool {
        self.0 & subset.0 == subset.0
    }

    /// The highest-priority lane in the set: the lowest set bit.
    pub fn highest_priority(self) -> Lane {
        Lanes(self.0 & self.0.wrapping_neg())
    }
}

/// Map the highest-priority lane in a set to a scheduler priority.
pub fn lanes_to_scheduler_priority(lanes: Lanes) -> SchedulerPriority {
    let lane = lanes.highest_priority();
    if lane == Lanes::SYNC {
        SchedulerPriority::Immediate
    } else if lane == Lanes::INPUT_CONTINUOUS {
        SchedulerPriority::UserBlocking
    } else if lane == Lanes::DEFAULT {
        SchedulerPriority::Normal
    } else {
        SchedulerPriority::Idle
    }
}

/// Map a scheduler priority to the lane updates created at that priority
/// should carry.
pub fn scheduler_priority_to_lane(priority: SchedulerPriority) -> Lane {
    match priority {
        SchedulerPriority::Immediate => Lanes::SYNC,
        SchedulerPriority::UserBlocking => Lanes::INPUT_CONTINUOUS,
        SchedulerPriority::Normal => Lanes::DEFAULT,
        SchedulerPriority::Idle => Lanes::IDLE,
    }
}
