//! Priority lanes.
//!
//! A lane is a single bit; a `Lanes` value is a set of them. Lower bits are
//! more urgent, so the most urgent lane of a set is its lowest set bit.
//!
//! Invariants:
//! - `Lanes::NONE` is a subset of every set, which is what lets rebased
//!   updates (re-tagged with `NONE`) apply on any later render.
//! - Exactly one lane exists per `PriorityClass`.

use core_types::PriorityClass;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Lanes(u8);

/// A `Lanes` value with at most one bit set.
pub type Lane = Lanes;

impl Lanes {
    pub const NONE: Lanes = Lanes(0);
    pub const SYNC: Lanes = Lanes(0b0_0001);
    pub const INPUT_CONTINUOUS: Lanes = Lanes(0b0_0010);
    pub const DEFAULT: Lanes = Lanes(0b0_0100);
    pub const TRANSITION: Lanes = Lanes(0b0_1000);
    pub const IDLE: Lanes = Lanes(0b1_0000);

    const NAMED: [(Lanes, &'static str); 5] = [
        (Lanes::SYNC, "Sync"),
        (Lanes::INPUT_CONTINUOUS, "InputContinuous"),
        (Lanes::DEFAULT, "Default"),
        (Lanes::TRANSITION, "Transition"),
        (Lanes::IDLE, "Idle"),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn merge(self, other: Lanes) -> Lanes {
        Lanes(self.0 | other.0)
    }

    pub fn remove(self, other: Lanes) -> Lanes {
        Lanes(self.0 & !other.0)
    }

    pub fn intersect(self, other: Lanes) -> Lanes {
        Lanes(self.0 & other.0)
    }

    /// True when the two sets share at least one lane.
    pub fn includes_some(self, other: Lanes) -> bool {
        self.0 & other.0 != 0
    }

    /// True when every lane of `self` is contained in `set`.
    pub fn is_subset_of(self, set: Lanes) -> bool {
        self.0 & set.0 == self.0
    }

    /// Most urgent lane of the set, or `NONE`.
    pub fn highest_priority(self) -> Lane {
        Lanes(self.0 & self.0.wrapping_neg())
    }

    pub fn to_priority_class(self) -> PriorityClass {
        let lane = self.highest_priority();
        if lane == Lanes::SYNC {
            PriorityClass::Immediate
        } else if lane == Lanes::INPUT_CONTINUOUS {
            PriorityClass::UserBlocking
        } else if lane == Lanes::DEFAULT {
            PriorityClass::Normal
        } else if lane == Lanes::TRANSITION {
            PriorityClass::Low
        } else if lane == Lanes::IDLE {
            PriorityClass::Idle
        } else {
            PriorityClass::Normal
        }
    }

    pub fn from_priority_class(priority: PriorityClass) -> Lane {
        match priority {
            PriorityClass::Immediate => Lanes::SYNC,
            PriorityClass::UserBlocking => Lanes::INPUT_CONTINUOUS,
            PriorityClass::Normal => Lanes::DEFAULT,
            PriorityClass::Low => Lanes::TRANSITION,
            PriorityClass::Idle => Lanes::IDLE,
        }
    }
}

impl BitOr for Lanes {
    type Output = Lanes;

    fn bitor(self, rhs: Lanes) -> Lanes {
        self.merge(rhs)
    }
}

impl BitOrAssign for Lanes {
    fn bitor_assign(&mut self, rhs: Lanes) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Lanes {
    type Output = Lanes;

    fn bitand(self, rhs: Lanes) -> Lanes {
        self.intersect(rhs)
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NoLanes");
        }
        let mut first = true;
        for (lane, name) in Lanes::NAMED {
            if self.includes_some(lane) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Lane bookkeeping carried by each root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootLanes {
    pub pending: Lanes,
    pub suspended: Lanes,
    pub pinged: Lanes,
}

impl RootLanes {
    /// New work unsuspends the root: whatever blocked a suspended lane may
    /// be resolved by the update. Idle work never does.
    pub fn mark_updated(&mut self, lane: Lane) {
        self.pending |= lane;
        if lane != Lanes::IDLE {
            self.suspended = Lanes::NONE;
            self.pinged = Lanes::NONE;
        }
    }

    /// Replaces pending work with `remaining`, the lanes still scheduled on
    /// the committed tree. Suspension and ping state is reset since the
    /// committed tree is a new baseline.
    pub fn mark_finished(&mut self, remaining: Lanes) {
        let finished = self.pending.remove(remaining);
        log::trace!(target: "reconciler.scheduler", "finished {finished:?}, remaining {remaining:?}");
        self.pending = remaining;
        self.suspended = Lanes::NONE;
        self.pinged = Lanes::NONE;
    }

    pub fn mark_suspended(&mut self, lane: Lane) {
        self.suspended |= lane;
        self.pinged = self.pinged.remove(lane);
    }

    pub fn mark_pinged(&mut self, lane: Lane) {
        self.pinged |= self.suspended.intersect(lane);
    }

    /// Most urgent unsuspended pending lane, falling back to the most urgent
    /// pinged one.
    pub fn next_lane(&self) -> Lane {
        let unsuspended = self.pending.remove(self.suspended);
        if !unsuspended.is_empty() {
            return unsuspended.highest_priority();
        }
        let pinged = self.pending.intersect(self.pinged);
        pinged.highest_priority()
    }
}
