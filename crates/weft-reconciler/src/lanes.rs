#![forbid(unsafe_code)]

//! Lane priority model.
//!
//! Update urgency is a bitmask: lower bit index means higher urgency, so
//! isolating the lowest set bit (`lanes & -lanes`) selects the most urgent
//! pending class in O(1), without sorting. All functions here are pure;
//! lane state lives on the root.
//!
//! # Invariants
//!
//! 1. `Lanes::empty()` is the "nothing pending" sentinel everywhere.
//! 2. `highest_priority` of a non-empty mask is a single-bit mask.
//! 3. The scheduler-priority tables are inverses on the four named lanes.

use weft_sched::SchedulerPriority;

bitflags::bitflags! {
    /// Priority classes for pending updates, most urgent first.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Lanes: u32 {
        /// Must complete before the next microtask checkpoint; never
        /// time-sliced.
        const SYNC             = 1 << 0;
        /// Continuous user interaction (drag, scroll).
        const INPUT_CONTINUOUS = 1 << 1;
        /// Ordinary updates.
        const DEFAULT          = 1 << 2;
        /// Updates enqueued inside a transition scope.
        const TRANSITION       = 1 << 3;
        /// Work that can wait for an idle slot.
        const IDLE             = 1 << 4;
    }
}

impl Lanes {
    /// Bitwise union of two lane sets.
    #[inline]
    #[must_use]
    pub fn merge(self, other: Lanes) -> Lanes {
        self | other
    }

    /// Isolate the most urgent lane in the set (lowest set bit). Empty in,
    /// empty out.
    #[inline]
    #[must_use]
    pub fn highest_priority(self) -> Lanes {
        Lanes::from_bits_retain(self.bits() & self.bits().wrapping_neg())
    }

    /// Whether every lane in `subset` is present in `self`. Used to decide
    /// whether a queued update participates in the active render pass.
    #[inline]
    #[must_use]
    pub fn includes(self, subset: Lanes) -> bool {
        self.contains(subset)
    }

    /// Map the most urgent lane in the set to an external scheduler
    /// priority for callback hand-off.
    #[must_use]
    pub fn to_scheduler_priority(self) -> SchedulerPriority {
        let lane = self.highest_priority();
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

    /// Map an ambient scheduler priority to the lane a fresh update should
    /// be enqueued at.
    #[must_use]
    pub fn from_scheduler_priority(priority: SchedulerPriority) -> Lanes {
        match priority {
            SchedulerPriority::Immediate => Lanes::SYNC,
            SchedulerPriority::UserBlocking => Lanes::INPUT_CONTINUOUS,
            SchedulerPriority::Normal => Lanes::DEFAULT,
            SchedulerPriority::Low | SchedulerPriority::Idle => Lanes::IDLE,
        }
    }
}

/// Lane for a freshly enqueued update: inside a transition scope the
/// transition lane wins; otherwise the ambient scheduler priority decides.
#[must_use]
pub fn request_update_lane(in_transition: bool, ambient: SchedulerPriority) -> Lanes {
    if in_transition {
        Lanes::TRANSITION
    } else {
        Lanes::from_scheduler_priority(ambient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_bitwise_or() {
        let merged = Lanes::SYNC.merge(Lanes::DEFAULT);
        assert!(merged.contains(Lanes::SYNC));
        assert!(merged.contains(Lanes::DEFAULT));
        assert!(!merged.contains(Lanes::IDLE));
    }

    #[test]
    fn highest_priority_is_lowest_set_bit() {
        let lanes = Lanes::DEFAULT | Lanes::TRANSITION | Lanes::IDLE;
        assert_eq!(lanes.highest_priority(), Lanes::DEFAULT);

        let lanes = Lanes::SYNC | Lanes::IDLE;
        assert_eq!(lanes.highest_priority(), Lanes::SYNC);

        assert_eq!(Lanes::empty().highest_priority(), Lanes::empty());
    }

    #[test]
    fn includes_is_subset_test() {
        let set = Lanes::SYNC | Lanes::DEFAULT;
        assert!(set.includes(Lanes::SYNC));
        assert!(set.includes(Lanes::SYNC | Lanes::DEFAULT));
        assert!(!set.includes(Lanes::TRANSITION));
        // The empty set is a subset of everything.
        assert!(set.includes(Lanes::empty()));
    }

    #[test]
    fn scheduler_priority_tables_are_inverse() {
        for lane in [Lanes::SYNC, Lanes::INPUT_CONTINUOUS, Lanes::DEFAULT] {
            assert_eq!(Lanes::from_scheduler_priority(lane.to_scheduler_priority()), lane);
        }
        assert_eq!(Lanes::IDLE.to_scheduler_priority(), SchedulerPriority::Idle);
        assert_eq!(
            Lanes::from_scheduler_priority(SchedulerPriority::Low),
            Lanes::IDLE
        );
    }

    #[test]
    fn update_lane_prefers_transition_scope() {
        assert_eq!(
            request_update_lane(true, SchedulerPriority::Immediate),
            Lanes::TRANSITION
        );
        assert_eq!(
            request_update_lane(false, SchedulerPriority::Immediate),
            Lanes::SYNC
        );
        assert_eq!(
            request_update_lane(false, SchedulerPriority::Normal),
            Lanes::DEFAULT
        );
    }
}
