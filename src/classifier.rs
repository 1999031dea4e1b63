// =============================================================================
// CLASSIFIER
// =============================================================================
// Maps one stall snapshot to exactly one severity state.
//
// RULES (first match wins):
// 1. theft flag set                 -> Stolen
// 2. remaining <= LOW_STOCK_PERCENT -> Low
// 3. otherwise                      -> Normal
//
// LEARNING NOTE:
// The theft flag is an independent upstream signal. A stall at 0% that is
// not flagged is only Low; percentage never escalates to Stolen.
// =============================================================================

use crate::models::{ClassifiedState, StallSnapshot};

/// Readings at or below this percentage classify as Low
pub const LOW_STOCK_PERCENT: u8 = 20;

/// Classify a snapshot. Pure and total.
pub fn classify(snapshot: &StallSnapshot) -> ClassifiedState {
    if snapshot.is_stolen {
        ClassifiedState::Stolen
    } else if snapshot.remaining_percentage.value() <= LOW_STOCK_PERCENT {
        ClassifiedState::Low
    } else {
        ClassifiedState::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemainingPercentage;

    fn snapshot(remaining: i64, is_stolen: bool) -> StallSnapshot {
        StallSnapshot::new(
            "1F-A-male",
            "stall-01",
            RemainingPercentage::new(remaining).unwrap(),
            is_stolen,
            None,
        )
    }

    #[test]
    fn stolen_dominates_percentage() {
        assert_eq!(classify(&snapshot(99, true)), ClassifiedState::Stolen);
        assert_eq!(classify(&snapshot(100, true)), ClassifiedState::Stolen);
        assert_eq!(classify(&snapshot(0, true)), ClassifiedState::Stolen);
    }

    #[test]
    fn low_threshold_is_inclusive() {
        assert_eq!(classify(&snapshot(20, false)), ClassifiedState::Low);
        assert_eq!(classify(&snapshot(21, false)), ClassifiedState::Normal);
    }

    #[test]
    fn empty_stall_is_only_low() {
        assert_eq!(classify(&snapshot(0, false)), ClassifiedState::Low);
    }

    #[test]
    fn classification_is_total_and_deterministic() {
        for remaining in 0..=100 {
            for is_stolen in [false, true] {
                let s = snapshot(remaining, is_stolen);
                assert_eq!(classify(&s), classify(&s));
            }
        }
    }
}
