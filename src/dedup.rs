// =============================================================================
// ALERT DEDUPLICATOR
// =============================================================================
// Remembers which stalls currently have an unacknowledged theft condition so
// an ongoing incident raises one alert, not one per snapshot.
//
// STATE MACHINE (per stall path):
//
//   classified Stolen, path absent   -> fire, insert
//   classified Stolen, path present  -> nothing (incident ongoing)
//   classified Low/Normal, present   -> remove (incident over)
//   classified Low/Normal, absent    -> nothing
//
// Re-entering Stolen after any other state is a new incident and fires again.
// Entries never expire by time; only a state transition removes them.
//
// LEARNING NOTE:
// The set is owned by one Deduplicator value. Whoever runs the
// classification loop owns it, so `&mut self` is all the synchronisation
// it needs.
// =============================================================================

use std::collections::HashSet;

use crate::classifier::classify;
use crate::models::{ClassifiedState, StallSnapshot};

/// What the dedup set did for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupEffect {
    Insert,
    Remove,
    None,
}

/// Outcome of feeding one snapshot to the deduplicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupDecision {
    pub state: ClassifiedState,
    pub should_fire_theft_alert: bool,
    pub effect: DedupEffect,
}

#[derive(Debug, Default)]
pub struct Deduplicator {
    stolen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `snapshot` and apply the resulting transition for its
    /// stall path.
    pub fn on_snapshot(&mut self, snapshot: &StallSnapshot) -> DedupDecision {
        let state = classify(snapshot);

        let (should_fire_theft_alert, effect) = match state {
            ClassifiedState::Stolen => {
                if self.stolen.contains(&snapshot.stall_path) {
                    (false, DedupEffect::None)
                } else {
                    self.stolen.insert(snapshot.stall_path.clone());
                    (true, DedupEffect::Insert)
                }
            }
            ClassifiedState::Low | ClassifiedState::Normal => {
                if self.stolen.remove(&snapshot.stall_path) {
                    (false, DedupEffect::Remove)
                } else {
                    (false, DedupEffect::None)
                }
            }
        };

        DedupDecision {
            state,
            should_fire_theft_alert,
            effect,
        }
    }

    pub fn is_tracking(&self, stall_path: &str) -> bool {
        self.stolen.contains(stall_path)
    }

    /// Number of stalls with an ongoing theft incident
    pub fn len(&self) -> usize {
        self.stolen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stolen.is_empty()
    }
}
