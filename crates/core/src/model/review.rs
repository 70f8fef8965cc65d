use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::TaskId;

//
// ─── REVIEW SCHEDULE ──────────────────────────────────────────────────────────
//

/// Scheduling state produced by the spaced-repetition scorer.
///
/// Only `next_review` is read by the session engine; the interval math that
/// produces it belongs to the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub next_review: DateTime<Utc>,
}

//
// ─── SPACED-REPETITION ITEM ───────────────────────────────────────────────────
//

/// A previously-seen task together with its review schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpacedRepetitionItem {
    pub task_id: TaskId,
    pub schedule: ReviewSchedule,
}

impl SpacedRepetitionItem {
    #[must_use]
    pub fn new(task_id: impl Into<String>, next_review: DateTime<Utc>) -> Self {
        Self {
            task_id: TaskId::new(task_id),
            schedule: ReviewSchedule { next_review },
        }
    }

    /// Due items are those scheduled at or before `at`.
    #[must_use]
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        self.schedule.next_review <= at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn due_boundary_is_inclusive() {
        let now = fixed_now();
        assert!(SpacedRepetitionItem::new("a", now).is_due(now));
        assert!(SpacedRepetitionItem::new("b", now - Duration::days(1)).is_due(now));
        assert!(!SpacedRepetitionItem::new("c", now + Duration::seconds(1)).is_due(now));
    }
}
