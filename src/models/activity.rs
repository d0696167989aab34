use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::streak::StreakType;

/// A qualifying non-check-in action: task completed, note shared, event
/// planned or finance entry logged.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: StreakType,
    pub activity_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub kind: StreakType,
}

/// Per-kind activity totals for one user.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ActivityCounts {
    pub tasks_completed: i64,
    pub notes_shared: i64,
    pub events_planned: i64,
    pub finance_entries: i64,
}

impl ActivityCounts {
    pub fn add(&mut self, kind: StreakType, count: i64) {
        match kind {
            StreakType::TaskCompletion => self.tasks_completed += count,
            StreakType::NoteSharing => self.notes_shared += count,
            StreakType::EventPlanning => self.events_planned += count,
            StreakType::FinanceTracking => self.finance_entries += count,
            StreakType::DailyCheckin => {}
        }
    }
}
